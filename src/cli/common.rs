//! Helpers shared by the evaluation commands.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::blocks::{ParseOutput, load_sources};
use crate::config::EngineConfig;
use crate::core::{Diagnostics, EngineError};
use crate::engine::Engine;

/// Output format of the evaluation commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown for `render`, pretty JSON for `data`; diagnostics go to stderr
    Text,
    /// One JSON object with the result and every diagnostic
    Json,
}

/// Definition sources, config and tag overrides shared by every command.
#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// Definition files or directories to load
    #[arg(value_name = "SOURCE", default_value = ".")]
    pub sources: Vec<PathBuf>,

    /// Required tags, replacing `render.required_tags` from the config
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,
}

/// Parse the definition files and build an engine for them.
///
/// Loader diagnostics are returned separately so they can be reported next to
/// the run's own diagnostics.
pub async fn load_engine(args: &SourceArgs, config_path: Option<&Path>) -> Result<(Engine, ParseOutput)> {
    let mut config = EngineConfig::load(config_path).await?;
    if let Some(tags) = &args.tags {
        config = config.with_required_tags(tags.clone());
    }
    let parsed = load_sources(&args.sources).await?;
    let engine = Engine::from_parsed(&parsed, &config);
    tracing::debug!("built {engine:?}");
    Ok((engine, parsed))
}

/// Run `evaluate` on a blocking thread, cancelling it on Ctrl-C.
pub async fn run_cancellable<T, F>(engine: Engine, evaluate: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
{
    let token = engine.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling evaluation");
            token.cancel();
        }
    });
    let result = tokio::task::spawn_blocking(move || evaluate(&engine)).await;
    watcher.abort();
    Ok(result.context("evaluation task failed")??)
}

/// Fail when `diagnostics` holds errors, or warnings under `strict`.
pub fn check_diagnostics(diagnostics: &Diagnostics, strict: bool) -> Result<()> {
    let errors = diagnostics.errors().count();
    let warnings = diagnostics.warnings().count();
    if errors > 0 {
        anyhow::bail!("evaluation reported {errors} error(s)");
    }
    if strict && warnings > 0 {
        anyhow::bail!("evaluation reported {warnings} warning(s) in strict mode");
    }
    Ok(())
}
