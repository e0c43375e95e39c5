//! Command-line interface for docweave.
//!
//! # Available Commands
//!
//! - `render` - evaluate a document and print its markdown
//! - `data` - fetch one data block as JSON
//! - `validate` - check definition files without evaluating them
//!
//! # Command Usage Patterns
//!
//! ```bash
//! # Render a document from every definition file below docs/
//! docweave render document.report docs/
//!
//! # Only keep content tagged `public`
//! docweave render document.report docs/ --tags public
//!
//! # Fetch data as a document would see it
//! docweave data document.report.data.json.releases docs/
//!
//! # Lint definitions in CI
//! docweave --quiet validate docs/ --strict
//! ```
//!
//! # Exit Codes
//!
//! Commands exit with status 1 when evaluation reports any error diagnostic (or
//! any warning with `--strict`). Partial output is still printed first.

mod common;
mod data;
mod render;
mod validate;

pub use common::{OutputFormat, SourceArgs};
pub use data::DataCommand;
pub use render::RenderCommand;
pub use validate::ValidateCommand;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log level for docweave's own targets; `None` disables logging.
    ///
    /// `RUST_LOG` takes precedence when set.
    pub log_level: Option<String>,

    /// Explicit `docweave.toml` path
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Install the global tracing subscriber, writing to stderr.
    ///
    /// Calling this more than once is harmless; later calls are ignored.
    pub fn init_logging(&self) {
        let filter = match (&self.log_level, std::env::var("RUST_LOG")) {
            (_, Ok(_)) => EnvFilter::from_default_env(),
            (Some(level), Err(_)) => EnvFilter::new(format!("docweave={level}")),
            (None, Err(_)) => return,
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Main CLI application structure for docweave.
#[derive(Parser)]
#[command(
    name = "docweave",
    about = "Evaluate declarative block definitions into markdown documents",
    version,
    long_about = "docweave loads YAML/JSON block definitions, resolves refs, variables, loops and \
                  tag filters, and renders documents through content providers and data sources."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug logging on stderr
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable logging entirely
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a `docweave.toml`; defaults to `$DOCWEAVE_CONFIG`, then `./docweave.toml`
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a document to markdown
    Render(RenderCommand),
    /// Fetch a data block as JSON
    Data(DataCommand),
    /// Check definition files for broken references and structural errors
    Validate(ValidateCommand),
}

impl Cli {
    /// Execute the parsed command.
    ///
    /// # Errors
    ///
    /// Returns an error when loading fails, the target is invalid, or the run
    /// produced error diagnostics.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };
        CliConfig {
            log_level,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit [`CliConfig`] instead of one built from the flags.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.init_logging();
        let config_path = config.config_path.as_deref();
        match self.command {
            Commands::Render(cmd) => cmd.execute(config_path).await,
            Commands::Data(cmd) => cmd.execute(config_path).await,
            Commands::Validate(cmd) => cmd.execute(config_path).await,
        }
    }
}
