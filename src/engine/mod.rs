//! Block evaluation engine.
//!
//! An [`Engine`] is built once per set of definition files and is read-only
//! afterwards. Each call to [`Engine::render_content`] or [`Engine::fetch_data`]
//! performs one independent run: it walks the target's block tree depth first,
//! resolving refs, scopes, inclusion and dynamic expansion along the way, and
//! returns the rendered tree or the fetched data together with every diagnostic
//! the run collected.
//!
//! # Example
//!
//! ```rust,no_run
//! use docweave::blocks::load_sources;
//! use docweave::config::EngineConfig;
//! use docweave::engine::Engine;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let parsed = load_sources(&["docs/".into()]).await?;
//! let engine = Engine::from_parsed(&parsed, &EngineConfig::default());
//! let output = engine.render_content("document.report")?;
//! if let Some(node) = &output.node {
//!     println!("{}", node.to_markdown());
//! }
//! output.diagnostics.display();
//! # Ok(())
//! # }
//! ```

mod context;
mod evaluator;
pub mod target;

pub use context::EvaluationContext;
pub use target::Target;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::blocks::{BlockDefinition, ParseOutput};
use crate::config::{EngineConfig, Limits};
use crate::core::{Diagnostic, Diagnostics, EngineError};
use crate::filter::TagFilter;
use crate::providers::ProviderRegistry;
use crate::query::{Jq, QueryEvaluator};
use crate::registry::BlockRegistry;
use crate::render::RenderedNode;
use crate::templating::TemplateRenderer;
use evaluator::{Mode, Run};

/// Result of rendering a document.
#[derive(Debug, Clone, Serialize)]
pub struct RenderOutput {
    /// The rendered tree; `None` when the document itself was excluded
    pub node: Option<RenderedNode>,
    /// Every data block fetched during the run, `type -> name -> value`
    pub data: Value,
    pub diagnostics: Diagnostics,
}

impl RenderOutput {
    /// The flattened markdown, empty when nothing rendered.
    pub fn markdown(&self) -> String {
        self.node.as_ref().map(RenderedNode::to_markdown).unwrap_or_default()
    }
}

/// Result of fetching one data block.
#[derive(Debug, Clone, Serialize)]
pub struct DataOutput {
    /// `null` when the block was excluded or failed
    pub data: Value,
    pub diagnostics: Diagnostics,
}

/// Evaluates render and fetch targets against a fixed registry.
pub struct Engine {
    pub(crate) registry: Arc<BlockRegistry>,
    pub(crate) providers: ProviderRegistry,
    pub(crate) evaluator: Arc<dyn QueryEvaluator>,
    pub(crate) templates: TemplateRenderer,
    pub(crate) tags: TagFilter,
    pub(crate) limits: Limits,
    pub(crate) env_prefix: String,
    pub(crate) cancel: CancellationToken,
}

impl Engine {
    /// An engine with the bundled providers and query evaluator.
    pub fn new(registry: BlockRegistry, config: &EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            providers: ProviderRegistry::with_builtins(),
            evaluator: Arc::new(Jq),
            templates: TemplateRenderer::new(config.templating.enabled),
            tags: TagFilter::new(config.render.required_tags.iter().cloned()),
            limits: config.limits.clone(),
            env_prefix: config.env_prefix().to_string(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build the registry from every top-level block of `parsed`.
    pub fn from_parsed(parsed: &ParseOutput, config: &EngineConfig) -> Self {
        Self::new(BlockRegistry::build(parsed.root_blocks()), config)
    }

    #[must_use]
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    #[must_use]
    pub fn with_evaluator(mut self, evaluator: impl QueryEvaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    /// Use `token` to cancel runs; checked before every block visit.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Render the document named by `target` (`document.<name>`).
    ///
    /// # Errors
    ///
    /// Fails on a malformed or non-document target, an unknown document, or
    /// cancellation. Everything that goes wrong inside the tree is reported
    /// through [`RenderOutput::diagnostics`] instead.
    pub fn render_content(&self, target: &str) -> Result<RenderOutput, EngineError> {
        let parsed: Target = target.parse()?;
        if !matches!(parsed, Target::Document(_)) {
            return Err(EngineError::InvalidTarget {
                target: target.to_string(),
                reason: "rendering requires a document.<name> target".to_string(),
            });
        }
        let root = self.find_root(&parsed)?;

        tracing::info!("rendering {parsed}");
        let mut diagnostics = self.root_conflicts(&parsed);
        let result = Run::new(self, Mode::Render).evaluate(&root)?;
        diagnostics.extend(result.diagnostics);
        tracing::info!(
            "rendered {parsed}: {} element(s), {} error(s), {} warning(s)",
            result.node.as_ref().map_or(0, RenderedNode::element_count),
            diagnostics.errors().count(),
            diagnostics.warnings().count()
        );
        Ok(RenderOutput {
            node: result.node,
            data: Value::Object(result.data),
            diagnostics,
        })
    }

    /// Fetch the data block named by `target`, either standalone
    /// (`data.<type>.<name>`) or inside a document
    /// (`document.<name>.data.<type>.<name>`), where it sees the document's scope.
    ///
    /// # Errors
    ///
    /// Fails on a malformed or non-data target, an unknown document or data
    /// block, or cancellation.
    pub fn fetch_data(&self, target: &str) -> Result<DataOutput, EngineError> {
        let parsed: Target = target.parse()?;
        let Some(data_key) = parsed.data_key() else {
            return Err(EngineError::InvalidTarget {
                target: target.to_string(),
                reason: "fetching requires a data.<type>.<name> target".to_string(),
            });
        };
        let root = self.find_root(&parsed)?;
        if !root.walk().iter().any(|block| block.key().as_ref() == Some(&data_key)) {
            return Err(EngineError::TargetNotFound {
                target: target.to_string(),
                suggestions: Vec::new(),
            });
        }

        tracing::info!("fetching {parsed}");
        let mut diagnostics = self.root_conflicts(&parsed);
        let result = Run::new(self, Mode::DataOnly).evaluate(&root)?;
        diagnostics.extend(result.diagnostics);
        Ok(DataOutput {
            data: result.fetched.get(&data_key).cloned().unwrap_or(Value::Null),
            diagnostics,
        })
    }

    fn find_root(&self, target: &Target) -> Result<Arc<BlockDefinition>, EngineError> {
        let key = target.root_key();
        self.registry.get(&key).cloned().ok_or_else(|| EngineError::TargetNotFound {
            target: target.to_string(),
            suggestions: self.registry.suggest(&key.to_string()),
        })
    }

    fn root_conflicts(&self, target: &Target) -> Diagnostics {
        let key = target.root_key();
        let mut diagnostics = Diagnostics::new();
        if self.registry.is_conflicting(&key) {
            diagnostics.push(
                Diagnostic::warning("Conflicting block definitions")
                    .with_detail(format!("{key} is defined more than once; using the first definition"))
                    .at_block(key.to_string()),
            );
        }
        diagnostics
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("blocks", &self.registry.len())
            .field("providers", &self.providers)
            .field("tags", &self.tags)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
