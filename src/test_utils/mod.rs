//! Test utilities for docweave
//!
//! Helpers for building engines straight from YAML, observing evaluation from the
//! outside, and writing definition files into temporary directories.
//!
//! # Example
//!
//! ```rust,no_run
//! use docweave::test_utils::engine_from_yaml;
//!
//! let engine = engine_from_yaml(
//!     r#"
//! blocks:
//!   - kind: document
//!     name: d
//!     blocks:
//!       - kind: content
//!         type: text
//!         value: hello
//! "#,
//! );
//! assert_eq!(engine.render_content("document.d").unwrap().markdown(), "hello");
//! ```

pub mod fixtures;

pub use fixtures::DefinitionFixture;

use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::blocks::{BlockDefinition, SourceFormat, parse_source};
use crate::config::EngineConfig;
use crate::core::Diagnostics;
use crate::engine::Engine;
use crate::providers::{ContentProvider, ContentRequest};
use crate::query::{Jq, QueryEnv, QueryError, QueryEvaluator};
use crate::registry::BlockRegistry;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=docweave=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Parse one in-memory YAML definition file.
///
/// # Panics
///
/// Panics if the text is not a syntactically valid definition file.
pub fn parse_yaml(yaml: &str) -> (Vec<Arc<BlockDefinition>>, Diagnostics) {
    let (file, diagnostics) =
        parse_source(yaml, Path::new("test.yaml"), SourceFormat::Yaml).expect("test definitions should parse");
    (file.blocks, diagnostics)
}

/// An engine with default configuration over one YAML definition file.
pub fn engine_from_yaml(yaml: &str) -> Engine {
    engine_from_yaml_with(yaml, &EngineConfig::default())
}

/// An engine over one YAML definition file.
///
/// # Panics
///
/// Panics if loading reported any diagnostic, so fixtures stay clean.
pub fn engine_from_yaml_with(yaml: &str, config: &EngineConfig) -> Engine {
    let (blocks, diagnostics) = parse_yaml(yaml);
    assert!(diagnostics.is_empty(), "unexpected load diagnostics: {diagnostics:?}");
    Engine::new(BlockRegistry::build(blocks.iter()), config)
}

/// [`Jq`] wrapper counting every query it evaluates.
#[derive(Debug, Clone, Default)]
pub struct CountingEvaluator {
    calls: Arc<AtomicUsize>,
}

impl CountingEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queries evaluated so far, across every clone.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QueryEvaluator for CountingEvaluator {
    fn eval(&self, query: &str, env: &dyn QueryEnv) -> Result<Value, QueryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Jq.eval(query, env)
    }
}

/// Content provider that renders `value` verbatim and records every argument map
/// it was called with.
#[derive(Debug, Clone, Default)]
pub struct RecordingProvider {
    calls: Arc<Mutex<Vec<Value>>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments of every call, in call order.
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

impl ContentProvider for RecordingProvider {
    fn render(&self, request: &ContentRequest<'_>) -> anyhow::Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(Value::Object(request.args.clone()));
        }
        Ok(request.args.get("value").and_then(Value::as_str).unwrap_or_default().to_string())
    }
}
