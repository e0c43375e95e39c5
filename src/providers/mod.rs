//! Content providers and data sources.
//!
//! Providers are the engine's only way to produce output or data. The engine
//! resolves a block's arguments and configuration, then calls into the provider
//! named by the block's `type`:
//!
//! - [`ContentProvider`] turns arguments into a markdown fragment
//! - [`DataSource`] turns arguments into structured JSON data
//!
//! Both return [`anyhow::Result`]; a failure becomes a block-scoped diagnostic and
//! never aborts the run. A provider may declare the configuration keys it
//! understands, in which case any other key produces an "Unknown config key"
//! warning.
//!
//! [`ProviderRegistry::with_builtins`] registers the bundled providers:
//!
//! | Kind | Type | Purpose |
//! |------|------|---------|
//! | content | `text` | templated `value` |
//! | content | `title` | heading from `value`, optional `absolute_level` |
//! | content | `list` | `items` as a bullet or numbered list |
//! | content | `code` | fenced code block |
//! | data | `inline` | returns its own arguments |
//! | data | `json` | parses every file matching `glob` |
//! | data | `env` | environment variables, optionally filtered by `prefix` |

pub mod content;
pub mod data;

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::templating::TemplateRenderer;

/// Everything a content provider may look at.
pub struct ContentRequest<'a> {
    /// Arguments with every query already evaluated
    pub args: &'a Map<String, Value>,
    pub config: &'a Map<String, Value>,
    /// The block's evaluation context (`vars`, `document`, `section`, `data`, `env`).
    /// `vars` holds only the variables the templates in `args` name.
    pub context: &'a Value,
    /// Heading level a title at this position should use
    pub heading_level: usize,
    pub templates: &'a TemplateRenderer,
}

impl ContentRequest<'_> {
    /// Render `template` against the block's context.
    pub fn render(&self, template: &str) -> Result<String> {
        Ok(self.templates.render(template, self.context)?)
    }

    /// Render `template` with one extra top-level context entry.
    pub fn render_with(&self, template: &str, key: &str, value: Value) -> Result<String> {
        let mut context = match self.context {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        context.insert(key.to_string(), value);
        Ok(self.templates.render(template, &Value::Object(context))?)
    }

    /// A required string argument.
    pub fn str_arg(&self, name: &str) -> Result<&str> {
        match self.args.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => anyhow::bail!("argument '{name}' must be a string, got {other}"),
            None => anyhow::bail!("missing required argument '{name}'"),
        }
    }
}

/// Produces markdown for `content` blocks.
pub trait ContentProvider: Send + Sync {
    /// Configuration keys this provider understands; `None` accepts anything.
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        None
    }

    fn render(&self, request: &ContentRequest<'_>) -> Result<String>;
}

/// Produces data for `data` blocks.
pub trait DataSource: Send + Sync {
    /// Configuration keys this source understands; `None` accepts anything.
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        None
    }

    fn fetch(&self, args: &Map<String, Value>, config: &Map<String, Value>) -> Result<Value>;
}

/// Providers available to a run, keyed by block type.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    content: HashMap<String, Arc<dyn ContentProvider>>,
    data: HashMap<String, Arc<dyn DataSource>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every bundled provider registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_content("text", content::TextProvider);
        registry.register_content("title", content::TitleProvider);
        registry.register_content("list", content::ListProvider);
        registry.register_content("code", content::CodeProvider);
        registry.register_data("inline", data::InlineSource);
        registry.register_data("json", data::JsonSource);
        registry.register_data("env", data::EnvSource);
        registry
    }

    /// Register a content provider, replacing any previous one of the same type.
    pub fn register_content(&mut self, name: impl Into<String>, provider: impl ContentProvider + 'static) {
        self.content.insert(name.into(), Arc::new(provider));
    }

    /// Register a data source, replacing any previous one of the same type.
    pub fn register_data(&mut self, name: impl Into<String>, source: impl DataSource + 'static) {
        self.data.insert(name.into(), Arc::new(source));
    }

    pub fn content(&self, name: &str) -> Option<&Arc<dyn ContentProvider>> {
        self.content.get(name)
    }

    pub fn data(&self, name: &str) -> Option<&Arc<dyn DataSource>> {
        self.data.get(name)
    }

    pub fn content_names(&self) -> Vec<&str> {
        sorted_names(&self.content)
    }

    pub fn data_names(&self) -> Vec<&str> {
        sorted_names(&self.data)
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("content", &self.content_names())
            .field("data", &self.data_names())
            .finish()
    }
}

fn sorted_names<T: ?Sized>(map: &HashMap<String, Arc<T>>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

/// Keys of `config` that are not in `accepted`, sorted.
pub fn unknown_config_keys(accepted: Option<&[&str]>, config: &Map<String, Value>) -> Vec<String> {
    let Some(accepted) = accepted else {
        return Vec::new();
    };
    let mut unknown: Vec<String> =
        config.keys().filter(|key| !accepted.contains(&key.as_str())).cloned().collect();
    unknown.sort();
    unknown
}
