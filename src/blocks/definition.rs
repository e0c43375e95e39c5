//! Parsed, purely syntactic block definitions.
//!
//! A [`BlockDefinition`] is created once by the loader and never mutated afterwards.
//! Children are shared behind [`Arc`] so that dynamic expansion and `ref` resolution
//! can re-wrap subtrees with a new scope instead of copying them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::expr::{Expr, VarDecl};
use super::key::{BlockKey, BlockKind, REF_TYPE};

/// Name of the implicit slot created by `local_var`.
pub const LOCAL_VAR_NAME: &str = "local";

/// Block metadata. `tags` drive the tag gate; every other key is passed through
/// to the evaluation context untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Meta {
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            extra: Map::new(),
        }
    }

    /// `required ⊆ self.tags`
    pub fn has_all_tags(&self, required: &[String]) -> bool {
        required.iter().all(|tag| self.tags.contains(tag))
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.extra.is_empty()
    }

    /// Layer `other` on top of `self`: non-empty tags replace, extra keys override.
    pub fn overridden_by(&self, other: &Meta) -> Meta {
        let mut merged = self.clone();
        if !other.tags.is_empty() {
            merged.tags = other.tags.clone();
        }
        for (key, value) in &other.extra {
            merged.extra.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Where a provider's configuration comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// `config: "config.content.text.shared"`
    Ref(BlockKey),
    /// `config: { ... }`
    Inline(Map<String, Value>),
}

/// One parsed block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefinition {
    pub kind: BlockKind,
    /// Provider name for content/data/config blocks, or `ref`
    pub block_type: Option<String>,
    pub name: Option<String>,
    /// Target of a `ref` block
    pub base: Option<BlockKey>,
    /// Heading template for documents and sections
    pub title: Option<String>,
    pub meta: Meta,
    pub vars: Vec<VarDecl>,
    pub local_var: Option<Expr>,
    pub is_included: Option<Expr>,
    pub depends_on: Vec<BlockKey>,
    pub required_vars: Vec<String>,
    /// Provider arguments (content/data) or configuration values (config blocks)
    pub args: Map<String, Value>,
    pub config: Option<ConfigSource>,
    /// Dynamic block iteration source
    pub items: Option<Expr>,
    /// Dynamic block gate
    pub condition: Option<Expr>,
    pub children: Vec<Arc<BlockDefinition>>,
    /// Definition file this block was loaded from
    pub origin: Option<Arc<str>>,
}

impl BlockDefinition {
    /// An empty definition of the given kind; the loader and tests fill in the rest.
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            block_type: None,
            name: None,
            base: None,
            title: None,
            meta: Meta::default(),
            vars: Vec::new(),
            local_var: None,
            is_included: None,
            depends_on: Vec::new(),
            required_vars: Vec::new(),
            args: Map::new(),
            config: None,
            items: None,
            condition: None,
            children: Vec::new(),
            origin: None,
        }
    }

    /// Registry key, if the block is named.
    pub fn key(&self) -> Option<BlockKey> {
        let name = self.name.as_ref()?;
        Some(BlockKey::new(self.kind, self.block_type.as_deref(), name.clone()))
    }

    pub fn is_ref(&self) -> bool {
        self.block_type.as_deref() == Some(REF_TYPE)
    }

    /// Human readable label used in diagnostics and logs.
    pub fn label(&self) -> String {
        match (self.key(), &self.block_type) {
            (Some(key), _) => key.to_string(),
            (None, Some(block_type)) => format!("{}.{block_type}", self.kind),
            (None, None) => self.kind.to_string(),
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Whether any child produces output when rendered (everything but data and config).
    pub fn has_renderable_children(&self) -> bool {
        self.children
            .iter()
            .any(|child| !matches!(child.kind, BlockKind::Data | BlockKind::Config))
    }

    /// Depth-first iterator over this block and every nested block.
    pub fn walk(self: &Arc<Self>) -> Vec<Arc<BlockDefinition>> {
        let mut out = Vec::new();
        let mut stack = vec![Arc::clone(self)];
        while let Some(block) = stack.pop() {
            stack.extend(block.children.iter().rev().cloned());
            out.push(block);
        }
        out
    }
}
