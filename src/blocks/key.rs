//! Block kinds and registry keys.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Block type label used by `ref` blocks.
pub const REF_TYPE: &str = "ref";

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("static name pattern is valid")
});

/// The syntactic kind of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Document,
    Section,
    Content,
    Data,
    Dynamic,
    Config,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Section => "section",
            Self::Content => "content",
            Self::Data => "data",
            Self::Dynamic => "dynamic",
            Self::Config => "config",
        }
    }

    /// Whether blocks of this kind carry a provider or `ref` type label.
    pub fn is_typed(&self) -> bool {
        matches!(self, Self::Content | Self::Data | Self::Config)
    }

    /// Whether this kind may appear as a `ref` with a `base`.
    pub fn supports_ref(&self) -> bool {
        matches!(self, Self::Document | Self::Section | Self::Content | Self::Data)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "section" => Ok(Self::Section),
            "content" => Ok(Self::Content),
            "data" => Ok(Self::Data),
            "dynamic" => Ok(Self::Dynamic),
            "config" => Ok(Self::Config),
            other => Err(format!("unknown block kind '{other}'")),
        }
    }
}

/// Registry key of a named block: `(kind, type, name)`.
///
/// Rendered as dotted paths:
/// - `document.<name>`, `section.<name>`
/// - `document.ref.<name>`, `section.ref.<name>`
/// - `content.<type>.<name>`, `data.<type>.<name>` (type may be `ref`)
/// - `config.<content|data>.<type>.<name>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub kind: BlockKind,
    pub block_type: Option<String>,
    pub name: String,
}

impl BlockKey {
    pub fn new(kind: BlockKind, block_type: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind,
            block_type: block_type.map(str::to_string),
            name: name.into(),
        }
    }

    pub fn document(name: impl Into<String>) -> Self {
        Self::new(BlockKind::Document, None, name)
    }

    pub fn section(name: impl Into<String>) -> Self {
        Self::new(BlockKind::Section, None, name)
    }

    pub fn content(block_type: &str, name: impl Into<String>) -> Self {
        Self::new(BlockKind::Content, Some(block_type), name)
    }

    pub fn data(block_type: &str, name: impl Into<String>) -> Self {
        Self::new(BlockKind::Data, Some(block_type), name)
    }

    pub fn is_ref(&self) -> bool {
        self.block_type.as_deref() == Some(REF_TYPE)
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(block_type) = &self.block_type {
            write!(f, ".{block_type}")?;
        }
        write!(f, ".{}", self.name)
    }
}

/// Check a single name segment.
pub fn is_valid_name(name: &str) -> bool {
    NAME_PATTERN.is_match(name)
}

impl FromStr for BlockKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if let Some(bad) = parts.iter().find(|p| !is_valid_name(p)) {
            return Err(format!("'{s}' has an invalid segment '{bad}'"));
        }
        let kind: BlockKind = parts[0].parse()?;
        match (kind, parts.as_slice()) {
            (BlockKind::Document | BlockKind::Section, [_, name]) => Ok(Self::new(kind, None, *name)),
            (BlockKind::Document | BlockKind::Section, [_, REF_TYPE, name]) => {
                Ok(Self::new(kind, Some(REF_TYPE), *name))
            }
            (BlockKind::Content | BlockKind::Data, [_, block_type, name]) => {
                Ok(Self::new(kind, Some(*block_type), *name))
            }
            (BlockKind::Config, [_, target @ ("content" | "data"), provider, name]) => {
                Ok(Self::new(kind, Some(&format!("{target}.{provider}")), *name))
            }
            (BlockKind::Dynamic, _) => Err(format!("'{s}': dynamic blocks cannot be referenced")),
            _ => Err(format!("'{s}' does not name a {kind} block")),
        }
    }
}

impl Serialize for BlockKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
