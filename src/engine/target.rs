//! Render and fetch targets.

use std::fmt;
use std::str::FromStr;

use crate::blocks::BlockKey;
use crate::blocks::key::is_valid_name;
use crate::core::EngineError;

/// What a run evaluates.
///
/// - `document.<name>`
/// - `data.<type>.<name>`
/// - `document.<name>.data.<type>.<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Document(String),
    Data {
        /// Document the data block is evaluated inside of
        document: Option<String>,
        source: String,
        name: String,
    },
}

impl Target {
    /// Registry key of the block the run starts from.
    pub fn root_key(&self) -> BlockKey {
        match self {
            Self::Document(name)
            | Self::Data {
                document: Some(name),
                ..
            } => BlockKey::document(name.clone()),
            Self::Data {
                document: None,
                source,
                name,
            } => BlockKey::data(source, name.clone()),
        }
    }

    /// Key of the data block a data target names.
    pub fn data_key(&self) -> Option<BlockKey> {
        match self {
            Self::Document(_) => None,
            Self::Data {
                source,
                name,
                ..
            } => Some(BlockKey::data(source, name.clone())),
        }
    }
}

impl FromStr for Target {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| EngineError::InvalidTarget {
            target: s.to_string(),
            reason: reason.to_string(),
        };
        let parts: Vec<&str> = s.split('.').collect();
        if let Some(bad) = parts.iter().find(|part| !is_valid_name(part)) {
            return Err(invalid(&format!("'{bad}' is not a valid name")));
        }
        match parts.as_slice() {
            ["document", name] => Ok(Self::Document((*name).to_string())),
            ["data", source, name] => Ok(Self::Data {
                document: None,
                source: (*source).to_string(),
                name: (*name).to_string(),
            }),
            ["document", document, "data", source, name] => Ok(Self::Data {
                document: Some((*document).to_string()),
                source: (*source).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(invalid(
                "expected document.<name>, data.<type>.<name> or document.<name>.data.<type>.<name>",
            )),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document(name) => write!(f, "document.{name}"),
            Self::Data {
                document: None,
                source,
                name,
            } => write!(f, "data.{source}.{name}"),
            Self::Data {
                document: Some(document),
                source,
                name,
            } => write!(f, "document.{document}.data.{source}.{name}"),
        }
    }
}
