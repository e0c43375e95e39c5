//! Definition file loader.
//!
//! Reads YAML or JSON definition files into [`BlockDefinition`] trees. The format
//! is a serde representation of the block tree:
//!
//! ```yaml
//! blocks:
//!   - kind: document
//!     name: report
//!     vars: { customer: ACME }
//!     blocks:
//!       - kind: content
//!         type: text
//!         value: "Hello {{ vars.customer }}"
//! ```
//!
//! Structural problems in individual blocks are reported as diagnostics and the
//! offending block is skipped; only unreadable or syntactically invalid files are
//! fatal.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use super::definition::{BlockDefinition, ConfigSource, Meta};
use super::expr::{Expr, VarDecls};
use super::key::{BlockKey, BlockKind, REF_TYPE, is_valid_name};
use crate::core::{Diagnostic, Diagnostics, EngineError};

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Blocks loaded from one file, in file order.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub blocks: Vec<Arc<BlockDefinition>>,
}

/// Everything loaded from a set of sources.
#[derive(Debug, Default)]
pub struct ParseOutput {
    pub files: Vec<ParsedFile>,
    pub diagnostics: Diagnostics,
}

impl ParseOutput {
    /// Top-level blocks of every file, in load order.
    pub fn root_blocks(&self) -> impl Iterator<Item = &Arc<BlockDefinition>> {
        self.files.iter().flat_map(|file| file.blocks.iter())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    #[serde(default)]
    blocks: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    kind: String,
    #[serde(rename = "type")]
    block_type: Option<String>,
    name: Option<String>,
    base: Option<String>,
    title: Option<String>,
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    vars: VarDecls,
    local_var: Option<Expr>,
    is_included: Option<Expr>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    required_vars: Vec<String>,
    config: Option<Value>,
    items: Option<Expr>,
    condition: Option<Expr>,
    #[serde(default)]
    blocks: Vec<RawBlock>,
    #[serde(flatten)]
    args: Map<String, Value>,
}

/// Supported definition file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Yaml,
    Json,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse one definition file from memory.
pub fn parse_source(
    text: &str,
    path: &Path,
    format: SourceFormat,
) -> Result<(ParsedFile, Diagnostics), EngineError> {
    let raw: RawFile = match format {
        SourceFormat::Yaml if text.trim().is_empty() => RawFile {
            blocks: Vec::new(),
        },
        SourceFormat::Yaml => serde_yaml::from_str(text).map_err(|e| parse_error(path, e))?,
        SourceFormat::Json => serde_json::from_str(text).map_err(|e| parse_error(path, e))?,
    };

    let origin: Arc<str> = Arc::from(path.display().to_string());
    let mut diagnostics = Diagnostics::new();
    let blocks = raw
        .blocks
        .into_iter()
        .filter_map(|block| convert(block, None, &origin, &mut diagnostics))
        .map(Arc::new)
        .collect();

    tracing::debug!("parsed {} ({} diagnostics)", path.display(), diagnostics.len());
    Ok((
        ParsedFile {
            path: path.to_path_buf(),
            blocks,
        },
        diagnostics,
    ))
}

fn parse_error(path: &Path, error: impl std::fmt::Display) -> EngineError {
    EngineError::DefinitionParse {
        file: path.display().to_string(),
        reason: error.to_string(),
    }
}

/// Load every definition file reachable from `sources`.
///
/// Directories are walked recursively; only `.yaml`, `.yml` and `.json` files are
/// read. Files are loaded in sorted path order so registry conflicts are reported
/// deterministically.
pub async fn load_sources(sources: &[PathBuf]) -> Result<ParseOutput, EngineError> {
    let mut paths = Vec::new();
    for source in sources {
        if source.is_dir() {
            for entry in WalkDir::new(source).sort_by_file_name() {
                let entry = entry.map_err(|e| EngineError::FileSystem {
                    operation: "walk".to_string(),
                    path: source.display().to_string(),
                    reason: e.to_string(),
                })?;
                let is_definition = entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| EXTENSIONS.contains(&ext));
                if entry.file_type().is_file() && is_definition {
                    paths.push(entry.into_path());
                }
            }
        } else {
            paths.push(source.clone());
        }
    }

    let mut output = ParseOutput::default();
    for path in paths {
        let format = SourceFormat::from_path(&path).ok_or_else(|| EngineError::DefinitionParse {
            file: path.display().to_string(),
            reason: "unsupported file extension (expected .yaml, .yml or .json)".to_string(),
        })?;
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| EngineError::FileSystem {
            operation: "read".to_string(),
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let (file, diagnostics) = parse_source(&text, &path, format)?;
        output.files.push(file);
        output.diagnostics.extend(diagnostics);
    }
    tracing::info!("loaded {} definition file(s)", output.files.len());
    Ok(output)
}

fn invalid(raw_label: &str, origin: &Arc<str>, detail: impl Into<String>) -> Diagnostic {
    Diagnostic::error("Invalid block definition")
        .with_detail(detail)
        .at_block(raw_label)
        .in_file(Some(origin))
}

/// Convert a raw block, validating the kind-specific structure.
///
/// `parent` is `None` for top-level blocks.
fn convert(
    raw: RawBlock,
    parent: Option<BlockKind>,
    origin: &Arc<str>,
    diagnostics: &mut Diagnostics,
) -> Option<BlockDefinition> {
    let raw_label = match (&raw.block_type, &raw.name) {
        (Some(t), Some(n)) => format!("{}.{t}.{n}", raw.kind),
        (None, Some(n)) => format!("{}.{n}", raw.kind),
        (Some(t), None) => format!("{}.{t}", raw.kind),
        (None, None) => raw.kind.clone(),
    };

    let kind: BlockKind = match raw.kind.parse() {
        Ok(kind) => kind,
        Err(reason) => {
            diagnostics.push(invalid(&raw_label, origin, reason));
            return None;
        }
    };

    if let Some(reason) = placement_error(kind, parent, raw.name.is_some()) {
        diagnostics.push(invalid(&raw_label, origin, reason));
        return None;
    }

    if let Some(name) = &raw.name
        && !is_valid_name(name)
    {
        diagnostics.push(invalid(&raw_label, origin, format!("invalid block name '{name}'")));
        return None;
    }

    if let Some(reason) = type_error(kind, raw.block_type.as_deref()) {
        diagnostics.push(invalid(&raw_label, origin, reason));
        return None;
    }

    let is_ref = raw.block_type.as_deref() == Some(REF_TYPE);
    if kind == BlockKind::Data && !is_ref && raw.name.is_none() {
        diagnostics.push(invalid(&raw_label, origin, "data blocks must be named"));
        return None;
    }

    let base = match (&raw.base, is_ref) {
        (Some(base), true) => match base.parse::<BlockKey>() {
            Ok(key) if key.kind == kind => Some(key),
            Ok(key) => {
                diagnostics.push(
                    Diagnostic::error("Invalid ref base")
                        .with_detail(format!("{kind} ref cannot point at {key}"))
                        .at_block(&raw_label)
                        .in_file(Some(origin)),
                );
                return None;
            }
            Err(reason) => {
                diagnostics.push(
                    Diagnostic::error("Invalid ref base")
                        .with_detail(reason)
                        .at_block(&raw_label)
                        .in_file(Some(origin)),
                );
                return None;
            }
        },
        (None, true) => {
            diagnostics.push(
                Diagnostic::error("Invalid ref base")
                    .with_detail("ref block requires a 'base'")
                    .at_block(&raw_label)
                    .in_file(Some(origin)),
            );
            return None;
        }
        (Some(_), false) => {
            diagnostics.push(
                Diagnostic::error("Invalid ref base")
                    .with_detail("'base' is only valid on ref blocks")
                    .at_block(&raw_label)
                    .in_file(Some(origin)),
            );
            return None;
        }
        (None, false) => None,
    };

    let mut depends_on = Vec::with_capacity(raw.depends_on.len());
    for target in &raw.depends_on {
        match target.parse::<BlockKey>() {
            Ok(key) => depends_on.push(key),
            Err(reason) => diagnostics.push(invalid(
                &raw_label,
                origin,
                format!("invalid depends_on entry: {reason}"),
            )),
        }
    }

    let config = match raw.config {
        None | Some(Value::Null) => None,
        Some(Value::String(target)) => match target.parse::<BlockKey>() {
            Ok(key) if key.kind == BlockKind::Config => Some(ConfigSource::Ref(key)),
            Ok(key) => {
                diagnostics.push(invalid(&raw_label, origin, format!("{key} is not a config block")));
                None
            }
            Err(reason) => {
                diagnostics.push(invalid(&raw_label, origin, reason));
                None
            }
        },
        Some(Value::Object(map)) => Some(ConfigSource::Inline(map)),
        Some(other) => {
            diagnostics.push(invalid(
                &raw_label,
                origin,
                format!("config must be a config block key or a map, got {other}"),
            ));
            None
        }
    };

    if kind != BlockKind::Dynamic && (raw.items.is_some() || raw.condition.is_some()) {
        diagnostics.push(
            Diagnostic::warning("Unsupported attribute")
                .with_detail("'items' and 'condition' only apply to dynamic blocks")
                .at_block(&raw_label)
                .in_file(Some(origin)),
        );
    }

    let children = raw
        .blocks
        .into_iter()
        .filter_map(|child| convert(child, Some(kind), origin, diagnostics))
        .map(Arc::new)
        .collect();

    Some(BlockDefinition {
        kind,
        block_type: raw.block_type,
        name: raw.name,
        base,
        title: raw.title,
        meta: raw.meta,
        vars: raw.vars.0,
        local_var: raw.local_var,
        is_included: raw.is_included,
        depends_on,
        required_vars: raw.required_vars,
        args: raw.args,
        config,
        items: if kind == BlockKind::Dynamic { raw.items } else { None },
        condition: if kind == BlockKind::Dynamic { raw.condition } else { None },
        children,
        origin: Some(Arc::clone(origin)),
    })
}

fn placement_error(kind: BlockKind, parent: Option<BlockKind>, named: bool) -> Option<String> {
    match (kind, parent) {
        (BlockKind::Document, Some(parent)) => Some(format!("documents cannot be nested in {parent}")),
        (BlockKind::Config, Some(parent)) => Some(format!("config blocks cannot be nested in {parent}")),
        (BlockKind::Dynamic, None) => Some("dynamic blocks must be nested".to_string()),
        (BlockKind::Dynamic, Some(_)) if named => Some("dynamic blocks cannot be named".to_string()),
        (_, None) if !named => Some(format!("top-level {kind} blocks must be named")),
        (_, Some(parent @ (BlockKind::Content | BlockKind::Data | BlockKind::Config))) => {
            Some(format!("{parent} blocks cannot contain nested blocks"))
        }
        (BlockKind::Section | BlockKind::Content | BlockKind::Data | BlockKind::Dynamic, _) => None,
        (BlockKind::Document | BlockKind::Config, None) => None,
    }
}

fn type_error(kind: BlockKind, block_type: Option<&str>) -> Option<String> {
    match (kind, block_type) {
        (BlockKind::Content | BlockKind::Data, None) => Some(format!("{kind} blocks require a 'type'")),
        (BlockKind::Content | BlockKind::Data, Some(t)) if !is_valid_name(t) => {
            Some(format!("invalid {kind} type '{t}'"))
        }
        (BlockKind::Config, Some(t)) => {
            let valid = t
                .split_once('.')
                .is_some_and(|(target, provider)| matches!(target, "content" | "data") && is_valid_name(provider));
            (!valid).then(|| format!("config type must be 'content.<type>' or 'data.<type>', got '{t}'"))
        }
        (BlockKind::Config, None) => Some("config blocks require a 'type'".to_string()),
        (BlockKind::Document | BlockKind::Section, Some(t)) if t != REF_TYPE => {
            Some(format!("{kind} blocks only accept type '{REF_TYPE}'"))
        }
        (BlockKind::Dynamic, Some(_)) => Some("dynamic blocks do not take a type".to_string()),
        _ => None,
    }
}
