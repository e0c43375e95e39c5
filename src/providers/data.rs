//! Bundled data sources.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::path::Path;

use super::DataSource;

/// Returns its own arguments as data.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineSource;

impl DataSource for InlineSource {
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        Some(&[])
    }

    fn fetch(&self, args: &Map<String, Value>, _config: &Map<String, Value>) -> Result<Value> {
        Ok(Value::Object(args.clone()))
    }
}

/// Parses JSON files.
///
/// With `path`, returns that file's contents. With `glob`, returns a list of
/// `{filename, contents}` objects for every matching file, sorted by path.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSource;

impl DataSource for JsonSource {
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        Some(&[])
    }

    fn fetch(&self, args: &Map<String, Value>, _config: &Map<String, Value>) -> Result<Value> {
        if let Some(path) = args.get("path").and_then(Value::as_str) {
            return read_json(Path::new(path));
        }
        let Some(pattern) = args.get("glob").and_then(Value::as_str) else {
            bail!("either 'path' or 'glob' is required");
        };

        let mut paths = Vec::new();
        for entry in glob::glob(pattern).with_context(|| format!("Invalid glob pattern: {pattern}"))? {
            let path = entry.with_context(|| format!("Failed to read a match of {pattern}"))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        tracing::debug!("json source matched {} file(s) for {pattern}", paths.len());

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = read_json(&path)?;
            let mut entry = Map::new();
            entry.insert("filename".to_string(), Value::String(path.display().to_string()));
            entry.insert("contents".to_string(), contents);
            documents.push(Value::Object(entry));
        }
        Ok(Value::Array(documents))
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {} as JSON", path.display()))
}

/// Snapshot of the process environment.
///
/// `prefix` keeps only variables starting with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSource;

impl DataSource for EnvSource {
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        Some(&["prefix"])
    }

    fn fetch(&self, args: &Map<String, Value>, config: &Map<String, Value>) -> Result<Value> {
        let prefix = args
            .get("prefix")
            .or_else(|| config.get("prefix"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(Value::Object(env_snapshot(prefix)))
    }
}

/// Environment variables whose names start with `prefix`, sorted by name.
pub fn env_snapshot(prefix: &str) -> Map<String, Value> {
    let mut vars: Vec<(String, String)> = std::env::vars().filter(|(name, _)| name.starts_with(prefix)).collect();
    vars.sort();
    vars.into_iter().map(|(name, value)| (name, Value::String(value))).collect()
}
