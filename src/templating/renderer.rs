//! Template rendering with Tera.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use strsim::levenshtein;
use tera::{Context as TeraContext, Tera};

use super::error::TemplateError;

/// Maximum allowed Levenshtein distance as a percentage of target length for suggestions.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// How deep into the context variable paths are listed for suggestions.
const SUGGESTION_PATH_DEPTH: usize = 3;

static MISSING_VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Variable `([^`]+)` not found").expect("static variable pattern is valid")
});

static VARS_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bvars\b(?:\s*\.\s*([A-Za-z_][A-Za-z0-9_]*)|\s*\[\s*["']([^"']+)["']\s*\])?"#)
        .expect("static vars pattern is valid")
});

static LINE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+):(\d+)").expect("static line pattern is valid"));

/// Renders `{{ }}` / `{% %}` templates found in block attributes.
///
/// The context is the block's evaluation context as a JSON object, so templates
/// read `{{ vars.customer }}`, `{{ document.meta.title }}` or
/// `{{ data.inline.totals.sum }}`. Content inside ```` ```literal ```` fences is
/// passed through untouched and re-emitted as a plain code fence.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    /// When false, templates are returned verbatim
    enabled: bool,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl TemplateRenderer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
        }
    }

    /// Which variables rendering the strings inside `value` would read.
    pub fn var_usage(&self, value: &Value) -> VarUsage {
        match value {
            Value::String(text) if self.enabled && has_template_syntax(text) => scan_vars(text),
            Value::Array(items) => items.iter().fold(VarUsage::Nothing, |usage, item| usage.merge(self.var_usage(item))),
            Value::Object(map) => map.values().fold(VarUsage::Nothing, |usage, item| usage.merge(self.var_usage(item))),
            _ => VarUsage::Nothing,
        }
    }

    /// Render `template` against `context`.
    ///
    /// Strings without template syntax are returned as-is without invoking Tera.
    ///
    /// # Errors
    ///
    /// Returns an error if the template syntax is invalid, references a variable the
    /// context does not contain, or `context` is not a JSON object.
    pub fn render(&self, template: &str, context: &Value) -> Result<String, TemplateError> {
        if !self.enabled || !has_template_syntax(template) {
            return Ok(template.to_string());
        }

        let (protected, placeholders) = protect_literal_blocks(template);
        let tera_context =
            TeraContext::from_value(context.clone()).map_err(|e| TemplateError::Context(e.to_string()))?;

        let rendered = Tera::one_off(&protected, &tera_context, false)
            .map_err(|e| parse_tera_error(&e, context))?;
        tracing::trace!("rendered template ({} bytes)", rendered.len());
        Ok(restore_literal_blocks(&rendered, placeholders))
    }

    /// Render every string inside `value`, leaving other values untouched.
    pub fn render_value(&self, value: &Value, context: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::String(text) => self.render(text, context).map(Value::String),
            Value::Array(items) => {
                items.iter().map(|item| self.render_value(item, context)).collect::<Result<_, _>>().map(Value::Array)
            }
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    out.insert(key.clone(), self.render_value(item, context)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }
}

fn has_template_syntax(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

/// The `vars` entries a template reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarUsage {
    Nothing,
    Names(BTreeSet<String>),
    /// `vars` is used as a whole, e.g. iterated
    All,
}

impl VarUsage {
    pub fn merge(self, other: VarUsage) -> VarUsage {
        match (self, other) {
            (VarUsage::All, _) | (_, VarUsage::All) => VarUsage::All,
            (VarUsage::Nothing, usage) | (usage, VarUsage::Nothing) => usage,
            (VarUsage::Names(mut names), VarUsage::Names(more)) => {
                names.extend(more);
                VarUsage::Names(names)
            }
        }
    }
}

fn scan_vars(template: &str) -> VarUsage {
    let mut names = BTreeSet::new();
    for caps in VARS_ACCESS.captures_iter(template) {
        match caps.get(1).or_else(|| caps.get(2)) {
            Some(name) => {
                names.insert(name.as_str().to_string());
            }
            None => return VarUsage::All,
        }
    }
    if names.is_empty() { VarUsage::Nothing } else { VarUsage::Names(names) }
}

/// Replace ```` ```literal ```` fences with placeholders so Tera leaves them alone.
fn protect_literal_blocks(content: &str) -> (String, HashMap<String, String>) {
    let mut placeholders = HashMap::new();
    let mut result = String::with_capacity(content.len());
    let mut in_literal_fence = false;
    let mut current_block = String::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```literal") {
            in_literal_fence = true;
            current_block.clear();
        } else if in_literal_fence && trimmed.starts_with("```") {
            in_literal_fence = false;
            let placeholder_id = format!("__DOCWEAVE_LITERAL_BLOCK_{}__", placeholders.len());
            placeholders.insert(placeholder_id.clone(), std::mem::take(&mut current_block));
            result.push_str(&placeholder_id);
            result.push('\n');
        } else if in_literal_fence {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        } else {
            result.push_str(line);
            result.push('\n');
        }
    }

    // Unclosed fence: keep it as regular content
    if in_literal_fence {
        tracing::warn!("Unclosed literal fence found - treating as regular content");
        result.push_str("```literal\n");
        result.push_str(&current_block);
    }

    if !content.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }
    (result, placeholders)
}

fn restore_literal_blocks(content: &str, placeholders: HashMap<String, String>) -> String {
    let mut result = content.to_string();
    for (placeholder_id, original) in placeholders {
        result = result.replace(&placeholder_id, &format!("```\n{original}\n```"));
    }
    result
}

fn parse_tera_error(error: &tera::Error, context: &Value) -> TemplateError {
    let chain = error_chain(error);

    if let Some(variable) = chain.iter().find_map(|msg| {
        MISSING_VARIABLE.captures(msg).and_then(|caps| caps.get(1)).map(|m| m.as_str().to_string())
    }) {
        let available = available_variables(context);
        let suggestions = find_similar_variables(&variable, &available);
        return TemplateError::VariableNotFound {
            variable,
            suggestions,
        };
    }

    let line_number = LINE_COLUMN
        .captures(&format!("{error:?}"))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok());
    TemplateError::SyntaxError {
        message: format_tera_error(&chain),
        line_number,
    }
}

fn error_chain(error: &tera::Error) -> Vec<String> {
    use std::error::Error;

    let mut messages = vec![error.to_string()];
    let mut current: Option<&dyn Error> = error.source();
    while let Some(err) = current {
        messages.push(err.to_string());
        current = err.source();
    }
    messages
}

/// Join the useful parts of a Tera error chain, dropping internal template names.
fn format_tera_error(chain: &[String]) -> String {
    let messages: Vec<String> = chain
        .iter()
        .map(|msg| {
            msg.replace("while rendering '__tera_one_off'", "")
                .replace("Failed to render '__tera_one_off'", "")
                .replace("Failed to parse '__tera_one_off'", "")
                .replace("'__tera_one_off'", "template")
                .trim()
                .to_string()
        })
        .filter(|msg| !msg.is_empty())
        .collect();
    if messages.is_empty() {
        "invalid template".to_string()
    } else {
        messages.join(" → ")
    }
}

/// Dotted paths of every variable in `context`, a few levels deep.
fn available_variables(context: &Value) -> Vec<String> {
    fn walk(prefix: &str, value: &Value, depth: usize, out: &mut Vec<String>) {
        let Value::Object(map) = value else {
            return;
        };
        for (key, child) in map {
            let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
            if depth + 1 < SUGGESTION_PATH_DEPTH {
                walk(&path, child, depth + 1, out);
            }
            out.push(path);
        }
    }

    let mut out = Vec::new();
    walk("", context, 0, &mut out);
    out
}

fn find_similar_variables(target: &str, available: &[String]) -> Vec<String> {
    let mut scored: Vec<_> = available.iter().map(|var| (var.clone(), levenshtein(target, var))).collect();
    scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    scored
        .into_iter()
        .filter(|(_, dist)| *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
        .take(3)
        .map(|(var, _)| var)
        .collect()
}
