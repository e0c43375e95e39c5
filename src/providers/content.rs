//! Bundled content providers.

use anyhow::{Result, bail};
use serde_json::Value;

use super::{ContentProvider, ContentRequest};

/// Deepest markdown heading level.
const MAX_HEADING_LEVEL: usize = 6;

/// `value` rendered as a template.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextProvider;

impl ContentProvider for TextProvider {
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        Some(&[])
    }

    fn render(&self, request: &ContentRequest<'_>) -> Result<String> {
        request.render(request.str_arg("value")?)
    }
}

/// A markdown heading.
///
/// The level follows the block's nesting unless `absolute_level` is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleProvider;

impl ContentProvider for TitleProvider {
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        Some(&[])
    }

    fn render(&self, request: &ContentRequest<'_>) -> Result<String> {
        let text = request.render(request.str_arg("value")?)?;
        let level = match request.args.get("absolute_level") {
            None | Some(Value::Null) => request.heading_level,
            Some(Value::Number(n)) => match n.as_u64() {
                Some(level @ 1..) => level as usize,
                _ => bail!("absolute_level must be a positive integer, got {n}"),
            },
            Some(other) => bail!("absolute_level must be a positive integer, got {other}"),
        };
        Ok(heading(&text, level))
    }
}

/// Format `text` as a heading, clamping the level to 1..=6.
pub fn heading(text: &str, level: usize) -> String {
    let level = level.clamp(1, MAX_HEADING_LEVEL);
    format!("{} {}", "#".repeat(level), text.trim())
}

/// `items` as a bullet or numbered list.
///
/// String items are rendered as templates. With `item_template`, each item is
/// rendered through it with the item bound to `item`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListProvider;

impl ContentProvider for ListProvider {
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        Some(&["marker"])
    }

    fn render(&self, request: &ContentRequest<'_>) -> Result<String> {
        let items = match request.args.get("items") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => bail!("missing required argument 'items'"),
            Some(other) => bail!("argument 'items' must be a list, got {other}"),
        };
        let ordered = request.args.get("ordered").and_then(Value::as_bool).unwrap_or(false);
        let marker = request.config.get("marker").and_then(Value::as_str).unwrap_or("-");
        let template = request.args.get("item_template").and_then(Value::as_str);

        let mut lines = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let text = match (template, item) {
                (Some(template), _) => request.render_with(template, "item", item.clone())?,
                (None, Value::String(s)) => request.render(s)?,
                (None, other) => other.to_string(),
            };
            let prefix = if ordered { format!("{}.", index + 1) } else { marker.to_string() };
            lines.push(format!("{prefix} {text}"));
        }
        Ok(lines.join("\n"))
    }
}

/// A fenced code block. The code itself is never templated.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeProvider;

impl ContentProvider for CodeProvider {
    fn config_keys(&self) -> Option<&'static [&'static str]> {
        Some(&["language"])
    }

    fn render(&self, request: &ContentRequest<'_>) -> Result<String> {
        let code = request.str_arg("value")?;
        let language = request
            .args
            .get("language")
            .or_else(|| request.config.get("language"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let fence = if code.contains("```") { "````" } else { "```" };
        Ok(format!("{fence}{language}\n{}\n{fence}", code.trim_end_matches('\n')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templating::TemplateRenderer;
    use serde_json::{Map, json};

    fn request<'a>(
        args: &'a Map<String, Value>,
        config: &'a Map<String, Value>,
        context: &'a Value,
        templates: &'a TemplateRenderer,
    ) -> ContentRequest<'a> {
        ContentRequest {
            args,
            config,
            context,
            heading_level: 2,
            templates,
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_text_is_templated() {
        let args = obj(json!({"value": "Hello {{ vars.name }}"}));
        let context = json!({"vars": {"name": "World"}});
        let templates = TemplateRenderer::default();
        let out = TextProvider.render(&request(&args, &Map::new(), &context, &templates)).unwrap();
        assert_eq!(out, "Hello World");
    }

    #[test]
    fn test_text_requires_value() {
        let templates = TemplateRenderer::default();
        let context = json!({});
        let err = TextProvider.render(&request(&Map::new(), &Map::new(), &context, &templates)).unwrap_err();
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn test_title_levels() {
        let templates = TemplateRenderer::default();
        let context = json!({});
        let args = obj(json!({"value": "Intro"}));
        assert_eq!(TitleProvider.render(&request(&args, &Map::new(), &context, &templates)).unwrap(), "## Intro");
        let args = obj(json!({"value": "Deep", "absolute_level": 9}));
        assert_eq!(
            TitleProvider.render(&request(&args, &Map::new(), &context, &templates)).unwrap(),
            "###### Deep"
        );
    }

    #[test]
    fn test_list_variants() {
        let templates = TemplateRenderer::default();
        let context = json!({"vars": {"x": "X"}});
        let args = obj(json!({"items": ["a {{ vars.x }}", 2]}));
        let config = obj(json!({"marker": "*"}));
        assert_eq!(ListProvider.render(&request(&args, &config, &context, &templates)).unwrap(), "* a X\n* 2");

        let args = obj(json!({"items": [{"n": 1}, {"n": 2}], "ordered": true, "item_template": "n={{ item.n }}"}));
        assert_eq!(
            ListProvider.render(&request(&args, &Map::new(), &context, &templates)).unwrap(),
            "1. n=1\n2. n=2"
        );
    }

    #[test]
    fn test_code_is_not_templated() {
        let templates = TemplateRenderer::default();
        let context = json!({});
        let args = obj(json!({"value": "let x = \"{{ y }}\";\n"}));
        let config = obj(json!({"language": "rust"}));
        assert_eq!(
            CodeProvider.render(&request(&args, &config, &context, &templates)).unwrap(),
            "```rust\nlet x = \"{{ y }}\";\n```"
        );
    }
}
