//! Rendered output tree.
//!
//! The evaluator assembles a [`RenderedNode`] tree: elements carry a markdown
//! fragment, sections group children. Printers consume the tree; the bundled
//! [`RenderedNode::to_markdown`] flattens it into one markdown document.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::blocks::Meta;

/// Kind of output node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Element,
    Section,
}

/// One node of the rendered output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Label of the block that produced the node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    /// Markdown payload of an element
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RenderedNode>,
}

impl RenderedNode {
    pub fn element(markdown: impl Into<String>, meta: Meta, block: Option<String>) -> Self {
        Self {
            kind: NodeKind::Element,
            block,
            markdown: Some(markdown.into()),
            meta,
            children: Vec::new(),
        }
    }

    pub fn section(meta: Meta, block: Option<String>) -> Self {
        Self {
            kind: NodeKind::Section,
            block,
            markdown: None,
            meta,
            children: Vec::new(),
        }
    }

    pub fn is_section(&self) -> bool {
        self.kind == NodeKind::Section
    }

    /// Markdown of this node and everything below it, fragments separated by blank lines.
    pub fn to_markdown(&self) -> String {
        let mut fragments = Vec::new();
        self.collect_markdown(&mut fragments);
        fragments.join("\n\n")
    }

    fn collect_markdown<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(markdown) = self.markdown.as_deref().filter(|m| !m.trim().is_empty()) {
            out.push(markdown);
        }
        for child in &self.children {
            child.collect_markdown(out);
        }
    }

    /// The node as seen by queries and templates.
    ///
    /// Sections expose their flattened markdown, so `children[i].markdown` works
    /// for any child.
    pub fn to_context_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(
            "type".to_string(),
            Value::String(
                match self.kind {
                    NodeKind::Element => "element",
                    NodeKind::Section => "section",
                }
                .to_string(),
            ),
        );
        if let Some(block) = &self.block {
            map.insert("block".to_string(), Value::String(block.clone()));
        }
        map.insert("markdown".to_string(), Value::String(self.to_markdown()));
        map.insert("meta".to_string(), self.meta.to_value());
        map.insert(
            "children".to_string(),
            Value::Array(self.children.iter().map(Self::to_context_value).collect()),
        );
        Value::Object(map)
    }

    /// Number of element nodes in this subtree.
    pub fn element_count(&self) -> usize {
        let own = usize::from(self.kind == NodeKind::Element);
        own + self.children.iter().map(Self::element_count).sum::<usize>()
    }
}
