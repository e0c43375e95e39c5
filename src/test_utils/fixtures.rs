//! Sample definition files.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A definition file to write into a test directory.
#[derive(Clone, Debug)]
pub struct DefinitionFixture {
    /// File name, including the extension
    pub name: String,
    pub content: String,
}

impl DefinitionFixture {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// A document with a title, a variable, and one data-driven section.
    pub fn report() -> Self {
        Self::new(
            "report.yaml",
            r#"
blocks:
  - kind: document
    name: report
    title: "Report for {{ vars.customer }}"
    vars:
      customer: ACME
    blocks:
      - kind: data
        type: inline
        name: regions
        list: [emea, apac]
      - kind: section
        title: Regions
        blocks:
          - kind: dynamic
            items: { query_jq: ".data.inline.regions.list" }
            blocks:
              - kind: content
                type: text
                meta: { tags: [public] }
                value: "- {{ vars.dynamic_item }}"
          - kind: content
            type: text
            meta: { tags: [internal] }
            value: internal notes
"#
            .trim_start(),
        )
    }

    /// Shared blocks the report refers to by key.
    pub fn library() -> Self {
        Self::new(
            "library.yaml",
            r#"
blocks:
  - kind: section
    name: footer
    vars:
      year: 2024
    blocks:
      - kind: content
        type: text
        value: "(c) {{ vars.year }}"
  - kind: config
    type: content.code
    name: shell
    language: sh
"#
            .trim_start(),
        )
    }

    /// Not a definition file at all.
    pub fn invalid_syntax() -> Self {
        Self::new("broken.yaml", "blocks: [ { kind: document, name: x\n")
    }

    /// Write the fixture into `dir`, returning its path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(&self.name);
        fs::write(&path, &self.content).with_context(|| format!("Failed to write fixture {}", path.display()))?;
        Ok(path)
    }
}
