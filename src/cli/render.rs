//! Render a document to markdown.
//!
//! # Examples
//!
//! ```bash
//! docweave render document.report docs/
//! docweave render document.report docs/ --tags public --output report.md
//! docweave render document.report --format json
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use super::common::{OutputFormat, SourceArgs, check_diagnostics, load_engine, run_cancellable};

/// Command to render a document target.
#[derive(Args, Debug)]
pub struct RenderCommand {
    /// Document to render, e.g. `document.report`
    #[arg(value_name = "TARGET")]
    pub target: String,

    #[command(flatten)]
    pub sources: SourceArgs,

    /// Write the output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl RenderCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let (engine, parsed) = load_engine(&self.sources, config_path).await?;
        let target = self.target.clone();
        let mut output = run_cancellable(engine, move |engine| engine.render_content(&target)).await?;

        let mut diagnostics = parsed.diagnostics;
        diagnostics.extend(output.diagnostics);
        output.diagnostics = diagnostics;

        let text = match self.format {
            OutputFormat::Text => {
                output.diagnostics.display();
                output.markdown()
            }
            OutputFormat::Json => serde_json::to_string_pretty(&output)?,
        };
        match &self.output {
            Some(path) => {
                tokio::fs::write(path, format!("{text}\n"))
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                if self.format == OutputFormat::Text {
                    eprintln!("{} {} to {}", "Rendered".green().bold(), self.target, path.display());
                }
            }
            None => println!("{text}"),
        }
        check_diagnostics(&output.diagnostics, self.strict)
    }
}
