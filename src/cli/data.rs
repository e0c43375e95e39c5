//! Fetch one data block as JSON.
//!
//! # Examples
//!
//! ```bash
//! docweave data data.json.releases docs/
//! docweave data document.report.data.inline.totals docs/ --format json
//! ```

use anyhow::Result;
use clap::Args;
use serde_json::json;
use std::path::Path;

use super::common::{OutputFormat, SourceArgs, check_diagnostics, load_engine, run_cancellable};

/// Command to fetch a data target.
#[derive(Args, Debug)]
pub struct DataCommand {
    /// `data.<type>.<name>` or `document.<name>.data.<type>.<name>`
    #[arg(value_name = "TARGET")]
    pub target: String,

    #[command(flatten)]
    pub sources: SourceArgs,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl DataCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let (engine, parsed) = load_engine(&self.sources, config_path).await?;
        let target = self.target.clone();
        let output = run_cancellable(engine, move |engine| engine.fetch_data(&target)).await?;

        let mut diagnostics = parsed.diagnostics;
        diagnostics.extend(output.diagnostics);

        match self.format {
            OutputFormat::Text => {
                diagnostics.display();
                println!("{}", serde_json::to_string_pretty(&output.data)?);
            }
            OutputFormat::Json => {
                let report = json!({ "data": output.data, "diagnostics": diagnostics });
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        check_diagnostics(&diagnostics, self.strict)
    }
}
