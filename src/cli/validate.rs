//! Check definition files without rendering anything.
//!
//! Unlike a render run, which only reports problems on the paths it actually
//! evaluates, `validate` inspects every loaded block:
//!
//! - loader errors (unknown kinds, misplaced blocks, bad names)
//! - keys defined more than once
//! - `ref` chains that are broken or circular
//! - `depends_on` and `config` entries naming unknown blocks
//!
//! # Examples
//!
//! ```bash
//! docweave validate docs/
//! docweave validate docs/ --list
//! docweave validate docs/ --strict --format json
//! ```

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use super::common::{OutputFormat, SourceArgs, check_diagnostics, load_engine};
use crate::blocks::ConfigSource;
use crate::core::{Diagnostic, Diagnostics};
use crate::registry::{BlockRegistry, RefError, ResolutionStack};

/// Command to validate definition files.
#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Print every registered block key
    #[arg(long)]
    pub list: bool,

    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

/// JSON report of a validation run.
#[derive(Serialize)]
struct ValidationResults {
    /// No errors, and no warnings in strict mode
    valid: bool,
    files: usize,
    blocks: Vec<String>,
    diagnostics: Diagnostics,
}

impl ValidateCommand {
    pub async fn execute(self, config_path: Option<&Path>) -> Result<()> {
        let (engine, parsed) = load_engine(&self.sources, config_path).await?;
        let mut diagnostics = parsed.diagnostics.clone();
        diagnostics.extend(lint(engine.registry(), parsed.root_blocks()));

        let blocks: Vec<String> = engine.registry().keys().into_iter().map(ToString::to_string).collect();
        let valid = check_diagnostics(&diagnostics, self.strict).is_ok();
        match self.format {
            OutputFormat::Json => {
                let results = ValidationResults {
                    valid,
                    files: parsed.files.len(),
                    blocks,
                    diagnostics: diagnostics.clone(),
                };
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            OutputFormat::Text => {
                diagnostics.display();
                if self.list {
                    for key in &blocks {
                        println!("{key}");
                    }
                }
                if valid {
                    println!(
                        "{} {} block(s) in {} file(s)",
                        "✓".green(),
                        blocks.len(),
                        parsed.files.len()
                    );
                }
            }
        }
        check_diagnostics(&diagnostics, self.strict)
    }
}

/// Static checks over every loaded block.
fn lint<'a>(
    registry: &BlockRegistry,
    roots: impl Iterator<Item = &'a std::sync::Arc<crate::blocks::BlockDefinition>>,
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    for (key, definitions) in registry.conflicts() {
        let files: Vec<&str> = definitions.iter().filter_map(|block| block.origin()).collect();
        diagnostics.push(
            Diagnostic::warning("Conflicting block definitions")
                .with_detail(format!("{} definitions in {}", definitions.len(), files.join(", ")))
                .at_block(key.to_string()),
        );
    }

    for root in roots {
        for block in root.walk() {
            let report = |err: RefError| {
                Diagnostic::error(err.summary())
                    .with_detail(err.to_string())
                    .at_block(block.label())
                    .in_file(block.origin())
            };
            if block.is_ref()
                && let Err(err) = registry.resolve_chain(&block, &mut ResolutionStack::new())
            {
                diagnostics.push(report(err));
            }
            for key in &block.depends_on {
                if let Err(err) = registry.lookup(key) {
                    diagnostics.push(report(err));
                }
            }
            if let Some(ConfigSource::Ref(key)) = &block.config
                && let Err(err) = registry.lookup(key)
            {
                diagnostics.push(report(err));
            }
        }
    }
    diagnostics
}
