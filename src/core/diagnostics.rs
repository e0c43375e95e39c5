//! Block-scoped diagnostics collected during a run.
//!
//! A [`Diagnostic`] never aborts evaluation. The evaluator records it against the
//! block path that produced it and keeps going with siblings and ancestors. The
//! complete [`Diagnostics`] list is returned next to whatever output was produced.

use colored::Colorize;
use serde::Serialize;
use std::fmt;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Output was still produced
    Warning,
    /// The affected block contributes nothing to its parent
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One recorded problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Short, stable summary such as "Circular reference detected"
    pub summary: String,
    /// Free-form detail, usually naming the keys involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Path of the block that produced the diagnostic, e.g. `document.report > section.intro`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<String>,
    /// Definition file the block came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(Severity::Error, summary)
    }

    pub fn warning(summary: impl Into<String>) -> Self {
        Self::new(Severity::Warning, summary)
    }

    fn new(severity: Severity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            block: None,
            file: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn at_block(mut self, block: impl Into<String>) -> Self {
        self.block = Some(block.into());
        self
    }

    #[must_use]
    pub fn in_file(mut self, file: Option<impl AsRef<str>>) -> Self {
        self.file = file.map(|f| f.as_ref().to_string());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.summary)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        if let Some(block) = &self.block {
            write!(f, " (at {block})")?;
        }
        if let Some(file) = &self.file {
            write!(f, " [{file}]")?;
        }
        Ok(())
    }
}

/// Ordered collection of diagnostics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => tracing::debug!("recorded {diagnostic}"),
            Severity::Warning => tracing::warn!("{diagnostic}"),
        }
        self.0.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.severity == Severity::Warning)
    }

    /// Whether any diagnostic carries the given summary.
    pub fn contains(&self, summary: &str) -> bool {
        self.0.iter().any(|d| d.summary == summary)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Print every diagnostic to stderr with terminal colors.
    pub fn display(&self) {
        for diagnostic in &self.0 {
            let label = match diagnostic.severity {
                Severity::Error => "error".red().bold(),
                Severity::Warning => "warning".yellow().bold(),
            };
            eprint!("{label}: {}", diagnostic.summary);
            if let Some(detail) = &diagnostic.detail {
                eprint!(": {detail}");
            }
            eprintln!();
            if let Some(block) = &diagnostic.block {
                eprintln!("  {} {block}", "-->".blue());
            }
            if let Some(file) = &diagnostic.file {
                eprintln!("  {} {file}", "in".blue());
            }
        }
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<Vec<Diagnostic>> for Diagnostics {
    fn from(value: Vec<Diagnostic>) -> Self {
        Self(value)
    }
}
