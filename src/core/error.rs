//! Error handling for docweave
//!
//! This module provides the fatal error type for the engine and the user-friendly
//! error reporting used by the CLI. The error system is split in two:
//! 1. **Fatal errors** ([`EngineError`]) abort a whole run: the target cannot be parsed or
//!    found, definition files cannot be read, or the run was cancelled.
//! 2. **Block-scoped failures** never abort a run. They are recorded as
//!    [`Diagnostic`](super::Diagnostic)s and returned next to the partial output.
//!
//! Use [`user_friendly_error`] to convert any error into an [`ErrorContext`] with
//! contextual suggestions.
//!
//! # Examples
//!
//! ```rust,no_run
//! use docweave::core::{EngineError, user_friendly_error};
//!
//! let error = EngineError::Cancelled;
//! let ctx = user_friendly_error(anyhow::Error::from(error));
//! ctx.display(); // Shows colored error with suggestions
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Fatal errors raised by the engine, the definition loader, and the config layer.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// A render or fetch target string does not follow the target grammar
    ///
    /// Valid targets are `document.<name>`, `data.<type>.<name>` and
    /// `document.<name>.data.<type>.<name>`.
    #[error("Invalid target '{target}': {reason}")]
    InvalidTarget {
        /// The target string as given
        target: String,
        /// Why it was rejected
        reason: String,
    },

    /// The target is well-formed but no block with that key was loaded
    #[error("Target '{target}' not found")]
    TargetNotFound {
        /// The target string as given
        target: String,
        /// Known keys that are close to the requested one
        suggestions: Vec<String>,
    },

    /// A definition file could not be parsed
    #[error("Invalid definition file {file}: {reason}")]
    DefinitionParse {
        /// Path of the offending file
        file: String,
        /// Parser message
        reason: String,
    },

    /// Reading a definition or config file failed
    #[error("File system error: {operation} {path}")]
    FileSystem {
        /// What was being attempted ("read", "walk", ...)
        operation: String,
        /// Path involved
        path: String,
        /// Underlying I/O message
        reason: String,
    },

    /// The engine configuration is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// The run was cancelled through its cancellation token
    #[error("Evaluation cancelled")]
    Cancelled,

    /// Catch-all for failures without a dedicated variant
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

/// User-facing wrapper around an [`EngineError`] with optional details and suggestion.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying engine error
    pub error: EngineError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from an [`EngineError`].
    #[must_use]
    pub const fn new(error: EngineError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    ///
    /// Suggestions are displayed in green in the terminal.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions.
///
/// Recognizes [`EngineError`] variants, [`std::io::Error`], and TOML/YAML parse
/// errors. Anything else is wrapped as [`EngineError::Other`] with the full
/// error chain as details.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(engine_error) = error.downcast_ref::<EngineError>() {
        return create_error_context(engine_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        let ctx = ErrorContext::new(EngineError::FileSystem {
            operation: "access".to_string(),
            path: "unknown".to_string(),
            reason: io_error.to_string(),
        });
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => ctx
                .with_suggestion("Check that the file or directory exists and the path is correct"),
            std::io::ErrorKind::PermissionDenied => {
                ctx.with_suggestion("Check the file permissions of the definition sources")
            }
            _ => ctx,
        };
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(EngineError::Config {
            message: toml_error.message().to_string(),
        })
        .with_suggestion("Check docweave.toml for typos; unknown keys are rejected");
    }

    let chain = error.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>();
    let ctx = ErrorContext::new(EngineError::Other {
        message: error.to_string(),
    });
    if chain.is_empty() {
        ctx
    } else {
        ctx.with_details(chain.join(": "))
    }
}

fn create_error_context(error: EngineError) -> ErrorContext {
    match &error {
        EngineError::TargetNotFound {
            suggestions,
            ..
        } => {
            let ctx = ErrorContext::new(error.clone());
            if suggestions.is_empty() {
                ctx.with_suggestion("Run 'docweave validate' to list the loaded block keys")
            } else {
                ctx.with_suggestion(format!("Did you mean: {}?", suggestions.join(", ")))
            }
        }
        EngineError::InvalidTarget {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Use 'document.<name>', 'data.<type>.<name>' or 'document.<name>.data.<type>.<name>'",
        ),
        EngineError::DefinitionParse {
            ..
        } => ErrorContext::new(error)
            .with_details("Definition files are YAML or JSON documents with a top-level 'blocks' list"),
        EngineError::Cancelled => {
            ErrorContext::new(error).with_details("The run was interrupted before it completed")
        }
        _ => ErrorContext::new(error),
    }
}
