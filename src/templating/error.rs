//! Template error types.

use thiserror::Error;

/// Failure while rendering a block attribute template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template variable not found: '{variable}'{}", format_suggestions(suggestions))]
    VariableNotFound {
        variable: String,
        /// Close matches among the variables the template could see
        suggestions: Vec<String>,
    },

    #[error("Template syntax error: {message}{}", format_line(*line_number))]
    SyntaxError {
        message: String,
        /// 1-indexed line reported by tera, when available
        line_number: Option<usize>,
    },

    #[error("Invalid template context: {0}")]
    Context(String),
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean {}?)", suggestions.join(", "))
    }
}

fn format_line(line_number: Option<usize>) -> String {
    line_number.map(|line| format!(" at line {line}")).unwrap_or_default()
}
