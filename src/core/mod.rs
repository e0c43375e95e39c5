//! Core types for docweave
//!
//! This module holds the error handling shared by every other module:
//!
//! - [`EngineError`] - fatal failures that abort a run (bad target, unreadable sources,
//!   cancellation)
//! - [`ErrorContext`] / [`user_friendly_error`] - CLI presentation with suggestions
//! - [`Diagnostic`] / [`Diagnostics`] - block-scoped problems collected during evaluation
//!   and returned next to the partial output

pub mod diagnostics;
pub mod error;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{EngineError, ErrorContext, user_friendly_error};
