//! Inclusion predicates and the tag gate.
//!
//! `is_included` uses its own truthiness, stricter than jq's: `null`, `false`, and
//! empty strings, lists and maps are falsy. Everything else, `0` included, is truthy.
//!
//! The tag gate decides which blocks survive when a run requires a tag set `T`.
//! Containers (documents and sections) carry a [`TagGate`] computed top-down: a
//! container is [`Open`](TagGate::Open) when its own tags include `T` or its parent
//! is already open, and an open subtree is never tag-checked again. Under a
//! [`Filtered`](TagGate::Filtered) container each content block needs `T` itself,
//! and a section survives only if something inside it does.

use serde_json::Value;

use crate::blocks::{Expr, Meta};
use crate::query::{QueryEnv, QueryError, QueryEvaluator};
use crate::scope::eval_expr;

/// Truthiness of an `is_included` or dynamic `condition` value.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

/// Evaluate an optional `is_included` expression; absent means included.
pub fn evaluate_inclusion(
    expr: Option<&Expr>,
    env: &dyn QueryEnv,
    evaluator: &dyn QueryEvaluator,
) -> Result<bool, QueryError> {
    match expr {
        None => Ok(true),
        Some(expr) => eval_expr(expr.as_value(), env, evaluator).map(|value| is_truthy(&value)),
    }
}

/// Tag gate state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagGate {
    /// Every descendant renders regardless of its tags
    Open,
    /// Content blocks must carry the required tags themselves
    Filtered,
}

impl TagGate {
    pub fn is_open(self) -> bool {
        self == Self::Open
    }
}

/// The required tag set of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    required: Vec<String>,
}

impl TagFilter {
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut required: Vec<String> = required.into_iter().map(Into::into).collect();
        required.sort();
        required.dedup();
        Self {
            required,
        }
    }

    /// Gate above the document root. With no required tags everything is open.
    pub fn outer_gate(&self) -> TagGate {
        if self.required.is_empty() { TagGate::Open } else { TagGate::Filtered }
    }

    /// Gate of a container entered from a parent in state `parent`.
    pub fn enter(&self, parent: TagGate, meta: &Meta) -> TagGate {
        if parent.is_open() || meta.has_all_tags(&self.required) {
            TagGate::Open
        } else {
            TagGate::Filtered
        }
    }

    /// Whether a content block passes the gate of its parent.
    pub fn admits(&self, parent: TagGate, meta: &Meta) -> bool {
        parent.is_open() || meta.has_all_tags(&self.required)
    }
}
