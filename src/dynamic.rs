//! Dynamic block expansion.
//!
//! A `dynamic` block expands into zero or more instances of its body. With
//! `items`, the body is instantiated once per element inside a fresh scope frame
//! binding `dynamic_item` and `dynamic_item_index`; a `condition` next to `items`
//! is then checked per iteration inside that frame. With only a `condition`, the
//! body is instantiated once when it holds.
//!
//! Bodies are shared [`Arc`] subtrees: an iteration is just the frame the body is
//! evaluated against.

use serde_json::Value;
use std::sync::Arc;

use crate::blocks::BlockDefinition;
use crate::core::Diagnostic;
use crate::filter::is_truthy;
use crate::query::{QueryError, QueryEvaluator};
use crate::scope::{Roots, ScopeFrame, eval_expr};

/// Variable bound to the current element.
pub const DYNAMIC_ITEM: &str = "dynamic_item";

/// Variable bound to the zero-based position of the current element.
pub const DYNAMIC_ITEM_INDEX: &str = "dynamic_item_index";

/// One instantiation of a dynamic block's body.
#[derive(Debug, Clone)]
pub struct Iteration {
    /// Position in `items`, when iterating
    pub index: Option<usize>,
    /// Scope the body's children are evaluated against
    pub frame: Arc<ScopeFrame>,
}

/// Compute the iterations of `block` evaluated in `frame`.
///
/// `frame` already holds the dynamic block's own vars. Warnings that still allow
/// siblings to render are pushed onto `warnings`; an `Err` means the block renders
/// nothing and the diagnostic should be recorded as an error.
pub fn expand(
    block: &BlockDefinition,
    frame: &Arc<ScopeFrame>,
    roots: &Roots,
    evaluator: &dyn QueryEvaluator,
    max_items: usize,
    warnings: &mut Vec<Diagnostic>,
) -> Result<Vec<Iteration>, Diagnostic> {
    let Some(items_expr) = &block.items else {
        let Some(condition) = &block.condition else {
            return Err(Diagnostic::error("Dynamic block without items")
                .with_detail("dynamic blocks need 'items' or 'condition'"));
        };
        let env = frame.env(roots, evaluator);
        let holds = eval_expr(condition.as_value(), &env, evaluator).map_err(expression_failed)?;
        tracing::debug!("dynamic condition evaluated to {}", is_truthy(&holds));
        return Ok(if is_truthy(&holds) {
            vec![Iteration {
                index: None,
                frame: Arc::clone(frame),
            }]
        } else {
            Vec::new()
        });
    };

    if !block.has_renderable_children() {
        warnings.push(Diagnostic::warning("Dynamic block without content"));
        return Ok(Vec::new());
    }

    let env = frame.env(roots, evaluator);
    let items = match eval_expr(items_expr.as_value(), &env, evaluator).map_err(expression_failed)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(Diagnostic::error("Invalid dynamic items")
                .with_detail(format!("items must evaluate to a list, got {other}")));
        }
    };
    if items.len() > max_items {
        return Err(Diagnostic::error("Invalid dynamic items")
            .with_detail(format!("{} items exceed the limit of {max_items}", items.len())));
    }
    tracing::debug!("expanding dynamic block over {} item(s)", items.len());

    let mut iterations = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let iteration = ScopeFrame::with_constants(
            frame,
            [
                (DYNAMIC_ITEM.to_string(), item),
                (DYNAMIC_ITEM_INDEX.to_string(), Value::from(index)),
            ],
        );
        if let Some(condition) = &block.condition {
            let env = iteration.env(roots, evaluator);
            let holds = eval_expr(condition.as_value(), &env, evaluator).map_err(expression_failed)?;
            if !is_truthy(&holds) {
                continue;
            }
        }
        iterations.push(Iteration {
            index: Some(index),
            frame: iteration,
        });
    }
    Ok(iterations)
}

fn expression_failed(error: QueryError) -> Diagnostic {
    Diagnostic::error("Expression evaluation failed").with_detail(error.to_string())
}
