use serde_json::{Map, Value};
use std::sync::Arc;

use crate::query::{QueryError, QueryEvaluator};
use crate::scope::{Roots, ScopeEnv, ScopeFrame, eval_expr};
use crate::templating::VarUsage;

/// What one block sees while it is evaluated: its scope frame plus the
/// non-variable context roots (`document`, `section`, `content`, `data`, `env`).
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    frame: Arc<ScopeFrame>,
    roots: Roots,
}

impl EvaluationContext {
    pub fn new(frame: Arc<ScopeFrame>, roots: Roots) -> Self {
        Self {
            frame,
            roots,
        }
    }

    pub fn frame(&self) -> &Arc<ScopeFrame> {
        &self.frame
    }

    pub fn roots(&self) -> &Roots {
        &self.roots
    }

    pub fn env<'a>(&'a self, evaluator: &'a dyn QueryEvaluator) -> ScopeEnv<'a> {
        self.frame.env(&self.roots, evaluator)
    }

    /// Evaluate every query embedded in `value`.
    pub fn eval(&self, value: &Value, evaluator: &dyn QueryEvaluator) -> Result<Value, QueryError> {
        eval_expr(value, &self.env(evaluator), evaluator)
    }

    pub fn missing_required(
        &self,
        required: &[String],
        evaluator: &dyn QueryEvaluator,
    ) -> Result<Vec<String>, QueryError> {
        self.frame.missing_required(required, &self.roots, evaluator)
    }

    /// The roots plus the variables in `usage` under `vars`, as handed to templates.
    ///
    /// Only the named slots are forced. A name nothing declares is left out, so
    /// the template reports it as missing.
    pub fn template_context(&self, usage: &VarUsage, evaluator: &dyn QueryEvaluator) -> Result<Value, QueryError> {
        let vars = match usage {
            VarUsage::Nothing => Map::new(),
            VarUsage::All => self.frame.resolve_all(&self.roots, evaluator)?,
            VarUsage::Names(names) => {
                let mut vars = Map::new();
                for name in names {
                    if let Some(value) = self.frame.lookup(name, &self.roots, evaluator)? {
                        vars.insert(name.clone(), value);
                    }
                }
                vars
            }
        };
        let mut context = self.roots.values().clone();
        context.insert("vars".to_string(), Value::Object(vars));
        Ok(Value::Object(context))
    }
}
