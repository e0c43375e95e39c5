//! Query expression collaborator.
//!
//! The engine never interprets query text itself. It hands each `query_jq`
//! expression to a [`QueryEvaluator`] together with a [`QueryEnv`] describing what
//! the expression may see. Variables are exposed lazily through [`QueryEnv::var`],
//! so evaluating `.vars.a` only forces the slot that defines `a`.
//!
//! [`Jq`] is the bundled evaluator, running full jq through the `jaq` crates.

mod jq;

pub use jq::Jq;

use serde_json::{Map, Value};
use thiserror::Error;

/// Failure while evaluating a query.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("cannot parse query '{query}': {message}")]
    Parse {
        query: String,
        message: String,
    },

    /// The query ran and failed, e.g. adding a number to a string
    #[error("{message}")]
    Type {
        message: String,
    },

    /// A variable slot this query depends on failed to evaluate
    #[error("variable '{name}' failed to evaluate: {message}")]
    Variable {
        name: String,
        message: String,
    },
}

/// What a query may see.
pub trait QueryEnv {
    /// Value of the variable `name` visible at this point, `Null` when absent.
    fn var(&self, name: &str) -> Result<Value, QueryError>;

    /// Every visible variable, later declarations shadowing earlier ones.
    fn vars(&self) -> Result<Map<String, Value>, QueryError>;

    /// Every non-variable root (`document`, `data`, `env`, ...) as one object.
    fn root_value(&self) -> Value;
}

/// Evaluates query text against an environment.
pub trait QueryEvaluator: Send + Sync {
    fn eval(&self, query: &str, env: &dyn QueryEnv) -> Result<Value, QueryError>;
}

/// A [`QueryEnv`] backed by a plain JSON value whose `vars` key holds the variables.
#[derive(Debug, Clone, Default)]
pub struct ValueEnv {
    value: Value,
}

impl ValueEnv {
    pub fn new(value: Value) -> Self {
        Self {
            value,
        }
    }
}

impl QueryEnv for ValueEnv {
    fn var(&self, name: &str) -> Result<Value, QueryError> {
        Ok(self.value.get("vars").and_then(|vars| vars.get(name)).cloned().unwrap_or(Value::Null))
    }

    fn vars(&self) -> Result<Map<String, Value>, QueryError> {
        Ok(self.value.get("vars").and_then(Value::as_object).cloned().unwrap_or_default())
    }

    fn root_value(&self) -> Value {
        match &self.value {
            Value::Object(map) => {
                let mut map = map.clone();
                map.remove("vars");
                Value::Object(map)
            }
            other => other.clone(),
        }
    }
}
