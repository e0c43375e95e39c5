//! jq evaluation on top of the `jaq` crates.
//!
//! Each query runs against one input object holding the context roots plus a
//! `vars` object. Only the variables the query names through `.vars.<name>`
//! paths are forced; any other use of `.vars` resolves every visible variable.

use jaq_core::load::{Arena, File, Loader};
use jaq_core::{Compiler, Ctx, RcIter};
use jaq_json::Val;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::LazyLock;

use super::{QueryEnv, QueryError, QueryEvaluator};

/// `.vars` followed by an optional single field access.
static VARS_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\.vars\b(?:\s*\.\s*(?:([A-Za-z_][A-Za-z0-9_]*)|"([^"\\]*)")|\s*\.?\[\s*"([^"\\]*)"\s*\])?"#)
        .expect("static vars pattern is valid")
});

/// Which variables a query reads.
#[derive(Debug, Clone, PartialEq, Eq)]
enum VarsAccess {
    Names(BTreeSet<String>),
    All,
}

fn vars_access(query: &str) -> VarsAccess {
    if query.contains("\"vars\"") {
        return VarsAccess::All;
    }
    let mut names = BTreeSet::new();
    for caps in VARS_ACCESS.captures_iter(query) {
        match caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
            Some(name) => {
                names.insert(name.as_str().to_string());
            }
            None => return VarsAccess::All,
        }
    }
    VarsAccess::Names(names)
}

/// Bundled [`QueryEvaluator`] running full jq through `jaq`.
///
/// A query producing no output yields `null`; one producing several yields them
/// as an array.
#[derive(Debug, Default, Clone, Copy)]
pub struct Jq;

impl QueryEvaluator for Jq {
    fn eval(&self, query: &str, env: &dyn QueryEnv) -> Result<Value, QueryError> {
        let input = input_for(query, env)?;
        tracing::trace!(query, "evaluating query");
        run(query, input)
    }
}

/// Context roots plus the variables `query` reads.
fn input_for(query: &str, env: &dyn QueryEnv) -> Result<Value, QueryError> {
    let vars = match vars_access(query) {
        VarsAccess::All => env.vars()?,
        VarsAccess::Names(names) => {
            let mut vars = Map::new();
            for name in names {
                vars.insert(name.clone(), env.var(&name)?);
            }
            vars
        }
    };
    let mut input = match env.root_value() {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    input.insert("vars".to_string(), Value::Object(vars));
    Ok(Value::Object(input))
}

fn run(query: &str, input: Value) -> Result<Value, QueryError> {
    let parse_error = |message: String| QueryError::Parse {
        query: query.to_string(),
        message,
    };

    let program = File {
        code: query,
        path: (),
    };
    let loader = Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = Arena::default();
    let modules = loader
        .load(&arena, program)
        .map_err(|errs| parse_error(format!("invalid syntax ({} error(s))", errs.len())))?;
    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| parse_error(format!("undefined symbol ({} error(s))", errs.len())))?;

    let inputs = RcIter::new(core::iter::empty());
    let mut outputs = Vec::new();
    for output in filter.run((Ctx::new([], &inputs), Val::from(input))) {
        let val = output.map_err(|e| QueryError::Type {
            message: e.to_string(),
        })?;
        outputs.push(to_json(&val)?);
    }
    Ok(match outputs.len() {
        0 => Value::Null,
        1 => outputs.remove(0),
        _ => Value::Array(outputs),
    })
}

/// `jaq` values print as JSON.
fn to_json(val: &Val) -> Result<Value, QueryError> {
    serde_json::from_str(&val.to_string()).map_err(|e| QueryError::Type {
        message: format!("query produced a value that is not JSON ({val}): {e}"),
    })
}
