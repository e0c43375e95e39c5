//! Variable scope resolution.
//!
//! Each block instance gets a [`ScopeFrame`]: an ordered list of [`VarSlot`]s
//! linked to its parent's frame. Slots are evaluated lazily. A slot's expression
//! sees the slots declared before it in the same frame (latest first) and then
//! every slot of its ancestors, never anything declared after it. Referring to a
//! later name simply yields `null`.
//!
//! Two construction rules produce a frame's slot list:
//!
//! - **Plain nesting**: the block's own `vars` in declaration order, on top of the
//!   parent frame. A redeclared name becomes a new slot that shadows the ancestor's
//!   from that point on.
//! - **Ref merge**: for a `ref` chain, the concrete block's own vars form the base
//!   list and each override (innermost first) replaces matching names in place and
//!   appends new names after everything else. See [`merge_decls`].
//!
//! Frames are immutable once built and shared behind [`Arc`], so memoized slot
//! values are reused by every descendant. A memo records the [`Roots`]
//! generation it was computed at: once more data or output exists, a slot whose
//! expression contains a query is evaluated again on its next read.

use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};

use crate::blocks::{BlockDefinition, Expr, LOCAL_VAR_NAME, VarDecl};
use crate::core::Diagnostic;
use crate::query::{QueryEnv, QueryError, QueryEvaluator};

/// Context roots (`document`, `data`, `env`, ...) a slot may read.
///
/// `generation` counts how much data and output existed when the roots were
/// captured; it only ever grows during one evaluation.
#[derive(Debug, Clone, Default)]
pub struct Roots {
    values: Map<String, Value>,
    generation: u64,
}

impl Roots {
    pub fn new(values: Map<String, Value>, generation: u64) -> Self {
        Self {
            values,
            generation,
        }
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl From<Map<String, Value>> for Roots {
    fn from(values: Map<String, Value>) -> Self {
        Self::new(values, 0)
    }
}

#[derive(Debug, Clone)]
struct Memo {
    /// `None` when the value cannot depend on the roots
    generation: Option<u64>,
    result: Result<Value, QueryError>,
}

impl Memo {
    fn is_valid_at(&self, generation: u64) -> bool {
        self.generation.is_none_or(|seen| seen == generation)
    }
}

/// One `name = expression` entry with its memoized value.
#[derive(Debug)]
pub struct VarSlot {
    name: String,
    expr: Expr,
    memo: Mutex<Option<Memo>>,
}

impl VarSlot {
    pub fn new(decl: VarDecl) -> Self {
        Self {
            name: decl.name,
            expr: decl.expr,
            memo: Mutex::new(None),
        }
    }

    /// A slot whose value is already known.
    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            expr: Expr::literal(value.clone()),
            memo: Mutex::new(Some(Memo {
                generation: None,
                result: Ok(value),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_resolved(&self) -> bool {
        self.memo.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn cached(&self, generation: u64) -> Option<Result<Value, QueryError>> {
        let memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
        memo.as_ref().filter(|memo| memo.is_valid_at(generation)).map(|memo| memo.result.clone())
    }

    fn remember(&self, generation: u64, result: &Result<Value, QueryError>) {
        let generation = (!self.expr.is_constant()).then_some(generation);
        *self.memo.lock().unwrap_or_else(PoisonError::into_inner) = Some(Memo {
            generation,
            result: result.clone(),
        });
    }
}

/// A block instance's variable environment.
#[derive(Debug, Default)]
pub struct ScopeFrame {
    parent: Option<Arc<ScopeFrame>>,
    slots: Vec<VarSlot>,
}

impl ScopeFrame {
    /// The empty frame every evaluation starts from.
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A frame for `decls` on top of `parent`. Returns `parent` itself when there
    /// is nothing to declare.
    pub fn child(parent: &Arc<ScopeFrame>, decls: Vec<VarDecl>) -> Arc<Self> {
        if decls.is_empty() {
            return Arc::clone(parent);
        }
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            slots: decls.into_iter().map(VarSlot::new).collect(),
        })
    }

    /// A frame of already-evaluated bindings, used for dynamic iterations.
    pub fn with_constants<I>(parent: &Arc<ScopeFrame>, bindings: I) -> Arc<Self>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            slots: bindings.into_iter().map(|(name, value)| VarSlot::constant(name, value)).collect(),
        })
    }

    pub fn slots(&self) -> &[VarSlot] {
        &self.slots
    }

    pub fn parent(&self) -> Option<&Arc<ScopeFrame>> {
        self.parent.as_ref()
    }

    /// Query environment seeing every slot of this frame and its ancestors.
    pub fn env<'a>(&'a self, roots: &'a Roots, evaluator: &'a dyn QueryEvaluator) -> ScopeEnv<'a> {
        ScopeEnv {
            frame: self,
            upto: self.slots.len(),
            roots,
            evaluator,
        }
    }

    /// Visible value of `name`, or `None` when nothing declares it.
    pub fn lookup(
        &self,
        name: &str,
        roots: &Roots,
        evaluator: &dyn QueryEvaluator,
    ) -> Result<Option<Value>, QueryError> {
        self.lookup_before(self.slots.len(), name, roots, evaluator)
    }

    /// Every visible variable, later declarations shadowing earlier ones.
    pub fn resolve_all(
        &self,
        roots: &Roots,
        evaluator: &dyn QueryEvaluator,
    ) -> Result<Map<String, Value>, QueryError> {
        self.collect_before(self.slots.len(), roots, evaluator)
    }

    /// Names from `required` that are absent or `null` in this scope.
    pub fn missing_required(
        &self,
        required: &[String],
        roots: &Roots,
        evaluator: &dyn QueryEvaluator,
    ) -> Result<Vec<String>, QueryError> {
        let mut missing = Vec::new();
        for name in required {
            match self.lookup(name, roots, evaluator)? {
                None | Some(Value::Null) => missing.push(name.clone()),
                Some(_) => {}
            }
        }
        Ok(missing)
    }

    fn lookup_before(
        &self,
        upto: usize,
        name: &str,
        roots: &Roots,
        evaluator: &dyn QueryEvaluator,
    ) -> Result<Option<Value>, QueryError> {
        if let Some(index) = self.slots[..upto].iter().rposition(|slot| slot.name == name) {
            return self.force(index, roots, evaluator).map(Some);
        }
        match &self.parent {
            Some(parent) => parent.lookup_before(parent.slots.len(), name, roots, evaluator),
            None => Ok(None),
        }
    }

    fn collect_before(
        &self,
        upto: usize,
        roots: &Roots,
        evaluator: &dyn QueryEvaluator,
    ) -> Result<Map<String, Value>, QueryError> {
        let mut vars = match &self.parent {
            Some(parent) => parent.collect_before(parent.slots.len(), roots, evaluator)?,
            None => Map::new(),
        };
        for index in 0..upto {
            let value = self.force(index, roots, evaluator)?;
            vars.insert(self.slots[index].name.clone(), value);
        }
        Ok(vars)
    }

    /// Value of slot `index`, evaluated at most once per roots generation.
    fn force(&self, index: usize, roots: &Roots, evaluator: &dyn QueryEvaluator) -> Result<Value, QueryError> {
        let slot = &self.slots[index];
        let result = match slot.cached(roots.generation) {
            Some(result) => result,
            None => {
                tracing::debug!("evaluating variable '{}' = {}", slot.name, slot.expr);
                let env = ScopeEnv {
                    frame: self,
                    upto: index,
                    roots,
                    evaluator,
                };
                let result = eval_expr(slot.expr.as_value(), &env, evaluator);
                slot.remember(roots.generation, &result);
                result
            }
        };
        result.map_err(|e| match e {
            QueryError::Variable {
                ..
            } => e,
            other => QueryError::Variable {
                name: slot.name.clone(),
                message: other.to_string(),
            },
        })
    }
}

/// [`QueryEnv`] over a frame, limited to the slots before `upto`.
pub struct ScopeEnv<'a> {
    frame: &'a ScopeFrame,
    upto: usize,
    roots: &'a Roots,
    evaluator: &'a dyn QueryEvaluator,
}

impl QueryEnv for ScopeEnv<'_> {
    fn var(&self, name: &str) -> Result<Value, QueryError> {
        Ok(self.frame.lookup_before(self.upto, name, self.roots, self.evaluator)?.unwrap_or(Value::Null))
    }

    fn vars(&self) -> Result<Map<String, Value>, QueryError> {
        self.frame.collect_before(self.upto, self.roots, self.evaluator)
    }

    fn root_value(&self) -> Value {
        Value::Object(self.roots.values.clone())
    }
}

/// Evaluate an expression value, resolving every embedded query against `env`.
pub fn eval_expr(
    value: &Value,
    env: &dyn QueryEnv,
    evaluator: &dyn QueryEvaluator,
) -> Result<Value, QueryError> {
    if let Some(query) = crate::blocks::expr::as_query(value) {
        return evaluator.eval(query, env);
    }
    match value {
        Value::Array(items) => {
            items.iter().map(|item| eval_expr(item, env, evaluator)).collect::<Result<_, _>>().map(Value::Array)
        }
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), eval_expr(item, env, evaluator)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// A block's own declarations, with `local_var` desugared into a leading `local` slot.
///
/// Fails with "Local var redefinition" when `vars` also declares `local`. A
/// `local_var` next to a `vars` block that does not declare it is kept, with a
/// warning pushed onto `warnings`.
pub fn declared_vars(
    block: &BlockDefinition,
    warnings: &mut Vec<Diagnostic>,
) -> Result<Vec<VarDecl>, Diagnostic> {
    let Some(local) = &block.local_var else {
        return Ok(block.vars.clone());
    };
    if block.vars.iter().any(|decl| decl.name == LOCAL_VAR_NAME) {
        return Err(Diagnostic::error("Local var redefinition")
            .with_detail(format!("'{LOCAL_VAR_NAME}' is set by both local_var and vars")));
    }
    if !block.vars.is_empty() {
        warnings.push(Diagnostic::warning("Local var specified together with vars block"));
    }
    let mut decls = Vec::with_capacity(block.vars.len() + 1);
    decls.push(VarDecl::new(LOCAL_VAR_NAME, local.clone()));
    decls.extend(block.vars.iter().cloned());
    Ok(decls)
}

/// Slot list for a resolved `ref` chain (use-site first, concrete block last).
///
/// A plain block is a chain of one and gets its own declarations unchanged.
pub fn chain_vars(
    chain: &[Arc<BlockDefinition>],
    warnings: &mut Vec<Diagnostic>,
) -> Result<Vec<VarDecl>, Diagnostic> {
    let mut merged = Vec::new();
    for block in chain.iter().rev() {
        merged = merge_decls(merged, declared_vars(block, warnings)?);
    }
    Ok(merged)
}

/// Layer `overrides` onto `base`: matching names keep their position in `base`
/// with the override's expression; new names are appended in override order.
pub fn merge_decls(base: Vec<VarDecl>, overrides: Vec<VarDecl>) -> Vec<VarDecl> {
    let mut merged = base;
    for decl in overrides {
        match merged.iter_mut().find(|slot| slot.name == decl.name) {
            Some(slot) => slot.expr = decl.expr,
            None => merged.push(decl),
        }
    }
    merged
}
