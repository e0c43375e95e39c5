//! Depth-first block evaluation.
//!
//! A [`Run`] owns all mutable state of one evaluation: the resolution stack used
//! for cycle detection, the output containers being filled, the data fetched so
//! far, and the collected diagnostics. Block-scoped failures become diagnostics;
//! only cancellation aborts the walk.
//!
//! Every attached node and every fetched data value bumps the run's generation,
//! which tells memoized variables that the roots they read may have changed.

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

use super::Engine;
use super::context::EvaluationContext;
use crate::blocks::{BlockDefinition, BlockKey, BlockKind, ConfigSource, Meta};
use crate::core::{Diagnostic, Diagnostics, EngineError};
use crate::dynamic;
use crate::filter::{TagGate, evaluate_inclusion};
use crate::providers::content::heading;
use crate::providers::data::env_snapshot;
use crate::providers::unknown_config_keys;
use crate::providers::ContentRequest;
use crate::query::QueryError;
use crate::registry::{RefChain, RefError, ResolutionStack};
use crate::render::RenderedNode;
use crate::scope::{Roots, ScopeFrame, chain_vars};
use crate::templating::TemplateError;

/// What a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Full evaluation: content rendered, titles emitted
    Render,
    /// Only data blocks are evaluated; content blocks and titles are skipped
    DataOnly,
}

/// A document or section whose children are being evaluated.
struct Container {
    kind: BlockKind,
    meta: Meta,
    node: RenderedNode,
    /// Heading level of this container's title
    level: usize,
    /// Number of leading title elements in `node.children`
    titles: usize,
}

/// The children list currently being walked, with a done flag per entry so that
/// `depends_on` can pull a later sibling forward exactly once.
struct Siblings {
    blocks: Vec<Arc<BlockDefinition>>,
    done: Vec<bool>,
}

impl Siblings {
    fn new(blocks: &[Arc<BlockDefinition>]) -> Self {
        Self {
            blocks: blocks.to_vec(),
            done: vec![false; blocks.len()],
        }
    }

    /// A list holding only `block`, already marked as visited.
    fn visiting(block: &Arc<BlockDefinition>) -> Self {
        Self {
            blocks: vec![Arc::clone(block)],
            done: vec![true],
        }
    }

    fn position(&self, key: &BlockKey) -> Option<usize> {
        self.blocks.iter().position(|block| block.key().as_ref() == Some(key))
    }
}

/// One level of the walk: the children list being visited and the entry in it.
#[derive(Clone)]
struct Step {
    /// Frame the list's blocks are evaluated in
    frame: Arc<ScopeFrame>,
    gate: TagGate,
    index: usize,
}

/// A block whose `depends_on` is being processed.
struct Dependant<'a> {
    block: &'a Arc<BlockDefinition>,
    parent: &'a Arc<ScopeFrame>,
    /// The block's own frame
    frame: &'a Arc<ScopeFrame>,
    gate: TagGate,
    /// Gate its children are evaluated under
    inner_gate: TagGate,
}

/// Where a block evaluated ahead of its position would have been evaluated.
struct Placement {
    target: Arc<BlockDefinition>,
    /// Stand-in for the target's real parent, collecting its output
    container: Container,
    steps: Vec<Step>,
}

pub(crate) struct RunResult {
    pub node: Option<RenderedNode>,
    /// Fetched data, `type -> name -> value`
    pub data: Map<String, Value>,
    /// Data by the key of the block that produced it (use-site and concrete)
    pub fetched: HashMap<BlockKey, Value>,
    pub diagnostics: Diagnostics,
}

pub(crate) struct Run<'e> {
    engine: &'e Engine,
    mode: Mode,
    stack: ResolutionStack,
    diagnostics: Diagnostics,
    /// Labels of the blocks being visited, outermost first
    path: Vec<String>,
    containers: Vec<Container>,
    data: Map<String, Value>,
    fetched: HashMap<BlockKey, Value>,
    evaluated: HashSet<BlockKey>,
    root: Option<Arc<BlockDefinition>>,
    /// Child indices from the root down to the block being visited
    walk: Vec<Step>,
    /// Output of blocks evaluated ahead of their position through `depends_on`,
    /// by position; attached when the walk reaches them
    pulled: HashMap<Vec<usize>, Vec<RenderedNode>>,
    generation: u64,
    env: Value,
    output: Option<RenderedNode>,
}

impl<'e> Run<'e> {
    pub(crate) fn new(engine: &'e Engine, mode: Mode) -> Self {
        Self {
            engine,
            mode,
            stack: ResolutionStack::new(),
            diagnostics: Diagnostics::new(),
            path: Vec::new(),
            containers: Vec::new(),
            data: Map::new(),
            fetched: HashMap::new(),
            evaluated: HashSet::new(),
            root: None,
            walk: Vec::new(),
            pulled: HashMap::new(),
            generation: 0,
            env: Value::Object(env_snapshot(&engine.env_prefix)),
            output: None,
        }
    }

    /// Evaluate `root` and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] if the engine's token fires mid-run.
    pub(crate) fn evaluate(mut self, root: &Arc<BlockDefinition>) -> Result<RunResult, EngineError> {
        let gate = self.engine.tags.outer_gate();
        self.root = Some(Arc::clone(root));
        let mut siblings = Siblings::visiting(root);
        self.visit(root, &ScopeFrame::root(), gate, &mut siblings)?;
        Ok(RunResult {
            node: self.output,
            data: self.data,
            fetched: self.fetched,
            diagnostics: self.diagnostics,
        })
    }

    fn visit(
        &mut self,
        block: &Arc<BlockDefinition>,
        parent: &Arc<ScopeFrame>,
        gate: TagGate,
        siblings: &mut Siblings,
    ) -> Result<(), EngineError> {
        if self.engine.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match (block.kind, self.mode) {
            (BlockKind::Config, _) | (BlockKind::Content, Mode::DataOnly) => return Ok(()),
            _ => {}
        }

        self.path.push(block.label());
        let mark = self.stack.mark();
        let result = if self.path.len() > self.engine.limits.max_depth {
            self.report(
                Diagnostic::error("Maximum evaluation depth exceeded")
                    .with_detail(format!("nesting limit is {}", self.engine.limits.max_depth)),
                block,
            );
            Ok(())
        } else {
            self.visit_block(block, parent, gate, siblings)
        };
        self.stack.truncate(mark);
        self.path.pop();
        if let Some(key) = block.key() {
            self.evaluated.insert(key);
        }
        result
    }

    fn visit_block(
        &mut self,
        block: &Arc<BlockDefinition>,
        parent: &Arc<ScopeFrame>,
        gate: TagGate,
        siblings: &mut Siblings,
    ) -> Result<(), EngineError> {
        let engine = self.engine;
        let chain = if block.is_ref() {
            match engine.registry.resolve_chain(block, &mut self.stack) {
                Ok(chain) => chain,
                Err(err) => {
                    self.report_ref_error(&err, block);
                    return Ok(());
                }
            }
        } else {
            if let Some(key) = block.key()
                && let Err(err) = self.stack.enter(key)
            {
                self.report_ref_error(&err, block);
                return Ok(());
            }
            RefChain::single(block)
        };
        let def = chain.effective();

        // Warnings wait until the block is known to be included
        let mut warnings: Vec<_> = chain
            .conflicts
            .iter()
            .map(|key| {
                Diagnostic::warning("Conflicting block definitions")
                    .with_detail(format!("{key} is defined more than once; using the first definition"))
            })
            .collect();
        let decls = match chain_vars(&chain.blocks, &mut warnings) {
            Ok(decls) => decls,
            Err(diagnostic) => {
                for warning in warnings {
                    self.report(warning, block);
                }
                self.report(diagnostic, block);
                return Ok(());
            }
        };
        let frame = ScopeFrame::child(parent, decls);
        let evaluator = engine.evaluator.as_ref();

        let ctx = self.context(&frame, &def);
        match evaluate_inclusion(def.is_included.as_ref(), &ctx.env(evaluator), evaluator) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("{} excluded by is_included", def.label());
                return Ok(());
            }
            Err(e) => {
                self.report(expression_failed(&e), block);
                return Ok(());
            }
        }
        if def.kind == BlockKind::Content && !engine.tags.admits(gate, &def.meta) {
            tracing::debug!("{} filtered out by required tags", def.label());
            return Ok(());
        }
        for warning in warnings {
            self.report(warning, block);
        }
        match ctx.missing_required(&def.required_vars, evaluator) {
            Ok(missing) if missing.is_empty() => {}
            Ok(missing) => {
                self.report(
                    Diagnostic::error("Missing required variable").with_detail(missing.join(", ")),
                    block,
                );
                return Ok(());
            }
            Err(e) => {
                self.report(expression_failed(&e), block);
                return Ok(());
            }
        }

        let inner_gate = match def.kind {
            BlockKind::Document | BlockKind::Section => engine.tags.enter(gate, &def.meta),
            _ => gate,
        };
        for key in &def.depends_on {
            let dependant = Dependant {
                block,
                parent,
                frame: &frame,
                gate,
                inner_gate,
            };
            if !self.run_dependency(key, &dependant, siblings)? {
                return Ok(());
            }
        }

        tracing::trace!("evaluating {}", def.label());
        match def.kind {
            BlockKind::Data => {
                self.eval_data(&def, block, &frame);
                Ok(())
            }
            BlockKind::Content => {
                self.eval_content(&def, block, &frame);
                Ok(())
            }
            BlockKind::Document | BlockKind::Section => self.eval_container(&def, block, &frame, gate),
            BlockKind::Dynamic => self.eval_dynamic(&def, block, &frame, gate),
            BlockKind::Config => Ok(()),
        }
    }

    /// Make sure `key` has been evaluated before `dependant` runs.
    ///
    /// A later sibling is evaluated right away and its output lands before the
    /// dependant's. A block elsewhere in the document is evaluated in its own
    /// scope, and its output is attached once the walk reaches its position.
    /// Anything else is looked up in the registry and evaluated in the
    /// dependant's scope. Returns `false` when the dependant must be skipped.
    fn run_dependency(
        &mut self,
        key: &BlockKey,
        dependant: &Dependant<'_>,
        siblings: &mut Siblings,
    ) -> Result<bool, EngineError> {
        if let Err(err) = self.stack.check(key) {
            self.report_ref_error(&err, dependant.block);
            return Ok(false);
        }

        if let Some(index) = siblings.position(key) {
            if !siblings.done[index] && !self.pulled.contains_key(&self.position_of_sibling(index)) {
                siblings.done[index] = true;
                let target = Arc::clone(&siblings.blocks[index]);
                tracing::debug!("evaluating {key} early for {}", dependant.block.label());
                let previous = self.walk.last().map(|step| step.index);
                if let Some(step) = self.walk.last_mut() {
                    step.index = index;
                }
                let result = self.visit(&target, dependant.parent, dependant.gate, siblings);
                if let (Some(step), Some(previous)) = (self.walk.last_mut(), previous) {
                    step.index = previous;
                }
                result?;
            }
            return Ok(true);
        }
        if self.evaluated.contains(key) {
            return Ok(true);
        }
        if let Some(path) = self.locate(key)
            && let Some(placement) = self.placement(&path, dependant)
        {
            tracing::debug!("evaluating {key} ahead of its position for {}", dependant.block.label());
            self.run_in_place(path, placement)?;
            return Ok(true);
        }

        let engine = self.engine;
        let target = match engine.registry.lookup(key) {
            Ok(target) => Arc::clone(target),
            Err(err) => {
                self.report_ref_error(&err, dependant.block);
                return Ok(false);
            }
        };
        if engine.registry.is_conflicting(key) {
            self.report(
                Diagnostic::warning("Conflicting block definitions")
                    .with_detail(format!("{key} is defined more than once; using the first definition")),
                dependant.block,
            );
        }
        tracing::debug!("evaluating {key} from the registry for {}", dependant.block.label());
        self.visit(&target, dependant.parent, dependant.gate, &mut Siblings::visiting(&target))?;
        Ok(true)
    }

    /// Child indices from the root to the first block keyed `key`, not looking
    /// inside dynamic bodies.
    fn locate(&self, key: &BlockKey) -> Option<Vec<usize>> {
        let root = self.root.as_ref()?;
        if !matches!(root.kind, BlockKind::Document | BlockKind::Section) {
            return None;
        }
        let mut path = Vec::new();
        self.find_path(&self.children_of(root), key, &mut path).then_some(path)
    }

    fn find_path(&self, children: &[Arc<BlockDefinition>], key: &BlockKey, path: &mut Vec<usize>) -> bool {
        if path.len() >= self.engine.limits.max_depth {
            return false;
        }
        for (index, child) in children.iter().enumerate() {
            path.push(index);
            if child.key().as_ref() == Some(key) {
                return true;
            }
            if matches!(child.kind, BlockKind::Document | BlockKind::Section)
                && self.find_path(&self.children_of(child), key, path)
            {
                return true;
            }
            path.pop();
        }
        false
    }

    /// Children of `block` once its ref chain is applied.
    fn children_of(&self, block: &Arc<BlockDefinition>) -> Vec<Arc<BlockDefinition>> {
        if !block.is_ref() {
            return block.children.clone();
        }
        match self.engine.registry.resolve_chain(block, &mut ResolutionStack::new()) {
            Ok(chain) => chain.effective().children,
            Err(_) => Vec::new(),
        }
    }

    /// The walk, frames and output container the block at `path` would have
    /// when reached in document order.
    ///
    /// Frames shared with the current position are reused; the rest are built
    /// from the definitions along `path`. `None` when a definition on the way
    /// cannot be resolved.
    fn placement(&self, path: &[usize], dependant: &Dependant<'_>) -> Option<Placement> {
        let (last, ancestors) = path.split_last()?;
        let here: Vec<usize> = self.walk.iter().map(|step| step.index).collect();
        let shared = here.iter().zip(path).take_while(|(a, b)| a == b).count();
        if shared > ancestors.len() {
            return None;
        }

        let mut steps: Vec<Step> = self.walk[..shared].to_vec();
        let start = match self.walk.get(shared) {
            Some(step) => Step {
                index: path[shared],
                ..step.clone()
            },
            // `path` runs through the dependant itself
            None => Step {
                frame: Arc::clone(dependant.frame),
                gate: dependant.inner_gate,
                index: path[shared],
            },
        };
        steps.push(start);

        let root = self.containers.first()?;
        let (mut kind, mut meta) = (root.kind, root.meta.clone());
        let mut list = self.children_of(self.root.as_ref()?);
        for &index in &ancestors[..shared] {
            let next = self.children_of(list.get(index)?);
            list = next;
        }
        for (depth, &index) in ancestors.iter().enumerate().skip(shared) {
            let block = list.get(index)?;
            let chain = if block.is_ref() {
                self.engine.registry.resolve_chain(block, &mut ResolutionStack::new()).ok()?
            } else {
                RefChain::single(block)
            };
            let decls = chain_vars(&chain.blocks, &mut Vec::new()).ok()?;
            let def = chain.effective();
            let parent = steps.last()?;
            let next = Step {
                frame: ScopeFrame::child(&parent.frame, decls),
                gate: self.engine.tags.enter(parent.gate, &def.meta),
                index: path[depth + 1],
            };
            steps.push(next);
            (kind, meta) = (def.kind, def.meta.clone());
            list = def.children;
        }

        Some(Placement {
            target: Arc::clone(list.get(*last)?),
            container: Container {
                kind,
                node: RenderedNode::section(meta.clone(), None),
                meta,
                level: root.level + ancestors.len(),
                titles: 0,
            },
            steps,
        })
    }

    /// Evaluate the block at `path` out of order, keeping its output for later.
    fn run_in_place(&mut self, path: Vec<usize>, placement: Placement) -> Result<(), EngineError> {
        let Placement {
            target,
            container,
            steps,
        } = placement;
        let (frame, gate) = match steps.last() {
            Some(step) => (Arc::clone(&step.frame), step.gate),
            None => return Ok(()),
        };
        let walk = mem::replace(&mut self.walk, steps);
        self.containers.push(container);
        let result = self.visit(&target, &frame, gate, &mut Siblings::visiting(&target));
        let captured = self.containers.pop();
        self.walk = walk;
        result?;
        self.pulled.insert(path, captured.map(|container| container.node.children).unwrap_or_default());
        Ok(())
    }

    /// Walk position of entry `index` in the list currently being visited.
    fn position_of_sibling(&self, index: usize) -> Vec<usize> {
        let mut position: Vec<usize> = self.walk.iter().map(|step| step.index).collect();
        if let Some(last) = position.last_mut() {
            *last = index;
        }
        position
    }

    fn visit_children(
        &mut self,
        children: &[Arc<BlockDefinition>],
        frame: &Arc<ScopeFrame>,
        gate: TagGate,
    ) -> Result<(), EngineError> {
        let mut siblings = Siblings::new(children);
        for (index, child) in children.iter().enumerate() {
            if siblings.done[index] {
                continue;
            }
            siblings.done[index] = true;
            self.walk.push(Step {
                frame: Arc::clone(frame),
                gate,
                index,
            });
            let position: Vec<usize> = self.walk.iter().map(|step| step.index).collect();
            let result = match self.pulled.remove(&position) {
                Some(nodes) => {
                    tracing::debug!("{} already evaluated through depends_on", child.label());
                    for node in nodes {
                        self.attach(node);
                    }
                    Ok(())
                }
                None => self.visit(child, frame, gate, &mut siblings),
            };
            self.walk.pop();
            result?;
        }
        Ok(())
    }

    fn eval_container(
        &mut self,
        def: &BlockDefinition,
        block: &BlockDefinition,
        frame: &Arc<ScopeFrame>,
        parent_gate: TagGate,
    ) -> Result<(), EngineError> {
        let gate = self.engine.tags.enter(parent_gate, &def.meta);
        let level = self.containers.last().map_or(1, |parent| parent.level + 1);
        self.containers.push(Container {
            kind: def.kind,
            meta: def.meta.clone(),
            node: RenderedNode::section(def.meta.clone(), Some(def.label())),
            level,
            titles: 0,
        });
        if self.mode == Mode::Render
            && let Some(title) = &def.title
        {
            self.render_title(title, def, block, frame, level);
        }

        let result = self.visit_children(&def.children, frame, gate);
        let Some(container) = self.containers.pop() else {
            return result;
        };
        result?;

        let has_content = container.node.children.len() > container.titles;
        if def.kind == BlockKind::Section && !parent_gate.is_open() && !has_content {
            tracing::debug!("dropping {}: nothing passed the tag gate", def.label());
            return Ok(());
        }
        self.attach(container.node);
        Ok(())
    }

    fn render_title(
        &mut self,
        title: &str,
        def: &BlockDefinition,
        block: &BlockDefinition,
        frame: &Arc<ScopeFrame>,
        level: usize,
    ) {
        let engine = self.engine;
        let evaluator = engine.evaluator.as_ref();
        let usage = engine.templates.var_usage(&Value::String(title.to_string()));
        let rendered = self
            .context(frame, def)
            .template_context(&usage, evaluator)
            .map_err(|e| expression_failed(&e))
            .and_then(|context| {
                engine.templates.render(title, &context).map_err(|e| {
                    Diagnostic::error("Template rendering failed").with_detail(e.to_string())
                })
            });
        match rendered {
            Ok(text) => {
                if let Some(container) = self.containers.last_mut() {
                    container.node.children.push(RenderedNode::element(
                        heading(&text, level),
                        Meta::default(),
                        None,
                    ));
                    container.titles += 1;
                }
                self.generation += 1;
            }
            Err(diagnostic) => self.report(diagnostic, block),
        }
    }

    fn eval_dynamic(
        &mut self,
        def: &BlockDefinition,
        block: &BlockDefinition,
        frame: &Arc<ScopeFrame>,
        gate: TagGate,
    ) -> Result<(), EngineError> {
        let engine = self.engine;
        let ctx = self.context(frame, def);
        let mut warnings = Vec::new();
        let iterations = dynamic::expand(
            def,
            ctx.frame(),
            ctx.roots(),
            engine.evaluator.as_ref(),
            engine.limits.max_dynamic_items,
            &mut warnings,
        );
        for warning in warnings {
            self.report(warning, block);
        }
        match iterations {
            Ok(iterations) => {
                for iteration in iterations {
                    self.visit_children(&def.children, &iteration.frame, gate)?;
                }
            }
            Err(diagnostic) => self.report(diagnostic, block),
        }
        Ok(())
    }

    fn eval_content(&mut self, def: &BlockDefinition, block: &BlockDefinition, frame: &Arc<ScopeFrame>) {
        let engine = self.engine;
        let evaluator = engine.evaluator.as_ref();
        let Some(provider_type) = def.block_type.as_deref() else {
            return;
        };
        let Some(provider) = engine.providers.content(provider_type) else {
            self.report(
                Diagnostic::error("Missing content provider").with_detail(format!(
                    "no content provider named '{provider_type}' (available: {})",
                    engine.providers.content_names().join(", ")
                )),
                block,
            );
            return;
        };

        let ctx = self.context(frame, def);
        let Some(args) = self.eval_args(def, block, &ctx) else {
            return;
        };
        let Some(config) = self.resolve_config(def, block, &ctx) else {
            return;
        };
        self.check_config_keys(provider.config_keys(), &config, block);
        let usage = engine.templates.var_usage(&Value::Object(args.clone()));
        let context = match ctx.template_context(&usage, evaluator) {
            Ok(context) => context,
            Err(e) => {
                self.report(expression_failed(&e), block);
                return;
            }
        };

        let request = ContentRequest {
            args: &args,
            config: &config,
            context: &context,
            heading_level: self.containers.last().map_or(1, |container| container.level + 1),
            templates: &engine.templates,
        };
        match provider.render(&request) {
            Ok(markdown) => {
                self.attach(RenderedNode::element(markdown, def.meta.clone(), Some(def.label())));
            }
            Err(e) => {
                let summary = if e.downcast_ref::<TemplateError>().is_some() {
                    "Template rendering failed"
                } else {
                    "Content provider failed"
                };
                self.report(Diagnostic::error(summary).with_detail(format!("{e:#}")), block);
            }
        }
    }

    fn eval_data(&mut self, def: &BlockDefinition, block: &BlockDefinition, frame: &Arc<ScopeFrame>) {
        let engine = self.engine;
        let Some(source_type) = def.block_type.as_deref() else {
            return;
        };
        let Some(source) = engine.providers.data(source_type) else {
            self.report(
                Diagnostic::error("Missing data source").with_detail(format!(
                    "no data source named '{source_type}' (available: {})",
                    engine.providers.data_names().join(", ")
                )),
                block,
            );
            return;
        };

        let ctx = self.context(frame, def);
        let Some(args) = self.eval_args(def, block, &ctx) else {
            return;
        };
        let Some(config) = self.resolve_config(def, block, &ctx) else {
            return;
        };
        self.check_config_keys(source.config_keys(), &config, block);

        tracing::debug!("fetching {}", def.label());
        match source.fetch(&args, &config) {
            Ok(value) => self.store_data(def, block, value),
            Err(e) => {
                self.report(Diagnostic::error("Data source failed").with_detail(format!("{e:#}")), block);
            }
        }
    }

    fn store_data(&mut self, def: &BlockDefinition, block: &BlockDefinition, value: Value) {
        let (Some(source_type), Some(name)) = (&def.block_type, &def.name) else {
            return;
        };
        self.generation += 1;
        let by_type = self
            .data
            .entry(source_type.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let replaced = match by_type {
            Value::Object(by_name) => by_name.insert(name.clone(), value.clone()).is_some(),
            _ => false,
        };
        if replaced {
            self.report(
                Diagnostic::warning("Conflicting block definitions")
                    .with_detail(format!("data.{source_type}.{name} was produced more than once; the latest result wins")),
                block,
            );
        }
        if let Some(key) = block.key() {
            self.fetched.insert(key, value.clone());
        }
        if let Some(key) = def.key() {
            self.fetched.insert(key, value);
        }
    }

    fn eval_args(
        &mut self,
        def: &BlockDefinition,
        block: &BlockDefinition,
        ctx: &EvaluationContext,
    ) -> Option<Map<String, Value>> {
        let evaluator = self.engine.evaluator.as_ref();
        let mut args = Map::with_capacity(def.args.len());
        for (name, expr) in &def.args {
            match ctx.eval(expr, evaluator) {
                Ok(value) => {
                    args.insert(name.clone(), value);
                }
                Err(e) => {
                    self.report(expression_failed(&e).with_detail(format!("argument '{name}': {e}")), block);
                    return None;
                }
            }
        }
        Some(args)
    }

    /// The provider configuration of `def`, empty when it has none.
    fn resolve_config(
        &mut self,
        def: &BlockDefinition,
        block: &BlockDefinition,
        ctx: &EvaluationContext,
    ) -> Option<Map<String, Value>> {
        let engine = self.engine;
        let values = match &def.config {
            None => return Some(Map::new()),
            Some(ConfigSource::Inline(values)) => values.clone(),
            Some(ConfigSource::Ref(key)) => {
                let config_block = match engine.registry.lookup(key) {
                    Ok(config_block) => Arc::clone(config_block),
                    Err(err) => {
                        self.report_ref_error(&err, block);
                        return None;
                    }
                };
                let expected = format!("{}.{}", def.kind, def.block_type.as_deref().unwrap_or_default());
                if config_block.block_type.as_deref() != Some(expected.as_str()) {
                    self.report(
                        Diagnostic::error("Invalid config reference")
                            .with_detail(format!("{key} configures {}, not {expected}", config_block.block_type.as_deref().unwrap_or("nothing"))),
                        block,
                    );
                    return None;
                }
                config_block.args.clone()
            }
        };
        match ctx.eval(&Value::Object(values), engine.evaluator.as_ref()) {
            Ok(Value::Object(config)) => Some(config),
            Ok(_) => Some(Map::new()),
            Err(e) => {
                self.report(expression_failed(&e), block);
                None
            }
        }
    }

    fn check_config_keys(
        &mut self,
        accepted: Option<&[&str]>,
        config: &Map<String, Value>,
        block: &BlockDefinition,
    ) {
        for key in unknown_config_keys(accepted, config) {
            self.report(
                Diagnostic::warning("Unknown config key").with_detail(format!("'{key}' is ignored")),
                block,
            );
        }
    }

    /// Context roots for a block about to be evaluated in `frame`.
    fn context(&self, frame: &Arc<ScopeFrame>, def: &BlockDefinition) -> EvaluationContext {
        let data = Value::Object(self.data.clone());
        let mut document = Map::new();
        match self.containers.first() {
            Some(root) => {
                document.insert("meta".to_string(), root.meta.to_value());
                document.insert("content".to_string(), root.node.to_context_value());
            }
            None if def.kind == BlockKind::Document => {
                document.insert("meta".to_string(), def.meta.to_value());
            }
            None => {}
        }
        document.insert("data".to_string(), data.clone());

        let mut roots = Map::new();
        roots.insert("document".to_string(), Value::Object(document));
        if let Some(section) = self.containers.iter().rev().find(|c| c.kind == BlockKind::Section) {
            let mut current = Map::new();
            current.insert("meta".to_string(), section.meta.to_value());
            current.insert("content".to_string(), section.node.to_context_value());
            roots.insert("section".to_string(), Value::Object(current));
        }
        if def.kind == BlockKind::Content {
            let mut content = Map::new();
            content.insert("meta".to_string(), def.meta.to_value());
            roots.insert("content".to_string(), Value::Object(content));
        }
        roots.insert("data".to_string(), data);
        roots.insert("env".to_string(), self.env.clone());
        EvaluationContext::new(Arc::clone(frame), Roots::new(roots, self.generation))
    }

    fn attach(&mut self, node: RenderedNode) {
        self.generation += 1;
        match self.containers.last_mut() {
            Some(container) => container.node.children.push(node),
            None => self.output = Some(node),
        }
    }

    fn report(&mut self, diagnostic: Diagnostic, block: &BlockDefinition) {
        let diagnostic = diagnostic.at_block(self.path.join(" > ")).in_file(block.origin());
        if diagnostic.is_error() {
            tracing::debug!("{diagnostic}");
        }
        self.diagnostics.push(diagnostic);
    }

    fn report_ref_error(&mut self, err: &RefError, block: &BlockDefinition) {
        self.report(Diagnostic::error(err.summary()).with_detail(err.to_string()), block);
    }
}

fn expression_failed(error: &QueryError) -> Diagnostic {
    Diagnostic::error("Expression evaluation failed").with_detail(error.to_string())
}
