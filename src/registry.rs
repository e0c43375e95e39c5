//! Named block registry.
//!
//! The registry is built in a single pre-pass over every loaded file and indexes
//! each named block, at any nesting depth, by its [`BlockKey`]. It is read-only
//! afterwards and can be shared freely.
//!
//! `base` references are resolved against the registry lazily, while the evaluator
//! walks a document. Cycle detection uses a [`ResolutionStack`] owned by that walk,
//! so a cycle between blocks that no document ever dereferences is never reported.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use strsim::levenshtein;

use crate::blocks::{BlockDefinition, BlockKey};

/// Maximum Levenshtein distance, as a percentage of the target length, for
/// "did you mean" suggestions.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Keys currently being resolved or evaluated along one traversal path.
#[derive(Debug, Default, Clone)]
pub struct ResolutionStack(Vec<BlockKey>);

impl ResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.0.contains(key)
    }

    pub fn push(&mut self, key: BlockKey) {
        self.0.push(key);
    }

    /// Current depth, used as a restore mark for [`truncate`](Self::truncate).
    pub fn mark(&self) -> usize {
        self.0.len()
    }

    pub fn truncate(&mut self, mark: usize) {
        self.0.truncate(mark);
    }

    /// Fails when `key` is already being resolved.
    pub fn check(&self, key: &BlockKey) -> Result<(), RefError> {
        if self.contains(key) {
            return Err(RefError::Circular {
                cycle: self.cycle_through(key),
            });
        }
        Ok(())
    }

    /// Push `key`, failing when it is already being resolved.
    pub fn enter(&mut self, key: BlockKey) -> Result<(), RefError> {
        self.check(&key)?;
        self.0.push(key);
        Ok(())
    }

    /// The cycle that `key` would close, starting at its first occurrence.
    fn cycle_through(&self, key: &BlockKey) -> Vec<BlockKey> {
        let start = self.0.iter().position(|k| k == key).unwrap_or(0);
        let mut cycle = self.0[start..].to_vec();
        cycle.push(key.clone());
        cycle
    }
}

/// Why a `base` chain could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefError {
    NotFound {
        key: BlockKey,
        suggestions: Vec<String>,
    },
    Circular {
        cycle: Vec<BlockKey>,
    },
}

impl RefError {
    /// Diagnostic summary for this failure.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::NotFound {
                ..
            } => "Block not found",
            Self::Circular {
                ..
            } => "Circular reference detected",
        }
    }
}

impl fmt::Display for RefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound {
                key,
                suggestions,
            } => {
                write!(f, "{key}")?;
                if !suggestions.is_empty() {
                    write!(f, " (did you mean {}?)", suggestions.join(", "))?;
                }
                Ok(())
            }
            Self::Circular {
                cycle,
            } => {
                let chain = cycle.iter().map(ToString::to_string).collect::<Vec<_>>();
                write!(f, "{}", chain.join(" → "))
            }
        }
    }
}

/// A resolved `base` chain: the use-site block first, the concrete block last.
#[derive(Debug, Clone)]
pub struct RefChain {
    pub blocks: Vec<Arc<BlockDefinition>>,
    /// Keys along the chain that have more than one definition
    pub conflicts: Vec<BlockKey>,
}

impl RefChain {
    /// The chain of a block that is not a ref.
    pub fn single(block: &Arc<BlockDefinition>) -> Self {
        Self {
            blocks: vec![Arc::clone(block)],
            conflicts: Vec::new(),
        }
    }

    /// The non-ref block at the end of the chain.
    pub fn concrete(&self) -> &Arc<BlockDefinition> {
        self.blocks.last().expect("a ref chain always contains its use-site block")
    }

    /// The concrete block with every override along the chain applied, use-site last.
    ///
    /// Scalars (title, is_included, config, name) are replaced when an override sets
    /// them, meta and args are layered key by key, depends_on and required_vars are
    /// unioned, and non-empty override children replace the base's. Variables are
    /// not merged here; see [`crate::scope::chain_vars`].
    pub fn effective(&self) -> BlockDefinition {
        let mut layers = self.blocks.iter().rev();
        let mut def = match layers.next() {
            Some(concrete) => (**concrete).clone(),
            None => return BlockDefinition::new(crate::blocks::BlockKind::Content),
        };
        for layer in layers {
            if layer.name.is_some() {
                def.name.clone_from(&layer.name);
            }
            if layer.title.is_some() {
                def.title.clone_from(&layer.title);
            }
            if layer.is_included.is_some() {
                def.is_included.clone_from(&layer.is_included);
            }
            if layer.config.is_some() {
                def.config.clone_from(&layer.config);
            }
            if !layer.children.is_empty() {
                def.children.clone_from(&layer.children);
            }
            if layer.origin.is_some() {
                def.origin.clone_from(&layer.origin);
            }
            def.meta = def.meta.overridden_by(&layer.meta);
            for (key, value) in &layer.args {
                def.args.insert(key.clone(), value.clone());
            }
            for key in &layer.depends_on {
                if !def.depends_on.contains(key) {
                    def.depends_on.push(key.clone());
                }
            }
            for name in &layer.required_vars {
                if !def.required_vars.contains(name) {
                    def.required_vars.push(name.clone());
                }
            }
        }
        def
    }
}

/// Read-only index of every named block across all loaded files.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    blocks: HashMap<BlockKey, Arc<BlockDefinition>>,
    conflicts: HashMap<BlockKey, Vec<Arc<BlockDefinition>>>,
}

impl BlockRegistry {
    /// Index every named block reachable from `roots`.
    ///
    /// The first definition of a key wins; later ones are kept as conflicts and
    /// reported when the key is actually looked up.
    pub fn build<'a>(roots: impl IntoIterator<Item = &'a Arc<BlockDefinition>>) -> Self {
        let mut registry = Self::default();
        for root in roots {
            for block in root.walk() {
                let Some(key) = block.key() else {
                    continue;
                };
                match registry.blocks.get(&key) {
                    Some(existing) => {
                        tracing::debug!("duplicate definition for {key}");
                        registry
                            .conflicts
                            .entry(key)
                            .or_insert_with(|| vec![Arc::clone(existing)])
                            .push(block);
                    }
                    None => {
                        registry.blocks.insert(key, block);
                    }
                }
            }
        }
        tracing::debug!(
            "registry built: {} blocks, {} conflicting keys",
            registry.blocks.len(),
            registry.conflicts.len()
        );
        registry
    }

    pub fn get(&self, key: &BlockKey) -> Option<&Arc<BlockDefinition>> {
        self.blocks.get(key)
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.blocks.contains_key(key)
    }

    pub fn is_conflicting(&self, key: &BlockKey) -> bool {
        self.conflicts.contains_key(key)
    }

    /// Every conflicting key with all of its definitions, sorted by key.
    pub fn conflicts(&self) -> Vec<(&BlockKey, &[Arc<BlockDefinition>])> {
        let mut out: Vec<_> = self.conflicts.iter().map(|(k, v)| (k, v.as_slice())).collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    /// Every registered key, sorted.
    pub fn keys(&self) -> Vec<&BlockKey> {
        let mut keys: Vec<_> = self.blocks.keys().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Up to three registered keys close to `target`.
    pub fn suggest(&self, target: &str) -> Vec<String> {
        let mut scored: Vec<(String, usize)> = self
            .blocks
            .keys()
            .map(ToString::to_string)
            .map(|key| {
                let distance = levenshtein(target, &key);
                (key, distance)
            })
            .collect();
        scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        scored
            .into_iter()
            .filter(|(_, dist)| *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .take(3)
            .map(|(key, _)| key)
            .collect()
    }

    /// Look up `key`, failing with suggestions when it is unknown.
    pub fn lookup(&self, key: &BlockKey) -> Result<&Arc<BlockDefinition>, RefError> {
        self.get(key).ok_or_else(|| RefError::NotFound {
            key: key.clone(),
            suggestions: self.suggest(&key.to_string()),
        })
    }

    /// Follow `block`'s `base` chain down to a concrete block.
    ///
    /// Every key visited is pushed onto `stack` and left there on success: the
    /// caller keeps them while evaluating the resolved block and truncates back to
    /// its own mark afterwards, so structural cycles through nested refs are caught
    /// too. On failure the stack is restored before returning.
    pub fn resolve_chain(
        &self,
        block: &Arc<BlockDefinition>,
        stack: &mut ResolutionStack,
    ) -> Result<RefChain, RefError> {
        let mark = stack.mark();
        let result = self.walk_chain(block, stack);
        if result.is_err() {
            stack.truncate(mark);
        }
        result
    }

    fn walk_chain(
        &self,
        block: &Arc<BlockDefinition>,
        stack: &mut ResolutionStack,
    ) -> Result<RefChain, RefError> {
        let mut chain = RefChain {
            blocks: vec![Arc::clone(block)],
            conflicts: Vec::new(),
        };
        if let Some(key) = block.key().filter(|_| block.is_ref()) {
            stack.enter(key)?;
        }

        let mut current = Arc::clone(block);
        while let Some(base_key) = current.base.clone() {
            stack.check(&base_key)?;
            let base = Arc::clone(self.lookup(&base_key)?);
            if self.is_conflicting(&base_key) {
                chain.conflicts.push(base_key.clone());
            }
            tracing::trace!("{} resolves through {base_key}", block.label());
            stack.enter(base_key)?;
            chain.blocks.push(Arc::clone(&base));
            current = base;
        }
        Ok(chain)
    }
}
