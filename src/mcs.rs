//! Minimal-cut-set enumeration over the preprocessed tree.

use crate::simple::{project, SimpleGate, SimpleKind};
use crate::*;

use delegate::delegate;
use log::debug;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A minimal conjunction of signed basic events tripping the top event.
///
/// Negative indices are complemented events (they only appear for
/// non-coherent trees). During expansion a cut set also carries module
/// references; those are fully resolved before a set is emitted.
#[derive(Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CutSet {
    basics: BTreeSet<i32>,
    modules: BTreeSet<i32>,
}

impl CutSet {
    fn from_literal(literal: i32) -> Self {
        let mut set = CutSet::default();
        set.basics.insert(literal);
        set
    }

    fn from_module(module: i32) -> Self {
        let mut set = CutSet::default();
        set.modules.insert(module);
        set
    }

    /// Size of the set, counting unresolved module references.
    pub fn order(&self) -> usize {
        self.basics.len() + self.modules.len()
    }

    /// Iterate over the signed basic events in ascending order.
    pub fn basic_events(&self) -> impl Iterator<Item = i32> + '_ {
        self.basics.iter().copied()
    }

    delegate! {
        to self.basics {
            /// Number of basic events in the set
            pub fn len(&self) -> usize;

            /// True for the empty cut set
            pub fn is_empty(&self) -> bool;

            /// Test if a signed basic event belongs to the set
            pub fn contains(&self, literal: &i32) -> bool;
        }
    }

    /// Conjunction of two cut sets.
    ///
    /// Returns None when the union would carry an event together with its
    /// complement: such a candidate is impossible and must be discarded.
    fn join(&self, other: &CutSet) -> Option<CutSet> {
        if other.basics.iter().any(|b| self.basics.contains(&-b)) {
            return None;
        }
        let mut joined = self.clone();
        joined.basics.extend(other.basics.iter().copied());
        joined.modules.extend(other.modules.iter().copied());
        Some(joined)
    }

    /// Component-wise subset test, the minimization order.
    pub fn is_subset(&self, other: &CutSet) -> bool {
        self.basics.is_subset(&other.basics) && self.modules.is_subset(&other.modules)
    }
}

impl FaultTree {
    /// Enumerate the minimal cut sets of the preprocessed tree.
    ///
    /// `order_limit` bounds the size of the returned sets. The tree must
    /// have been [preprocessed](Self::preprocess) first; leftovers of the
    /// richer gate vocabulary are reported as
    /// [InternalInvariant](FtkitError::InternalInvariant).
    ///
    /// A top gate collapsed to constant false yields an empty sequence; a
    /// top collapsed to constant true yields a single empty cut set.
    pub fn enumerate_mcs(&self, order_limit: usize) -> Result<Vec<CutSet>, FtkitError> {
        self.enumerate_mcs_with(order_limit, None)
    }

    /// Enumerate the minimal cut sets, polling `cancel` between module
    /// expansions.
    pub fn enumerate_mcs_with(
        &self,
        order_limit: usize,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<Vec<CutSet>, FtkitError> {
        let top = self
            .get(self.top_index)
            .ok_or(FtkitError::InternalInvariant("dangling top index"))?;
        match top.state() {
            GateState::Null => return Ok(Vec::new()),
            GateState::Unity => return Ok(vec![CutSet::default()]),
            GateState::Normal => {}
        }
        if top.children().len() == 1 {
            // The whole tree reduced to a single literal.
            let literal = *top.children().iter().next().unwrap();
            if self.is_gate(literal) {
                return Err(FtkitError::InternalInvariant(
                    "unresolved pass-through top",
                ));
            }
            return Ok(vec![CutSet::from_literal(literal)]);
        }

        debug!("enumerating cut sets up to order {}", order_limit);
        let mut enumerator = Enumerator {
            tree: self,
            limit: order_limit,
            projections: HashMap::new(),
            cache: HashMap::new(),
            cancel,
        };
        let cut_sets = enumerator.module_cut_sets(self.top_index)?;
        Ok(cut_sets.as_ref().clone())
    }
}

/// Per-analysis scratch state: the projection memo and the per-module
/// result cache. Complemented modules cache under their negated index.
struct Enumerator<'a> {
    tree: &'a FaultTree,
    limit: usize,
    projections: HashMap<i32, Arc<SimpleGate>>,
    cache: HashMap<i32, Arc<Vec<CutSet>>>,
    cancel: Option<&'a dyn Fn() -> bool>,
}

impl Enumerator<'_> {
    /// Minimal cut sets of one module, fully resolved and memoized.
    fn module_cut_sets(&mut self, module: i32) -> Result<Arc<Vec<CutSet>>, FtkitError> {
        if let Some(cached) = self.cache.get(&module) {
            return Ok(cached.clone());
        }
        if let Some(cancelled) = self.cancel {
            if cancelled() {
                return Err(FtkitError::Cancelled);
            }
        }

        let projection = project(self.tree, module.abs(), &mut self.projections)?;
        let gate = if module < 0 {
            Arc::new(projection.complement())
        } else {
            projection
        };
        let candidates = self.expand(&gate);
        let resolved = self.resolve_modules(candidates)?;
        let minimal = Arc::new(minimize(resolved));
        debug!(
            "module {} expanded into {} minimal cut sets",
            module,
            minimal.len()
        );
        self.cache.insert(module, minimal.clone());
        Ok(minimal)
    }

    /// Recursive candidate expansion.
    ///
    /// An OR layer emits one candidate per alternative; an AND layer takes
    /// the distributive product of its sub-gate alternatives over its own
    /// leaves, pruning candidates beyond the order limit.
    fn expand(&self, gate: &SimpleGate) -> Vec<CutSet> {
        match gate.kind {
            SimpleKind::Or => {
                let mut candidates = Vec::new();
                for &basic in &gate.basics {
                    candidates.push(CutSet::from_literal(basic));
                }
                for &module in &gate.modules {
                    candidates.push(CutSet::from_module(module));
                }
                for child in &gate.gates {
                    candidates.extend(self.expand(child));
                }
                candidates
            }
            SimpleKind::And => {
                let base = CutSet {
                    basics: gate.basics.clone(),
                    modules: gate.modules.clone(),
                };
                if base.order() > self.limit {
                    return Vec::new();
                }
                let mut candidates = vec![base];
                for child in &gate.gates {
                    let alternatives = self.expand(child);
                    let mut next = Vec::new();
                    for candidate in &candidates {
                        for alternative in &alternatives {
                            if let Some(joined) = candidate.join(alternative) {
                                if joined.order() <= self.limit {
                                    next.push(joined);
                                }
                            }
                        }
                    }
                    candidates = next;
                    if candidates.is_empty() {
                        break;
                    }
                }
                candidates
            }
        }
    }

    /// Splice the cached cut sets of every referenced module into the
    /// candidates by Cartesian product, still pruning at the order limit.
    /// A module with no cut sets annihilates its candidates.
    fn resolve_modules(&mut self, candidates: Vec<CutSet>) -> Result<Vec<CutSet>, FtkitError> {
        let mut resolved = Vec::new();
        for candidate in candidates {
            let mut partial = vec![CutSet {
                basics: candidate.basics,
                modules: BTreeSet::new(),
            }];
            for &module in &candidate.modules {
                let expansions = self.module_cut_sets(module)?;
                let mut next = Vec::new();
                for p in &partial {
                    for expansion in expansions.iter() {
                        if let Some(joined) = p.join(expansion) {
                            if joined.order() <= self.limit {
                                next.push(joined);
                            }
                        }
                    }
                }
                partial = next;
                if partial.is_empty() {
                    break;
                }
            }
            resolved.extend(partial);
        }
        Ok(resolved)
    }
}

/// Deduplicate and keep only the minimal candidates.
///
/// Candidates are processed in non-decreasing order so that minimality is
/// preserved inductively; singletons are minimal by construction. The
/// ordering also fixes the output: size-ascending, then lexicographic.
fn minimize(mut sets: Vec<CutSet>) -> Vec<CutSet> {
    sets.sort_by(|x, y| x.order().cmp(&y.order()).then_with(|| x.cmp(y)));
    sets.dedup();

    let singletons = sets.partition_point(|s| s.order() <= 1);
    let mut minimal: Vec<CutSet> = sets[..singletons].to_vec();
    for set in &sets[singletons..] {
        if minimal.iter().any(|kept| kept.is_subset(set)) {
            continue;
        }
        minimal.push(set.clone());
    }
    minimal
}
