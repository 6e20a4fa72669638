//! Reduced representation of preprocessed gates.

use crate::*;

use std::collections::BTreeSet;
use std::sync::Arc;

/// The only connectives left after preprocessing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SimpleKind {
    And,
    Or,
}

/// A gate projected out of the indexed tree for cut-set expansion.
///
/// Leaves are signed basic-event indices and signed module references;
/// interior children are shared projections of non-module sub-gates.
#[derive(Clone, Debug)]
pub(crate) struct SimpleGate {
    pub(crate) kind: SimpleKind,
    pub(crate) basics: BTreeSet<i32>,
    pub(crate) modules: BTreeSet<i32>,
    pub(crate) gates: Vec<Arc<SimpleGate>>,
}

impl SimpleGate {
    /// The De Morgan dual: kind flipped, every leaf sign negated.
    ///
    /// A complemented module is expanded from this structure, so the dual
    /// keeps module references as (negated) references instead of
    /// dissolving them.
    pub(crate) fn complement(&self) -> SimpleGate {
        SimpleGate {
            kind: match self.kind {
                SimpleKind::And => SimpleKind::Or,
                SimpleKind::Or => SimpleKind::And,
            },
            basics: self.basics.iter().map(|b| -b).collect(),
            modules: self.modules.iter().map(|m| -m).collect(),
            gates: self
                .gates
                .iter()
                .map(|g| Arc::new(g.complement()))
                .collect(),
        }
    }
}

/// Project a preprocessed gate, memoized by index so shared sub-gates are
/// built once.
///
/// The projection doubles as the validation of the preprocessor
/// post-condition: only positive AND/OR gates with at least two children
/// may remain.
pub(crate) fn project(
    tree: &FaultTree,
    index: i32,
    memo: &mut HashMap<i32, Arc<SimpleGate>>,
) -> Result<Arc<SimpleGate>, FtkitError> {
    if let Some(gate) = memo.get(&index) {
        return Ok(gate.clone());
    }
    let gate = tree
        .get(index)
        .ok_or(FtkitError::InternalInvariant("dangling gate index"))?;
    if gate.state() != GateState::Normal {
        return Err(FtkitError::InternalInvariant(
            "constant gate left after preprocessing",
        ));
    }
    let kind = match gate.kind() {
        GateKind::And => SimpleKind::And,
        GateKind::Or => SimpleKind::Or,
        _ => {
            return Err(FtkitError::InternalInvariant(
                "non AND/OR gate left after preprocessing",
            ))
        }
    };
    if gate.children().len() < 2 {
        return Err(FtkitError::InternalInvariant(
            "gate with fewer than two children after preprocessing",
        ));
    }

    let mut simple = SimpleGate {
        kind,
        basics: BTreeSet::new(),
        modules: BTreeSet::new(),
        gates: Vec::new(),
    };
    for &child in gate.children() {
        if !tree.is_gate(child) {
            simple.basics.insert(child);
            continue;
        }
        if child < 0 {
            return Err(FtkitError::InternalInvariant(
                "negated gate edge after preprocessing",
            ));
        }
        if tree.gate(child).is_module() {
            simple.modules.insert(child);
        } else {
            simple.gates.push(project(tree, child, memo)?);
        }
    }
    let simple = Arc::new(simple);
    memo.insert(index, simple.clone());
    Ok(simple)
}
