//! The indexed gate node and its rewriting operations.

use crate::*;

use std::collections::BTreeSet;

/// The Boolean connective carried by a gate.
///
/// User-facing trees can use the full vocabulary. Normalization reduces it
/// to [And](GateKind::And) and [Or](GateKind::Or), with
/// [Not](GateKind::Not) and [Null](GateKind::Null) surviving transiently
/// until complement propagation and null-gate removal finish.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GateKind {
    /// True iff all children are true
    And,
    /// True iff at least one child is true
    Or,
    /// True iff exactly one of the two children is true
    Xor,
    /// True iff at least `vote_number` children are true
    AtLeast,
    /// Negation of the single child
    Not,
    /// Pass-through of the single child
    Null,
    /// Negated AND
    Nand,
    /// Negated OR
    Nor,
}

impl GateKind {
    /// The dual connective under De Morgan, for AND and OR.
    pub(crate) fn dual(self) -> GateKind {
        match self {
            GateKind::And => GateKind::Or,
            GateKind::Or => GateKind::And,
            _ => self,
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            GateKind::And => "and",
            GateKind::Or => "or",
            GateKind::Xor => "xor",
            GateKind::AtLeast => "atleast",
            GateKind::Not => "not",
            GateKind::Null => "null",
            GateKind::Nand => "nand",
            GateKind::Nor => "nor",
        };
        write!(f, "{}", name)
    }
}

/// Constant-collapse state of a gate.
///
/// A non-[Normal](GateState::Normal) gate has lost its children and behaves
/// as a constant from the point of view of its parents.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GateState {
    /// The gate still computes its connective
    Normal,
    /// The gate collapsed to constant false
    Null,
    /// The gate collapsed to constant true
    Unity,
}

/// A gate of the indexed fault tree.
///
/// Children are signed indices: the magnitude selects a primary event or
/// another gate, the sign carries the complement on the edge. The child set
/// is ordered by the natural order on signed integers, which makes every
/// traversal of the tree deterministic. A gate never holds both `i` and
/// `-i`: the edit operations collapse the gate to a constant instead.
#[derive(Clone, Debug)]
pub struct Gate {
    index: i32,
    kind: GateKind,
    vote_number: u32,
    children: BTreeSet<i32>,
    parents: BTreeSet<i32>,
    state: GateState,
    module: bool,
    /// Enter, exit and last-revisit timestamps of the DFS protocol
    visits: [i32; 3],
}

impl Gate {
    /// Create a gate with no children.
    pub fn new(index: i32, kind: GateKind) -> Self {
        debug_assert!(index > 0);
        Self {
            index,
            kind,
            vote_number: 0,
            children: BTreeSet::new(),
            parents: BTreeSet::new(),
            state: GateState::Normal,
            module: false,
            visits: [0; 3],
        }
    }

    /// The unique, immutable index of this gate.
    pub fn index(&self) -> i32 {
        self.index
    }

    /// The current connective of this gate.
    pub fn kind(&self) -> GateKind {
        self.kind
    }

    /// Rewrite the connective of this gate.
    pub fn set_kind(&mut self, kind: GateKind) {
        self.kind = kind;
    }

    /// The vote number, meaningful only for [GateKind::AtLeast].
    pub fn vote_number(&self) -> u32 {
        self.vote_number
    }

    /// Set the vote number.
    pub fn set_vote_number(&mut self, vote: u32) {
        self.vote_number = vote;
    }

    /// The ordered set of signed child indices.
    pub fn children(&self) -> &BTreeSet<i32> {
        &self.children
    }

    /// The set of gates referencing this gate.
    pub fn parents(&self) -> &BTreeSet<i32> {
        &self.parents
    }

    pub(crate) fn add_parent(&mut self, parent: i32) {
        debug_assert!(parent > 0);
        self.parents.insert(parent);
    }

    /// The constant-collapse state of this gate.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Collapse this gate to constant false, dropping its children.
    pub fn nullify(&mut self) {
        self.state = GateState::Null;
        self.children.clear();
    }

    /// Collapse this gate to constant true, dropping its children.
    pub fn make_unity(&mut self) {
        self.state = GateState::Unity;
        self.children.clear();
    }

    /// Flag this gate as an independent module.
    pub fn mark_module(&mut self) {
        self.module = true;
    }

    /// Test the module flag.
    pub fn is_module(&self) -> bool {
        self.module
    }

    /// Construction-time child insertion.
    ///
    /// Unlike [add_child](Self::add_child), duplicates are reported as
    /// errors: a definition listing the same argument twice is malformed.
    pub fn insert_child(&mut self, child: i32) -> Result<(), FtkitError> {
        debug_assert!(child != 0);
        if self.children.contains(&child) || self.children.contains(&(-child)) {
            return Err(FtkitError::DuplicateChild {
                gate: self.index,
                child,
            });
        }
        self.children.insert(child);
        Ok(())
    }

    /// Rewriting-time child insertion with set semantics.
    ///
    /// Inserting an already-present child is a no-op. Inserting the
    /// complement of a present child collapses the gate to the constant
    /// dictated by its connective and returns `false`.
    pub fn add_child(&mut self, child: i32) -> bool {
        debug_assert!(child != 0);
        debug_assert!(self.state == GateState::Normal);
        if self.children.contains(&child) {
            return true;
        }
        if self.children.contains(&(-child)) {
            match self.kind {
                GateKind::And | GateKind::Nor => self.nullify(),
                GateKind::Or | GateKind::Xor | GateKind::Nand => self.make_unity(),
                GateKind::AtLeast | GateKind::Not | GateKind::Null => {
                    unreachable!("complement pair under a {} gate", self.kind)
                }
            }
            return false;
        }
        self.children.insert(child);
        true
    }

    /// Remove a child edge. The child must be present.
    pub fn erase_child(&mut self, child: i32) {
        let removed = self.children.remove(&child);
        debug_assert!(removed);
    }

    /// Remove every child edge.
    pub fn erase_all_children(&mut self) {
        self.children.clear();
    }

    /// Replace the edge `old` with `new`.
    ///
    /// Returns `false` if the insertion of `new` collapsed the gate.
    /// The edge `old` must be present.
    pub fn swap_child(&mut self, old: i32, new: i32) -> bool {
        self.erase_child(old);
        self.add_child(new)
    }

    /// Negate the sign of every child edge.
    pub fn invert_children(&mut self) {
        let inverted = self.children.iter().map(|c| -c).collect();
        self.children = inverted;
    }

    /// Absorb the children of a same-kind child gate, erasing the
    /// connecting edge.
    ///
    /// Returns `false` if one of the absorbed edges collapsed this gate.
    pub fn join_child_gate<I>(&mut self, child_index: i32, grandchildren: I) -> bool
    where
        I: IntoIterator<Item = i32>,
    {
        debug_assert!(child_index > 0);
        self.erase_child(child_index);
        for grandchild in grandchildren {
            if !self.add_child(grandchild) {
                return false;
            }
        }
        true
    }

    /// Record a DFS visit.
    ///
    /// The first call stores the enter time, the second the exit time.
    /// Any further call stores the last-revisit time and returns `true`.
    pub fn visit(&mut self, time: i32) -> bool {
        debug_assert!(time > 0);
        if self.visits[0] == 0 {
            self.visits[0] = time;
        } else if self.visits[1] == 0 {
            self.visits[1] = time;
        } else {
            self.visits[2] = time;
            return true;
        }
        false
    }

    /// Test if this gate was entered by the ongoing DFS.
    pub fn visited(&self) -> bool {
        self.visits[0] != 0
    }

    /// Test if this gate was reached again after being fully explored.
    pub fn revisited(&self) -> bool {
        self.visits[2] != 0
    }

    pub(crate) fn enter_time(&self) -> i32 {
        self.visits[0]
    }

    pub(crate) fn exit_time(&self) -> i32 {
        self.visits[1]
    }

    pub(crate) fn last_visit(&self) -> i32 {
        self.visits[2]
    }

    /// Reset the visit timestamps.
    pub fn clear_visits(&mut self) {
        self.visits = [0; 3];
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn child_edits() -> Result<(), FtkitError> {
        let mut gate = Gate::new(5, GateKind::Or);
        gate.insert_child(1)?;
        gate.insert_child(-2)?;
        assert!(gate.insert_child(1).is_err());
        assert!(gate.insert_child(2).is_err());

        assert!(gate.add_child(3));
        assert!(gate.add_child(3));
        assert_eq!(gate.children().len(), 3);

        assert!(gate.swap_child(3, 4));
        assert!(gate.children().contains(&4));
        assert!(!gate.children().contains(&3));

        gate.invert_children();
        assert!(gate.children().contains(&-1));
        assert!(gate.children().contains(&2));
        assert!(gate.children().contains(&-4));

        Ok(())
    }

    #[test]
    fn complement_collapse() {
        let mut or_gate = Gate::new(5, GateKind::Or);
        assert!(or_gate.add_child(1));
        assert!(!or_gate.add_child(-1));
        assert_eq!(or_gate.state(), GateState::Unity);
        assert!(or_gate.children().is_empty());

        let mut and_gate = Gate::new(6, GateKind::And);
        assert!(and_gate.add_child(2));
        assert!(!and_gate.add_child(-2));
        assert_eq!(and_gate.state(), GateState::Null);
    }

    #[test]
    fn join_absorbs_grandchildren() {
        let mut parent = Gate::new(7, GateKind::And);
        assert!(parent.add_child(1));
        assert!(parent.add_child(8));

        assert!(parent.join_child_gate(8, [2, 3]));
        assert_eq!(parent.children().len(), 3);
        assert!(!parent.children().contains(&8));

        // Absorbing a complement collapses the parent.
        assert!(parent.add_child(9));
        assert!(!parent.join_child_gate(9, [-1]));
        assert_eq!(parent.state(), GateState::Null);
    }

    #[test]
    fn visit_protocol() {
        let mut gate = Gate::new(5, GateKind::And);
        assert!(!gate.visited());
        assert!(!gate.visit(3));
        assert!(gate.visited());
        assert!(!gate.visit(8));
        assert!(!gate.revisited());
        assert!(gate.visit(9));
        assert!(gate.revisited());
        assert_eq!(gate.enter_time(), 3);
        assert_eq!(gate.exit_time(), 8);
        assert_eq!(gate.last_visit(), 9);

        gate.clear_visits();
        assert!(!gate.visited());
    }
}
