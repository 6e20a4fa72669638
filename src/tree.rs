//! The indexed fault tree: a gate container keyed by integer index.

use crate::*;

use bit_set::BitSet;
use delegate::delegate;
use std::collections::BTreeSet;
use std::iter::FromIterator;

/// A truth assignment of the basic events, as a set of active indices.
///
/// Events absent from the set are implicitly false. House events are not
/// consulted here: the tree reads their constant values directly.
///
/// ```
/// use ftkit::Assignment;
/// use std::iter::FromIterator;
///
/// let mut assignment = Assignment::from_iter([1, 3]);
/// assignment.activate(2);
/// assignment.deactivate(3);
///
/// assert!(assignment.is_active(1));
/// assert!(assignment.is_active(2));
/// assert!(!assignment.is_active(3));
/// ```
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Assignment {
    active: BitSet,
}

impl Assignment {
    /// Create an assignment with every event false.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given event true.
    pub fn activate(&mut self, index: i32) {
        debug_assert!(index > 0);
        self.active.insert(index as usize);
    }

    /// Make the given event false.
    pub fn deactivate(&mut self, index: i32) {
        debug_assert!(index > 0);
        self.active.remove(index as usize);
    }

    /// Test if the given event is true.
    pub fn is_active(&self, index: i32) -> bool {
        index > 0 && self.active.contains(index as usize)
    }

    delegate! {
        to self.active {
            /// Number of active events
            #[call(len)]
            pub fn len_active(&self) -> usize;

            /// Return whether every event is false
            pub fn is_empty(&self) -> bool;

            /// Make every event false
            pub fn clear(&mut self);
        }
    }
}

impl FromIterator<i32> for Assignment {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let mut assignment = Assignment::default();
        for index in iter {
            assignment.activate(index);
        }
        assignment
    }
}

/// The indexed fault tree.
///
/// Primary events occupy the index range `1..=num_events`; gates live above
/// it. The container owns every gate, hands out fresh indices for gates
/// created during rewriting (indices are never reused), and tracks the top
/// gate together with the sign accumulated on it by normalization.
///
/// Build one from a [FaultTreeDef], then run
/// [preprocess](Self::preprocess) and [enumerate_mcs](Self::enumerate_mcs).
#[derive(Debug)]
pub struct FaultTree {
    pub(crate) gates: HashMap<i32, Gate>,
    pub(crate) gate_names: HashMap<i32, String>,
    pub(crate) top_index: i32,
    pub(crate) top_sign: i32,
    pub(crate) gate_floor: i32,
    pub(crate) next_index: i32,
    pub(crate) true_house: BTreeSet<i32>,
    pub(crate) false_house: BTreeSet<i32>,
}

impl FaultTree {
    /// Index a symbolic fault tree.
    ///
    /// Named gates are indexed in definition order right above the event
    /// range; anonymous nested formulas receive fresh indices after them.
    /// The definition is validated on the way: unresolved references,
    /// arity problems, bad vote numbers and cycles are reported here.
    /// House-event constants are resolved from the declarations, then
    /// overridden by the option sets.
    pub fn build(def: &FaultTreeDef, options: &Options) -> Result<Self, FtkitError> {
        let top_name = def.top().ok_or_else(|| FtkitError::UndefinedElement {
            name: "top".to_string(),
            referenced_by: "the fault tree definition".to_string(),
        })?;

        let gate_floor = def.events().len() as i32 + 1;
        let mut gate_index: HashMap<&str, i32> = HashMap::new();
        let mut gate_names = HashMap::new();
        for (position, (name, _)) in def.gates().enumerate() {
            let index = gate_floor + position as i32;
            gate_index.insert(name, index);
            gate_names.insert(index, name.to_string());
        }

        let mut tree = FaultTree {
            gates: HashMap::new(),
            gate_names,
            top_index: gate_index[top_name],
            top_sign: 1,
            gate_floor,
            next_index: gate_floor + gate_index.len() as i32,
            true_house: BTreeSet::new(),
            false_house: BTreeSet::new(),
        };

        for (name, formula) in def.gates() {
            let index = gate_index[name];
            tree.index_formula(def, &gate_index, name, index, formula)?;
        }

        let top_index = tree.top_index;
        tree.collect_parents(top_index)?;
        tree.clear_visits();
        tree.resolve_house_events(def, options)?;
        Ok(tree)
    }

    fn index_formula(
        &mut self,
        def: &FaultTreeDef,
        gate_index: &HashMap<&str, i32>,
        name: &str,
        index: i32,
        formula: &Formula,
    ) -> Result<(), FtkitError> {
        validate_formula(name, formula)?;

        let mut gate = Gate::new(index, formula.kind());
        if let Some(vote) = formula.vote_number() {
            gate.set_vote_number(vote);
        }
        for (ref_name, complement) in formula.event_args() {
            let target = def
                .events()
                .index_of(ref_name)
                .or_else(|| gate_index.get(ref_name.as_str()).copied())
                .ok_or_else(|| FtkitError::UndefinedElement {
                    name: ref_name.clone(),
                    referenced_by: name.to_string(),
                })?;
            let signed = if *complement { -target } else { target };
            gate.insert_child(signed)
                .map_err(|_| FtkitError::InvalidGate {
                    gate: name.to_string(),
                    reason: format!("'{}' appears twice or with both signs", ref_name),
                })?;
        }
        for sub in formula.formula_args() {
            let sub_index = self.fresh_index();
            self.index_formula(def, gate_index, name, sub_index, sub)?;
            gate.insert_child(sub_index)
                .map_err(|_| FtkitError::InvalidGate {
                    gate: name.to_string(),
                    reason: "duplicate anonymous argument".to_string(),
                })?;
        }
        self.add_gate(gate);
        Ok(())
    }

    /// Record parent links with a single DFS, rejecting cycles.
    ///
    /// A forward edge into a gate that was entered but not yet exited is a
    /// back edge of the DFS, hence a cycle.
    fn collect_parents(&mut self, index: i32) -> Result<(), FtkitError> {
        self.gate_mut(index).visit(1);
        for child in self.children_of(index) {
            let target = child.abs();
            if !self.is_gate(target) {
                continue;
            }
            self.gate_mut(target).add_parent(index);
            let entered = self.gate(target).visited();
            let exited = self.gate(target).exit_time() != 0;
            if entered && !exited {
                return Err(FtkitError::CyclicGraph(self.gate_label(target)));
            }
            if !entered {
                self.collect_parents(target)?;
            }
        }
        self.gate_mut(index).visit(2);
        Ok(())
    }

    fn resolve_house_events(
        &mut self,
        def: &FaultTreeDef,
        options: &Options,
    ) -> Result<(), FtkitError> {
        for (index, _, role) in def.events().iter() {
            if let EventRole::House { value } = role {
                if value {
                    self.true_house.insert(index);
                } else {
                    self.false_house.insert(index);
                }
            }
        }
        for (name, value) in options
            .true_house_events
            .iter()
            .map(|n| (n, true))
            .chain(options.false_house_events.iter().map(|n| (n, false)))
        {
            let index = def
                .events()
                .index_of(name)
                .filter(|&i| matches!(def.events().role_of(i), Some(EventRole::House { .. })))
                .ok_or_else(|| FtkitError::UndefinedElement {
                    name: name.clone(),
                    referenced_by: "the house event overrides".to_string(),
                })?;
            self.true_house.remove(&index);
            self.false_house.remove(&index);
            if value {
                self.true_house.insert(index);
            } else {
                self.false_house.insert(index);
            }
        }
        Ok(())
    }

    /// The index of the top gate.
    pub fn top_index(&self) -> i32 {
        self.top_index
    }

    /// The sign accumulated on the top gate, `+1` or `-1`.
    pub fn top_sign(&self) -> i32 {
        self.top_sign
    }

    /// Number of primary events.
    pub fn num_events(&self) -> usize {
        (self.gate_floor - 1) as usize
    }

    /// Test if a signed index designates a gate (rather than an event).
    pub fn is_gate(&self, index: i32) -> bool {
        index.abs() >= self.gate_floor
    }

    /// Look up a gate.
    pub fn get(&self, index: i32) -> Option<&Gate> {
        self.gates.get(&index)
    }

    pub(crate) fn gate(&self, index: i32) -> &Gate {
        &self.gates[&index]
    }

    pub(crate) fn gate_mut(&mut self, index: i32) -> &mut Gate {
        match self.gates.get_mut(&index) {
            Some(gate) => gate,
            None => panic!("gate index {} is not in the tree", index),
        }
    }

    /// Insert a gate into the container.
    ///
    /// The gate's index must be unused; take it from
    /// [fresh_index](Self::fresh_index).
    pub fn add_gate(&mut self, gate: Gate) {
        debug_assert!(!self.gates.contains_key(&gate.index()));
        self.gates.insert(gate.index(), gate);
    }

    /// Allocate a fresh gate index. Indices are monotone and never reused.
    pub fn fresh_index(&mut self) -> i32 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// A stable snapshot of a gate's children, for iteration across edits.
    pub(crate) fn children_of(&self, index: i32) -> Vec<i32> {
        self.gate(index).children().iter().copied().collect()
    }

    /// Reset the visit timestamps of every gate.
    pub fn clear_visits(&mut self) {
        for gate in self.gates.values_mut() {
            gate.clear_visits();
        }
    }

    /// Human-readable label of a gate, for errors and logs.
    pub(crate) fn gate_label(&self, index: i32) -> String {
        match self.gate_names.get(&index) {
            Some(name) => name.clone(),
            None => format!("_{}_", index),
        }
    }

    fn event_value(&self, index: i32, assignment: &Assignment) -> bool {
        if self.true_house.contains(&index) {
            true
        } else if self.false_house.contains(&index) {
            false
        } else {
            assignment.is_active(index)
        }
    }

    /// Evaluate the tree under an assignment of the basic events.
    ///
    /// Handles the full gate vocabulary, signed edges, constant-collapsed
    /// gates and the top sign, so it is usable on a freshly built tree as
    /// well as at any point of preprocessing.
    pub fn evaluate(&self, assignment: &Assignment) -> bool {
        let mut memo = HashMap::new();
        let value = self.eval_gate(self.top_index, assignment, &mut memo);
        if self.top_sign < 0 {
            !value
        } else {
            value
        }
    }

    fn eval_gate(&self, index: i32, assignment: &Assignment, memo: &mut HashMap<i32, bool>) -> bool {
        if let Some(&value) = memo.get(&index) {
            return value;
        }
        let gate = self.gate(index);
        let value = match gate.state() {
            GateState::Null => false,
            GateState::Unity => true,
            GateState::Normal => {
                let values: Vec<bool> = gate
                    .children()
                    .iter()
                    .map(|&child| {
                        let raw = if self.is_gate(child) {
                            self.eval_gate(child.abs(), assignment, memo)
                        } else {
                            self.event_value(child.abs(), assignment)
                        };
                        raw != (child < 0)
                    })
                    .collect();
                let count = values.iter().filter(|v| **v).count();
                match gate.kind() {
                    GateKind::And | GateKind::Null => count == values.len(),
                    GateKind::Or => count > 0,
                    GateKind::Xor => count == 1,
                    GateKind::AtLeast => count >= gate.vote_number() as usize,
                    GateKind::Not | GateKind::Nor => count == 0,
                    GateKind::Nand => count < values.len(),
                }
            }
        };
        memo.insert(index, value);
        value
    }
}

fn validate_formula(name: &str, formula: &Formula) -> Result<(), FtkitError> {
    let arity = formula.arity();
    let invalid = |reason: String| FtkitError::InvalidGate {
        gate: name.to_string(),
        reason,
    };
    match formula.kind() {
        GateKind::Not | GateKind::Null => {
            if arity != 1 {
                return Err(invalid(format!(
                    "a {} gate takes exactly one argument, got {}",
                    formula.kind(),
                    arity
                )));
            }
        }
        GateKind::Xor => {
            if arity != 2 {
                return Err(invalid(format!(
                    "an xor gate takes exactly two arguments, got {}",
                    arity
                )));
            }
        }
        GateKind::And | GateKind::Or | GateKind::Nand | GateKind::Nor => {
            if arity < 2 {
                return Err(invalid(format!(
                    "a {} gate takes at least two arguments, got {}",
                    formula.kind(),
                    arity
                )));
            }
        }
        GateKind::AtLeast => {
            if arity < 2 {
                return Err(invalid(format!(
                    "an atleast gate takes at least two arguments, got {}",
                    arity
                )));
            }
            let vote = formula.vote_number().unwrap_or(0);
            if vote == 0 || vote as usize > arity {
                return Err(FtkitError::InvalidVoteNumber {
                    gate: name.to_string(),
                    vote,
                    arity,
                });
            }
        }
    }
    for sub in formula.formula_args() {
        validate_formula(name, sub)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::*;
    use std::iter::FromIterator;

    fn two_level_def() -> Result<FaultTreeDef, FtkitError> {
        let mut def = FaultTreeDef::default();
        def.add_basic_event("a", None)?;
        def.add_basic_event("b", None)?;
        def.add_basic_event("c", None)?;
        def.add_gate(
            "top",
            Formula::new(GateKind::And).with_event("a").with_formula(
                Formula::new(GateKind::Or).with_event("b").with_event("c"),
            ),
        )?;
        Ok(def)
    }

    #[test]
    fn indexing_layout() -> Result<(), FtkitError> {
        let def = two_level_def()?;
        let tree = FaultTree::build(&def, &Options::default())?;

        assert_eq!(tree.num_events(), 3);
        assert_eq!(tree.top_index(), 4);
        assert_eq!(tree.top_sign(), 1);
        assert!(tree.is_gate(4));
        assert!(tree.is_gate(-5));
        assert!(!tree.is_gate(3));

        // The anonymous OR received a fresh index and a parent link.
        let top = tree.get(4).unwrap();
        assert_eq!(top.children().len(), 2);
        assert!(top.children().contains(&1));
        assert!(top.children().contains(&5));
        assert_eq!(tree.get(5).unwrap().parents().len(), 1);
        Ok(())
    }

    #[test]
    fn evaluation_matches_reference() -> Result<(), FtkitError> {
        let def = two_level_def()?;
        let tree = FaultTree::build(&def, &Options::default())?;

        for mask in 0u32..8 {
            let assignment =
                Assignment::from_iter((0..3).filter(|i| mask & (1 << i) != 0).map(|i| i as i32 + 1));
            assert_eq!(tree.evaluate(&assignment), def.eval(&assignment)?);
        }
        Ok(())
    }

    #[test]
    fn cycle_detection() -> Result<(), FtkitError> {
        let mut def = FaultTreeDef::default();
        def.add_basic_event("a", None)?;
        def.add_gate(
            "g1",
            Formula::new(GateKind::Or).with_event("g2").with_event("a"),
        )?;
        def.add_gate(
            "g2",
            Formula::new(GateKind::Or).with_event("g1").with_event("a"),
        )?;
        assert!(matches!(
            FaultTree::build(&def, &Options::default()),
            Err(FtkitError::CyclicGraph(_))
        ));
        Ok(())
    }

    #[test]
    fn arity_validation() -> Result<(), FtkitError> {
        let mut def = FaultTreeDef::default();
        def.add_basic_event("a", None)?;
        def.add_basic_event("b", None)?;
        def.add_basic_event("c", None)?;
        def.add_gate(
            "top",
            Formula::new(GateKind::Xor)
                .with_event("a")
                .with_event("b")
                .with_event("c"),
        )?;
        assert!(matches!(
            FaultTree::build(&def, &Options::default()),
            Err(FtkitError::InvalidGate { .. })
        ));

        let mut def = FaultTreeDef::default();
        def.add_basic_event("a", None)?;
        def.add_basic_event("b", None)?;
        def.add_gate(
            "top",
            Formula::new(GateKind::AtLeast)
                .with_vote(3)
                .with_event("a")
                .with_event("b"),
        )?;
        assert!(matches!(
            FaultTree::build(&def, &Options::default()),
            Err(FtkitError::InvalidVoteNumber { vote: 3, arity: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn house_overrides() -> Result<(), FtkitError> {
        let mut def = FaultTreeDef::default();
        def.add_basic_event("a", None)?;
        def.add_house_event("h", false)?;
        def.add_gate(
            "top",
            Formula::new(GateKind::And).with_event("a").with_event("h"),
        )?;

        let tree = FaultTree::build(&def, &Options::default())?;
        assert!(!tree.evaluate(&Assignment::from_iter([1])));

        let mut options = Options::default();
        options.true_house_events.insert("h".to_string());
        let tree = FaultTree::build(&def, &options)?;
        assert!(tree.evaluate(&Assignment::from_iter([1])));

        options.true_house_events.insert("a".to_string());
        assert!(matches!(
            FaultTree::build(&def, &options),
            Err(FtkitError::UndefinedElement { .. })
        ));
        Ok(())
    }
}
