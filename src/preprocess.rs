//! Semantics-preserving rewriting of the indexed fault tree.
//!
//! The preprocessor is a pipeline of passes, each cycle-safe through the
//! visit-timestamp protocol:
//!
//! 1. gate normalization, reducing the vocabulary to AND/OR with signed
//!    edges (NOT/NULL gates survive transiently);
//! 2. constant propagation of the house events;
//! 3. complement propagation, pushing negations down to the events;
//! 4. a fixed point of constant-gate removal, null-gate removal and
//!    same-kind coalescing;
//! 5. module detection from DFS enter/exit times.
//!
//! Afterwards the tree is a layered AND/OR DAG: every gate is positive,
//! has at least two children, and independent sub-trees are flagged as
//! modules. A top gate collapsed to a constant is a legitimate outcome,
//! reported by the enumerator as an empty or trivial result.

use crate::*;

use log::{debug, trace};

impl FaultTree {
    /// Run the full preprocessing pipeline in place.
    pub fn preprocess(&mut self, options: &Options) -> Result<(), FtkitError> {
        self.preprocess_with(options, None)
    }

    /// Run the full preprocessing pipeline, polling `cancel` between passes.
    pub fn preprocess_with(
        &mut self,
        options: &Options,
        cancel: Option<&dyn Fn() -> bool>,
    ) -> Result<(), FtkitError> {
        debug!("normalizing gates");
        self.normalize_gates();
        check_cancelled(cancel)?;

        self.propagate_all_constants();
        // Constant rewriting can leave a NOT or pass-through at the root.
        self.normalize_top_connective();
        self.fold_top_sign();
        check_cancelled(cancel)?;

        if options.assume_coherent && self.can_skip_complements() {
            debug!("complement propagation skipped: the tree is coherent");
        } else {
            debug!("propagating complements");
            self.clear_visits();
            let top = self.top_index;
            let mut complements = HashMap::new();
            self.propagate_complements(top, &mut complements);
        }
        check_cancelled(cancel)?;

        debug!("removing constant and null gates");
        let top = self.top_index;
        self.clear_visits();
        self.remove_const_gates(top);
        loop {
            let mut changed = false;
            self.clear_visits();
            changed |= self.remove_null_gates(top);
            self.clear_visits();
            changed |= self.join_gates(top);
            self.clear_visits();
            changed |= self.remove_const_gates(top);
            if !changed {
                break;
            }
        }
        self.shorten_top();
        check_cancelled(cancel)?;

        let top = self.gate(self.top_index);
        if top.state() == GateState::Normal && !top.children().is_empty() {
            self.detect_modules();
        }
        Ok(())
    }

    /// Complement propagation is unnecessary when no edge is negated and
    /// no NOT gate survived normalization.
    fn can_skip_complements(&self) -> bool {
        self.gates.values().all(|gate| {
            gate.kind() != GateKind::Not
                && gate
                    .children()
                    .iter()
                    .all(|&child| child > 0 || !self.is_gate(child))
        })
    }

    fn single_child(&self, index: i32) -> i32 {
        debug_assert_eq!(self.gate(index).children().len(), 1);
        *self.gate(index).children().iter().next().unwrap()
    }

    // ---------------------------------------------------------------- P1

    fn normalize_gates(&mut self) {
        self.normalize_top_connective();

        let top = self.top_index;
        self.clear_visits();
        self.notify_negative_gates(top);
        self.clear_visits();
        self.normalize_gate(top);

        self.fold_top_sign();
    }

    /// The top gate absorbs its own negation into the tree sign instead of
    /// an edge, and pass-through tops are dissolved outright.
    fn normalize_top_connective(&mut self) {
        loop {
            let top = self.top_index;
            if self.gate(top).state() != GateState::Normal {
                return;
            }
            let kind = self.gate(top).kind();
            match kind {
                GateKind::Nor => {
                    self.top_sign = -self.top_sign;
                    self.gate_mut(top).set_kind(GateKind::Or);
                }
                GateKind::Nand => {
                    self.top_sign = -self.top_sign;
                    self.gate_mut(top).set_kind(GateKind::And);
                }
                GateKind::Not | GateKind::Null => {
                    let child = self.single_child(top);
                    if kind == GateKind::Not {
                        self.top_sign = -self.top_sign;
                    }
                    if self.is_gate(child) {
                        if child < 0 {
                            self.top_sign = -self.top_sign;
                        }
                        self.gates.remove(&top);
                        self.gate_names.remove(&top);
                        self.top_index = child.abs();
                        continue; // the new top may need the same treatment
                    }
                    // The whole tree is a single literal.
                    if kind == GateKind::Not {
                        self.gate_mut(top).set_kind(GateKind::Null);
                    }
                }
                _ => {}
            }
            return;
        }
    }

    /// Fold the accumulated sign back into the top gate.
    fn fold_top_sign(&mut self) {
        if self.top_sign >= 0 {
            return;
        }
        let top = self.top_index;
        match self.gate(top).state() {
            GateState::Null => self.gate_mut(top).make_unity(),
            GateState::Unity => self.gate_mut(top).nullify(),
            GateState::Normal => match self.gate(top).kind() {
                GateKind::And | GateKind::Or => {
                    let dual = self.gate(top).kind().dual();
                    let gate = self.gate_mut(top);
                    gate.set_kind(dual);
                    gate.invert_children();
                }
                GateKind::Null => self.gate_mut(top).invert_children(),
                _ => unreachable!("the top gate is normalized"),
            },
        }
        self.top_sign = 1;
    }

    /// Turn edges pointing at NOR/NAND gates into negated edges, so those
    /// gates can be retyped to OR/AND without changing semantics.
    fn notify_negative_gates(&mut self, index: i32) {
        if self.gate(index).visited() {
            return;
        }
        self.gate_mut(index).visit(1);
        let mut to_negate = Vec::new();
        for child in self.children_of(index) {
            let target = child.abs();
            if !self.is_gate(target) {
                continue;
            }
            self.notify_negative_gates(target);
            if matches!(
                self.gate(target).kind(),
                GateKind::Nor | GateKind::Nand
            ) {
                to_negate.push(child);
            }
        }
        for child in to_negate {
            let swapped = self.gate_mut(index).swap_child(child, -child);
            debug_assert!(swapped);
        }
    }

    fn normalize_gate(&mut self, index: i32) {
        if self.gate(index).visited() {
            return;
        }
        self.gate_mut(index).visit(1);

        // Depth-first, before this gate's children get rewritten.
        for child in self.children_of(index) {
            let target = child.abs();
            if self.is_gate(target) {
                self.normalize_gate(target);
            }
        }

        match self.gate(index).kind() {
            GateKind::Nor | GateKind::Or => self.gate_mut(index).set_kind(GateKind::Or),
            GateKind::Nand | GateKind::And => self.gate_mut(index).set_kind(GateKind::And),
            GateKind::Xor => self.normalize_xor(index),
            GateKind::AtLeast => self.normalize_atleast(index),
            // NOT and NULL dissolve during complement propagation.
            GateKind::Not | GateKind::Null => {}
        }
    }

    /// XOR(a, b) becomes OR(AND(a, !b), AND(!a, b)).
    fn normalize_xor(&mut self, index: i32) {
        let children = self.children_of(index);
        debug_assert_eq!(children.len(), 2);
        let (a, b) = (children[0], children[1]);

        let one_index = self.fresh_index();
        let two_index = self.fresh_index();
        let mut one = Gate::new(one_index, GateKind::And);
        let mut two = Gate::new(two_index, GateKind::And);
        one.add_child(a);
        one.add_child(-b);
        two.add_child(-a);
        two.add_child(b);
        self.add_gate(one);
        self.add_gate(two);

        let gate = self.gate_mut(index);
        gate.set_kind(GateKind::Or);
        gate.erase_all_children();
        gate.add_child(one_index);
        gate.add_child(two_index);
    }

    /// Shannon expansion of the voting gate:
    /// ATLEAST(k; a, rest...) becomes
    /// OR(AND(a, ATLEAST(k-1; rest...)), ATLEAST(k; rest...)).
    fn normalize_atleast(&mut self, index: i32) {
        let vote = self.gate(index).vote_number();
        let children = self.children_of(index);
        debug_assert!(vote > 0);
        debug_assert!(children.len() > 1);

        if children.len() == vote as usize {
            self.gate_mut(index).set_kind(GateKind::And);
            return;
        }
        if vote == 1 {
            self.gate_mut(index).set_kind(GateKind::Or);
            return;
        }

        let first = children[0];
        let first_index = self.fresh_index();
        let grand_index = self.fresh_index();
        let second_index = self.fresh_index();

        let mut first_gate = Gate::new(first_index, GateKind::And);
        first_gate.add_child(first);
        first_gate.add_child(grand_index);

        let mut grand = Gate::new(grand_index, GateKind::AtLeast);
        grand.set_vote_number(vote - 1);
        let mut second = Gate::new(second_index, GateKind::AtLeast);
        second.set_vote_number(vote);
        for &child in &children[1..] {
            grand.add_child(child);
            second.add_child(child);
        }

        self.add_gate(first_gate);
        self.add_gate(grand);
        self.add_gate(second);

        let gate = self.gate_mut(index);
        gate.set_kind(GateKind::Or);
        gate.erase_all_children();
        gate.add_child(first_index);
        gate.add_child(second_index);

        self.normalize_atleast(grand_index);
        self.normalize_atleast(second_index);
    }

    // ---------------------------------------------------------------- P2

    fn propagate_all_constants(&mut self) {
        if self.true_house.is_empty() && self.false_house.is_empty() {
            return;
        }
        debug!("propagating constants");
        self.clear_visits();
        let top = self.top_index;
        self.propagate_constants(top);
    }

    /// Propagate the house-event constants bottom-up.
    ///
    /// The polarity table covers the full gate vocabulary, so this pass is
    /// also correct on a tree that has not been normalized yet.
    pub(crate) fn propagate_constants(&mut self, index: i32) {
        if self.gate(index).visited() {
            return;
        }
        self.gate_mut(index).visit(1);
        let mut to_erase = Vec::new();
        for child in self.children_of(index) {
            let target = child.abs();
            let constant = if self.is_gate(target) {
                self.propagate_constants(target);
                match self.gate(target).state() {
                    GateState::Normal => None,
                    GateState::Null => Some(false),
                    GateState::Unity => Some(true),
                }
            } else if self.false_house.contains(&target) {
                Some(false)
            } else if self.true_house.contains(&target) {
                Some(true)
            } else {
                None
            };
            let Some(mut value) = constant else { continue };
            if child < 0 {
                value = !value; // a negated constant is the opposite constant
            }
            if self.process_constant_child(index, child, value, &mut to_erase) {
                return; // the gate itself collapsed to a constant
            }
        }
        self.remove_children(index, &to_erase);
    }

    /// Apply the polarity table for one constant child.
    ///
    /// Erasures are deferred through `to_erase`; the return value signals
    /// that the parent itself collapsed to a constant.
    fn process_constant_child(
        &mut self,
        index: i32,
        child: i32,
        value: bool,
        to_erase: &mut Vec<i32>,
    ) -> bool {
        let kind = self.gate(index).kind();
        if !value {
            match kind {
                GateKind::Nor | GateKind::Xor | GateKind::Or => {
                    to_erase.push(child);
                    return false;
                }
                GateKind::Null | GateKind::And => self.gate_mut(index).nullify(),
                GateKind::Nand | GateKind::Not => self.gate_mut(index).make_unity(),
                GateKind::AtLeast => {
                    to_erase.push(child);
                    let vote = self.gate(index).vote_number();
                    let remaining = self.gate(index).children().len() - to_erase.len();
                    if vote as usize == remaining {
                        self.gate_mut(index).set_kind(GateKind::And);
                    }
                    return false;
                }
            }
        } else {
            match kind {
                GateKind::Null | GateKind::Or => self.gate_mut(index).make_unity(),
                GateKind::Nand | GateKind::And => {
                    to_erase.push(child);
                    return false;
                }
                GateKind::Nor | GateKind::Not => self.gate_mut(index).nullify(),
                GateKind::Xor => {
                    // The other child was already erased as false.
                    if to_erase.len() == 1 {
                        self.gate_mut(index).make_unity();
                    } else {
                        debug_assert!(to_erase.is_empty());
                        self.gate_mut(index).set_kind(GateKind::Not);
                        to_erase.push(child);
                        return false;
                    }
                }
                GateKind::AtLeast => {
                    let vote = self.gate(index).vote_number();
                    if vote == 1 {
                        self.gate_mut(index).make_unity();
                    } else {
                        let vote = vote - 1;
                        if vote == 1 {
                            self.gate_mut(index).set_kind(GateKind::Or);
                        } else {
                            self.gate_mut(index).set_vote_number(vote);
                        }
                        to_erase.push(child);
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Erase the accumulated children, then collapse or retype the gate if
    /// too few children remain.
    fn remove_children(&mut self, index: i32, to_erase: &[i32]) {
        if to_erase.is_empty() {
            return;
        }
        let gate = self.gate_mut(index);
        for &child in to_erase {
            gate.erase_child(child);
        }
        if gate.children().is_empty() {
            match gate.kind() {
                GateKind::Nand | GateKind::Xor | GateKind::Or => gate.nullify(),
                GateKind::Nor | GateKind::And => gate.make_unity(),
                GateKind::Not | GateKind::Null | GateKind::AtLeast => {
                    unreachable!("a {} gate cannot lose all children", gate.kind())
                }
            }
        } else if gate.children().len() == 1 {
            match gate.kind() {
                GateKind::Xor | GateKind::Or | GateKind::And => gate.set_kind(GateKind::Null),
                GateKind::Nor | GateKind::Nand => gate.set_kind(GateKind::Not),
                GateKind::Not | GateKind::Null => {}
                GateKind::AtLeast => unreachable!("a voting gate cannot keep a single child"),
            }
        }
    }

    // ---------------------------------------------------------------- P3

    /// Push negated gate edges down to the events.
    ///
    /// NOT and NULL pass-throughs are spliced out with the sign composed on
    /// the edge. Any other negated gate is replaced by its complement twin:
    /// a fresh gate of the dual kind with every child sign flipped. Twins
    /// are cached per target so repeated negative references share them.
    fn propagate_complements(&mut self, index: i32, complements: &mut HashMap<i32, i32>) {
        'restart: loop {
            for child in self.children_of(index) {
                let target = child.abs();
                if !self.is_gate(target) {
                    continue;
                }
                let kind = self.gate(target).kind();
                if kind == GateKind::Not || kind == GateKind::Null {
                    if self.gate(target).state() != GateState::Normal {
                        continue;
                    }
                    let grand = self.single_child(target);
                    let mult = if kind == GateKind::Not { -1 } else { 1 } * child.signum();
                    if !self.gate_mut(index).swap_child(child, grand * mult) {
                        return; // collapsed to a constant
                    }
                    continue 'restart;
                }
                if child < 0 {
                    let twin = match complements.get(&target).copied() {
                        Some(twin) => twin,
                        None => {
                            let twin_index = self.fresh_index();
                            let mut twin = Gate::new(twin_index, kind.dual());
                            for grand in self.children_of(target) {
                                twin.add_child(-grand);
                            }
                            trace!("complement twin {} of gate {}", twin_index, target);
                            self.add_gate(twin);
                            complements.insert(target, twin_index);
                            self.gate_mut(twin_index).visit(1);
                            self.propagate_complements(twin_index, complements);
                            twin_index
                        }
                    };
                    if !self.gate_mut(index).swap_child(child, twin) {
                        return;
                    }
                    continue 'restart;
                }
                if !self.gate(target).visited() {
                    self.gate_mut(target).visit(1);
                    self.propagate_complements(target, complements);
                }
            }
            return;
        }
    }

    // ---------------------------------------------------------------- P4

    /// Re-apply the polarity table to children that collapsed to constants
    /// in earlier passes. Returns whether anything changed.
    fn remove_const_gates(&mut self, index: i32) -> bool {
        if self.gate(index).visited() {
            return false;
        }
        self.gate_mut(index).visit(1);
        if self.gate(index).state() != GateState::Normal {
            return false;
        }
        let mut changed = false;
        let mut to_erase = Vec::new();
        for child in self.children_of(index) {
            let target = child.abs();
            if !self.is_gate(target) {
                continue;
            }
            changed |= self.remove_const_gates(target);
            let value = match self.gate(target).state() {
                GateState::Normal => continue,
                GateState::Null => false,
                GateState::Unity => true,
            };
            let value = value != (child < 0);
            if self.process_constant_child(index, child, value, &mut to_erase) {
                return true; // the gate itself became a constant
            }
        }
        if !to_erase.is_empty() {
            changed = true;
        }
        self.remove_children(index, &to_erase);
        changed
    }

    /// Splice out pass-through gates, composing the sign on the edge.
    fn remove_null_gates(&mut self, index: i32) -> bool {
        if self.gate(index).visited() {
            return false;
        }
        self.gate_mut(index).visit(1);
        let mut changed = false;
        let mut null_children = Vec::new();
        for child in self.children_of(index) {
            let target = child.abs();
            if !self.is_gate(target) {
                continue;
            }
            changed |= self.remove_null_gates(target);
            if self.gate(target).kind() == GateKind::Null {
                null_children.push(child);
            }
        }
        for child in null_children {
            let target = child.abs();
            if self.gate(target).state() != GateState::Normal {
                continue;
            }
            let grand = self.single_child(target);
            if !self.gate_mut(index).swap_child(child, grand * child.signum()) {
                return true; // collapsed to a constant
            }
            changed = true;
        }
        changed
    }

    /// Coalesce same-kind positive child gates into their parent.
    /// Modules are kept intact.
    fn join_gates(&mut self, index: i32) -> bool {
        if self.gate(index).visited() {
            return false;
        }
        self.gate_mut(index).visit(1);
        let parent_kind = self.gate(index).kind();
        let mut changed = false;
        let mut to_join = Vec::new();
        for child in self.children_of(index) {
            let target = child.abs();
            if !self.is_gate(target) {
                continue;
            }
            changed |= self.join_gates(target);
            if child < 0 {
                continue; // cannot absorb through a negated edge
            }
            let child_gate = self.gate(target);
            if child_gate.is_module() || child_gate.state() != GateState::Normal {
                continue;
            }
            let same = match parent_kind {
                GateKind::Nand | GateKind::And => child_gate.kind() == GateKind::And,
                GateKind::Nor | GateKind::Or => child_gate.kind() == GateKind::Or,
                _ => false,
            };
            if same {
                to_join.push(target);
            }
        }
        if !to_join.is_empty() {
            changed = true;
        }
        for target in to_join {
            let grandchildren = self.children_of(target);
            if !self.gate_mut(index).join_child_gate(target, grandchildren) {
                return true; // the parent became a constant
            }
        }
        changed
    }

    /// Dissolve single-child pass-throughs left at the very top.
    fn shorten_top(&mut self) {
        loop {
            let top = self.top_index;
            let gate = self.gate(top);
            if gate.state() != GateState::Normal || gate.children().len() != 1 {
                return;
            }
            let child = self.single_child(top);
            if child > 0 && self.is_gate(child) {
                self.gates.remove(&top);
                self.gate_names.remove(&top);
                self.top_index = child;
            } else {
                // A single literal: the enumerator handles it directly.
                return;
            }
        }
    }

    // ---------------------------------------------------------------- P5

    /// Flag independent sub-trees as modules.
    ///
    /// One DFS assigns enter/exit times to gates and first/last visit times
    /// to events. A gate is a module iff no event or sub-gate in its
    /// sub-tree is visited outside its own enter/exit window. Children that
    /// are pairwise independent of the rest are grouped into fresh
    /// synthetic module gates.
    fn detect_modules(&mut self) {
        debug!("detecting modules");
        let mut visit_events = vec![(0, 0); self.num_events() + 1];
        self.clear_visits();
        let top = self.top_index;
        let mut time = 0;
        self.assign_timing(&mut time, top, &mut visit_events);
        trace!("timings assigned up to {}", time);

        let mut visited_gates = HashMap::new();
        self.find_modules(top, &visit_events, &mut visited_gates);
        debug_assert!(self.gate(top).is_module());
        debug_assert!(!self.gate(top).revisited());
    }

    fn assign_timing(&mut self, time: &mut i32, index: i32, visit_events: &mut [(i32, i32)]) {
        *time += 1;
        if self.gate_mut(index).visit(*time) {
            return; // revisited
        }
        for child in self.children_of(index) {
            let target = child.abs();
            if self.is_gate(target) {
                self.assign_timing(time, target, visit_events);
            } else {
                *time += 1;
                let slot = &mut visit_events[target as usize];
                if slot.0 == 0 {
                    *slot = (*time, *time);
                } else {
                    slot.1 = *time;
                }
            }
        }
        *time += 1;
        let revisited = self.gate_mut(index).visit(*time);
        debug_assert!(!revisited, "cyclic visit during timing");
    }

    fn find_modules(
        &mut self,
        index: i32,
        visit_events: &[(i32, i32)],
        visited_gates: &mut HashMap<i32, (i32, i32)>,
    ) {
        if visited_gates.contains_key(&index) {
            return;
        }
        let enter = self.gate(index).enter_time();
        let exit = self.gate(index).exit_time();
        let mut min_time = enter;
        let mut max_time = exit;

        let mut non_shared = Vec::new();
        let mut modular = Vec::new();
        let mut non_modular = Vec::new();
        for child in self.children_of(index) {
            let target = child.abs();
            let (min, max) = if self.is_gate(target) {
                debug_assert!(child > 0);
                self.find_modules(target, visit_events, visited_gates);
                let range = visited_gates[&target];
                if self.gate(target).is_module() && !self.gate(target).revisited() {
                    non_shared.push(child);
                    continue;
                }
                range
            } else {
                let slot = visit_events[target as usize];
                if slot.0 == slot.1 {
                    debug_assert!(slot.0 > enter && slot.1 < exit);
                    non_shared.push(child);
                    continue;
                }
                slot
            };
            debug_assert!(min != 0 && max != 0);
            if min > enter && max < exit {
                modular.push(child);
            } else {
                non_modular.push(child);
            }
            min_time = min_time.min(min);
            max_time = max_time.max(max);
        }

        if min_time == enter && max_time == exit {
            trace!("gate {} is a module", index);
            self.gate_mut(index).mark_module();
        }
        if non_shared.len() > 1 {
            self.create_module(index, &non_shared);
        }

        // Shared children with ranges inside the window can still form a
        // module together, unless their ranges overlap an escaping sibling.
        self.filter_modular(visit_events, visited_gates, &mut modular, &mut non_modular);
        if modular.len() > 1 {
            self.create_module(index, &modular);
        }

        max_time = max_time.max(self.gate(index).last_visit());
        visited_gates.insert(index, (min_time, max_time));
    }

    fn visit_range(
        &self,
        child: i32,
        visit_events: &[(i32, i32)],
        visited_gates: &HashMap<i32, (i32, i32)>,
    ) -> (i32, i32) {
        let target = child.abs();
        if self.is_gate(target) {
            visited_gates[&target]
        } else {
            visit_events[target as usize]
        }
    }

    fn filter_modular(
        &self,
        visit_events: &[(i32, i32)],
        visited_gates: &HashMap<i32, (i32, i32)>,
        modular: &mut Vec<i32>,
        non_modular: &mut Vec<i32>,
    ) {
        if modular.is_empty() || non_modular.is_empty() {
            return;
        }
        let mut still_modular = Vec::new();
        let mut newly_non_modular = Vec::new();
        for &child in modular.iter() {
            let (min, max) = self.visit_range(child, visit_events, visited_gates);
            let escaped = non_modular.iter().any(|&other| {
                let (low, high) = self.visit_range(other, visit_events, visited_gates);
                min.max(low) <= max.min(high) // the ranges overlap
            });
            if escaped {
                newly_non_modular.push(child);
            } else {
                still_modular.push(child);
            }
        }
        self.filter_modular(
            visit_events,
            visited_gates,
            &mut still_modular,
            &mut newly_non_modular,
        );
        *modular = still_modular;
        non_modular.extend(newly_non_modular);
    }

    /// Extract a group of children into a fresh synthetic module gate
    /// inheriting the parent's kind.
    fn create_module(&mut self, index: i32, children: &[i32]) {
        debug_assert!(children.len() > 1);
        debug_assert!(children.len() <= self.gate(index).children().len());
        if children.len() == self.gate(index).children().len() {
            self.gate_mut(index).mark_module();
            return;
        }
        let kind = self.gate(index).kind();
        debug_assert!(matches!(kind, GateKind::And | GateKind::Or));

        let module_index = self.fresh_index();
        let mut module = Gate::new(module_index, kind);
        module.mark_module();
        for &child in children {
            module.add_child(child);
        }
        self.add_gate(module);

        let gate = self.gate_mut(index);
        for &child in children {
            gate.erase_child(child);
        }
        debug_assert!(!gate.children().is_empty());
        gate.add_child(module_index);
        trace!(
            "new module {} under gate {} with {} children",
            module_index,
            index,
            children.len()
        );
    }
}

fn check_cancelled(cancel: Option<&dyn Fn() -> bool>) -> Result<(), FtkitError> {
    match cancel {
        Some(cancelled) if cancelled() => Err(FtkitError::Cancelled),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use std::iter::FromIterator;

    fn all_assignments(n: usize) -> Vec<Assignment> {
        (0u32..1 << n)
            .map(|mask| {
                Assignment::from_iter(
                    (0..n).filter(|i| mask & (1 << i) != 0).map(|i| i as i32 + 1),
                )
            })
            .collect()
    }

    fn check_preserved(text: &str) -> Result<FaultTree, FtkitError> {
        let def = parse_tree(text)?;
        let options = Options::default();
        let mut tree = FaultTree::build(&def, &options)?;
        let n = def.events().len();
        assert!(n <= 12, "exhaustive check requires a small tree");

        let before: Vec<bool> = all_assignments(n)
            .iter()
            .map(|a| tree.evaluate(a))
            .collect();
        tree.preprocess(&options)?;
        let after: Vec<bool> = all_assignments(n)
            .iter()
            .map(|a| tree.evaluate(a))
            .collect();
        assert_eq!(before, after, "preprocessing changed the semantics");
        Ok(tree)
    }

    /// Every reachable gate is a positive AND/OR with at least 2 children.
    fn check_shape(tree: &FaultTree, index: i32, seen: &mut std::collections::HashSet<i32>) {
        if !seen.insert(index) {
            return;
        }
        let gate = tree.get(index).unwrap();
        if gate.state() != GateState::Normal {
            return;
        }
        if index == tree.top_index() && gate.children().len() == 1 {
            // a single-literal tree keeps its pass-through top
            assert_eq!(gate.kind(), GateKind::Null);
            return;
        }
        assert!(matches!(gate.kind(), GateKind::And | GateKind::Or));
        assert!(gate.children().len() >= 2);
        for &child in gate.children() {
            if tree.is_gate(child) {
                assert!(child > 0, "negated gate edge after preprocessing");
                check_shape(tree, child, seen);
            }
        }
    }

    fn check_preserved_and_shaped(text: &str) -> Result<(), FtkitError> {
        let tree = check_preserved(text)?;
        if tree.get(tree.top_index()).unwrap().state() == GateState::Normal {
            check_shape(&tree, tree.top_index(), &mut Default::default());
        }
        Ok(())
    }

    #[test]
    fn normalization_preserves_semantics() -> Result<(), FtkitError> {
        check_preserved_and_shaped("top := a & (b | c)")?;
        check_preserved_and_shaped("top := xor(a, b)")?;
        check_preserved_and_shaped("top := xor(!a, xor(b, c))")?;
        check_preserved_and_shaped("top := nand(a, nor(b, c), d)")?;
        check_preserved_and_shaped("top := not(and(a, b))")?;
        check_preserved_and_shaped("top := atleast(2; a, b, c)")?;
        check_preserved_and_shaped("top := atleast(3; a, b, c, d, e)")?;
        check_preserved_and_shaped("top := nor(a, and(b, !c))")?;
        check_preserved_and_shaped("top := not(not(and(a, b)))")?;
        check_preserved_and_shaped("top := null(and(a, b))")?;
        check_preserved_and_shaped("top := !a")?;
        check_preserved_and_shaped(
            "top := g1 & g2 & !g3\ng1 := a | b\ng2 := a | c\ng3 := and(d, e)",
        )?;
        Ok(())
    }

    #[test]
    fn shared_negated_gate_uses_one_twin() -> Result<(), FtkitError> {
        let def = parse_tree(
            "top := and(or(!sub, c), or(!sub, d), e)\n\
             sub := a | b",
        )?;
        let options = Options::default();
        let mut tree = FaultTree::build(&def, &options)?;
        tree.preprocess(&options)?;

        // One complement twin serves both negated references.
        let a = def.events().index_of("a").unwrap();
        let b = def.events().index_of("b").unwrap();
        let twins = tree
            .gates
            .values()
            .filter(|g| {
                g.children().len() == 2
                    && g.children().contains(&-a)
                    && g.children().contains(&-b)
            })
            .count();
        assert_eq!(twins, 1);
        Ok(())
    }

    #[test]
    fn house_constants_rewrite_the_tree() -> Result<(), FtkitError> {
        // A true house event erases itself from the AND.
        let def = parse_tree(
            "house h = true\n\
             top := h & (a | b)",
        )?;
        let options = Options::default();
        let mut tree = FaultTree::build(&def, &options)?;
        tree.preprocess(&options)?;
        let top = tree.get(tree.top_index()).unwrap();
        assert_eq!(top.kind(), GateKind::Or);
        assert_eq!(top.children().len(), 2);

        // A false house event collapses the whole tree.
        let def = parse_tree(
            "house h = false\n\
             top := h & (a | b)",
        )?;
        let mut tree = FaultTree::build(&def, &options)?;
        tree.preprocess(&options)?;
        assert_eq!(
            tree.get(tree.top_index()).unwrap().state(),
            GateState::Null
        );
        Ok(())
    }

    #[test]
    fn xor_constant_table() -> Result<(), FtkitError> {
        for h in [true, false] {
            let text = format!(
                "house h = {}\n\
                 top := xor(h, a)",
                h
            );
            let def = parse_tree(&text)?;
            let options = Options::default();
            let mut tree = FaultTree::build(&def, &options)?;
            tree.preprocess(&options)?;
            assert_eq!(
                tree.get(tree.top_index()).unwrap().state(),
                GateState::Normal
            );
            // xor(true, a) == !a, xor(false, a) == a
            let a = def.events().index_of("a").unwrap();
            let on = Assignment::from_iter([a]);
            let off = Assignment::default();
            assert_eq!(tree.evaluate(&on), !h);
            assert_eq!(tree.evaluate(&off), h);
        }

        // Both children constant.
        for (x, y) in [(true, true), (true, false), (false, true), (false, false)] {
            let text = format!(
                "house x = {}\nhouse y = {}\n\
                 top := xor(x, y)",
                x, y
            );
            let def = parse_tree(&text)?;
            let options = Options::default();
            let mut tree = FaultTree::build(&def, &options)?;
            tree.preprocess(&options)?;
            let expected = if x != y { GateState::Unity } else { GateState::Null };
            assert_eq!(tree.get(tree.top_index()).unwrap().state(), expected);
        }
        Ok(())
    }

    #[test]
    fn polarity_table_on_raw_gates() -> Result<(), FtkitError> {
        // The table covers the full vocabulary, so the pass is usable on a
        // tree that was not normalized first.
        let build = |text: &str| -> Result<FaultTree, FtkitError> {
            FaultTree::build(&parse_tree(text)?, &Options::default())
        };

        // xor with a true child turns into NOT of the other child
        let mut tree = build("house h = true\ntop := xor(h, a)")?;
        let top = tree.top_index();
        tree.propagate_constants(top);
        assert_eq!(tree.get(top).unwrap().kind(), GateKind::Not);
        assert_eq!(tree.get(top).unwrap().children().len(), 1);

        // xor with a false child passes the other child through
        let mut tree = build("house h = false\ntop := xor(h, a)")?;
        let top = tree.top_index();
        tree.propagate_constants(top);
        assert_eq!(tree.get(top).unwrap().kind(), GateKind::Null);

        // a true child decrements the vote: atleast(2; h, a, b) == a | b
        let mut tree = build("house h = true\ntop := atleast(2; h, a, b)")?;
        let top = tree.top_index();
        tree.propagate_constants(top);
        assert_eq!(tree.get(top).unwrap().kind(), GateKind::Or);
        assert_eq!(tree.get(top).unwrap().children().len(), 2);

        // a false child shrinks the arity: atleast(2; h, a, b) == a & b
        let mut tree = build("house h = false\ntop := atleast(2; h, a, b)")?;
        let top = tree.top_index();
        tree.propagate_constants(top);
        assert_eq!(tree.get(top).unwrap().kind(), GateKind::And);
        assert_eq!(tree.get(top).unwrap().children().len(), 2);

        // nand and nor collapse against their absorbing constants
        let mut tree = build("house h = false\ntop := nand(h, a)")?;
        let top = tree.top_index();
        tree.propagate_constants(top);
        assert_eq!(tree.get(top).unwrap().state(), GateState::Unity);

        let mut tree = build("house h = true\ntop := nor(h, a)")?;
        let top = tree.top_index();
        tree.propagate_constants(top);
        assert_eq!(tree.get(top).unwrap().state(), GateState::Null);
        Ok(())
    }

    #[test]
    fn atleast_constant_table() -> Result<(), FtkitError> {
        // A constant child of ATLEAST(k; n) leaves ATLEAST(k-1; n-1) for
        // true and ATLEAST(k; n-1) for false. Checked exhaustively.
        for n in 3..=5usize {
            for k in 2..=3u32 {
                if k as usize >= n {
                    continue;
                }
                for value in [true, false] {
                    let events: Vec<String> =
                        (0..n - 1).map(|i| format!("e{}", i)).collect();
                    let text = format!(
                        "house h = {}\n\
                         top := atleast({}; h, {})",
                        value,
                        k,
                        events.join(", ")
                    );
                    let def = parse_tree(&text)?;
                    let options = Options::default();
                    let mut tree = FaultTree::build(&def, &options)?;
                    let reference: Vec<bool> = all_assignments(n)
                        .iter()
                        .map(|a| tree.evaluate(a))
                        .collect();
                    tree.preprocess(&options)?;
                    let rewritten: Vec<bool> = all_assignments(n)
                        .iter()
                        .map(|a| tree.evaluate(a))
                        .collect();
                    assert_eq!(reference, rewritten, "atleast({}; n={}) h={}", k, n, value);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn independent_subtrees_become_modules() -> Result<(), FtkitError> {
        let def = parse_tree("top := (a | b) & (c | d)")?;
        let options = Options::default();
        let mut tree = FaultTree::build(&def, &options)?;
        tree.preprocess(&options)?;

        let top = tree.get(tree.top_index()).unwrap();
        assert!(top.is_module());
        for &child in top.children() {
            assert!(tree.is_gate(child));
            assert!(tree.get(child).unwrap().is_module());
        }
        Ok(())
    }

    #[test]
    fn shared_events_block_modules() -> Result<(), FtkitError> {
        let def = parse_tree("top := (a | b) & (a | c)")?;
        let options = Options::default();
        let mut tree = FaultTree::build(&def, &options)?;
        tree.preprocess(&options)?;

        let top = tree.get(tree.top_index()).unwrap();
        assert!(top.is_module());
        for &child in top.children() {
            if tree.is_gate(child) {
                assert!(!tree.get(child).unwrap().is_module());
            }
        }
        Ok(())
    }

    #[test]
    fn coherent_hint_skips_complements() -> Result<(), FtkitError> {
        let def = parse_tree("top := (a & b) | (c & d)")?;
        let mut options = Options::default();
        options.assume_coherent = true;
        let mut tree = FaultTree::build(&def, &options)?;
        tree.preprocess(&options)?;
        check_shape(&tree, tree.top_index(), &mut Default::default());

        // The hint must not be trusted on a non-coherent tree.
        let def = parse_tree("top := (a & !b) | xor(c, d)")?;
        let mut tree = FaultTree::build(&def, &options)?;
        let reference: Vec<bool> = all_assignments(4)
            .iter()
            .map(|a| tree.evaluate(a))
            .collect();
        tree.preprocess(&options)?;
        let rewritten: Vec<bool> = all_assignments(4)
            .iter()
            .map(|a| tree.evaluate(a))
            .collect();
        assert_eq!(reference, rewritten);
        Ok(())
    }

    #[test]
    fn cancellation_aborts() -> Result<(), FtkitError> {
        let def = parse_tree("top := a & (b | c)")?;
        let options = Options::default();
        let mut tree = FaultTree::build(&def, &options)?;
        let cancel = || true;
        assert!(matches!(
            tree.preprocess_with(&options, Some(&cancel)),
            Err(FtkitError::Cancelled)
        ));
        Ok(())
    }

    #[test]
    fn deterministic_rewriting() -> Result<(), FtkitError> {
        let text = "top := xor(g1, g2) & !e\ng1 := a | b\ng2 := atleast(2; a, c, d)";
        let options = Options::default();

        let def = parse_tree(text)?;
        let mut first = FaultTree::build(&def, &options)?;
        first.preprocess(&options)?;
        let mut second = FaultTree::build(&def, &options)?;
        second.preprocess(&options)?;

        assert_eq!(first.top_index(), second.top_index());
        let mut indices: Vec<i32> = first.gates.keys().copied().collect();
        indices.sort_unstable();
        let mut other: Vec<i32> = second.gates.keys().copied().collect();
        other.sort_unstable();
        assert_eq!(indices, other);
        for index in indices {
            assert_eq!(
                first.get(index).unwrap().children(),
                second.get(index).unwrap().children()
            );
        }
        Ok(())
    }
}
