//! The symbolic fault tree, before indexing.

use crate::*;

use std::collections::HashSet;

/// The body of a symbolic gate: a connective applied to named references
/// and nested anonymous formulas.
///
/// Named references resolve to basic events, house events or other gates
/// when the tree is indexed. The complement flag on a reference negates the
/// edge. Nested formulas describe anonymous sub-gates and receive fresh
/// indices during indexing.
///
/// ```
/// use ftkit::{Formula, GateKind};
///
/// // at least 2 of {power_a, power_b, power_c}
/// let body = Formula::new(GateKind::AtLeast)
///     .with_vote(2)
///     .with_event("power_a")
///     .with_event("power_b")
///     .with_event("power_c");
/// assert_eq!(body.arity(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct Formula {
    kind: GateKind,
    vote_number: Option<u32>,
    event_args: Vec<(String, bool)>,
    formula_args: Vec<Formula>,
}

impl Formula {
    /// Start a formula with the given connective and no arguments.
    pub fn new(kind: GateKind) -> Self {
        Self {
            kind,
            vote_number: None,
            event_args: Vec::new(),
            formula_args: Vec::new(),
        }
    }

    /// Set the vote number (ATLEAST connective only).
    pub fn with_vote(mut self, vote: u32) -> Self {
        self.vote_number = Some(vote);
        self
    }

    /// Add a positive reference to a named event or gate.
    pub fn with_event(mut self, name: &str) -> Self {
        self.event_args.push((name.to_string(), false));
        self
    }

    /// Add a complemented reference to a named event or gate.
    pub fn with_complement(mut self, name: &str) -> Self {
        self.event_args.push((name.to_string(), true));
        self
    }

    /// Add an anonymous nested formula.
    pub fn with_formula(mut self, formula: Formula) -> Self {
        self.formula_args.push(formula);
        self
    }

    /// The connective of this formula.
    pub fn kind(&self) -> GateKind {
        self.kind
    }

    /// The declared vote number, if any.
    pub fn vote_number(&self) -> Option<u32> {
        self.vote_number
    }

    /// Named references, with their complement flag.
    pub fn event_args(&self) -> &[(String, bool)] {
        &self.event_args
    }

    /// Nested anonymous formulas.
    pub fn formula_args(&self) -> &[Formula] {
        &self.formula_args
    }

    /// Total number of arguments.
    pub fn arity(&self) -> usize {
        self.event_args.len() + self.formula_args.len()
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a str>) {
        for (name, _) in &self.event_args {
            out.push(name);
        }
        for f in &self.formula_args {
            f.collect_references(out);
        }
    }
}

/// A complete symbolic fault tree: named events, named gates and a top.
///
/// This is the input contract of the analysis. It can be constructed
/// programmatically or through [parse_tree](crate::parse_tree). Name
/// collisions between events and gates are rejected eagerly; dangling
/// references and arity problems are reported when the tree is indexed by
/// [FaultTree::build](crate::FaultTree::build).
///
/// ```
/// use ftkit::{FaultTreeDef, Formula, GateKind};
/// # use ftkit::FtkitError;
/// # fn main() -> Result<(), FtkitError> {
///
/// let mut def = FaultTreeDef::default();
/// def.add_basic_event("motor", None)?;
/// def.add_basic_event("switch", None)?;
/// def.add_gate(
///     "top",
///     Formula::new(GateKind::Or).with_event("motor").with_event("switch"),
/// )?;
/// def.set_top("top")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default, Debug)]
pub struct FaultTreeDef {
    events: EventSpace,
    gates: Vec<(String, Formula)>,
    gate_lookup: HashMap<String, usize>,
    top: Option<String>,
}

impl FaultTreeDef {
    /// Declare a basic event, with an optional (opaque) probability.
    pub fn add_basic_event(
        &mut self,
        name: &str,
        probability: Option<f64>,
    ) -> Result<i32, FtkitError> {
        self.check_fresh_name(name)?;
        self.events.add_basic(name, probability)
    }

    /// Declare a house event with its constant value.
    pub fn add_house_event(&mut self, name: &str, value: bool) -> Result<i32, FtkitError> {
        self.check_fresh_name(name)?;
        self.events.add_house(name, value)
    }

    /// Define a named gate.
    ///
    /// The first gate defined becomes the default top of the tree.
    pub fn add_gate(&mut self, name: &str, formula: Formula) -> Result<(), FtkitError> {
        if !crate::space::name_is_valid(name) {
            return Err(FtkitError::InvalidName(name.to_string()));
        }
        self.check_fresh_name(name)?;
        self.gate_lookup.insert(name.to_string(), self.gates.len());
        self.gates.push((name.to_string(), formula));
        if self.top.is_none() {
            self.top = Some(name.to_string());
        }
        Ok(())
    }

    fn check_fresh_name(&self, name: &str) -> Result<(), FtkitError> {
        if self.events.contains(name) || self.gate_lookup.contains_key(name) {
            return Err(FtkitError::DuplicateElement(name.to_string()));
        }
        Ok(())
    }

    /// Designate the top gate.
    pub fn set_top(&mut self, name: &str) -> Result<(), FtkitError> {
        if !self.gate_lookup.contains_key(name) {
            return Err(FtkitError::UndefinedElement {
                name: name.to_string(),
                referenced_by: "the top designation".to_string(),
            });
        }
        self.top = Some(name.to_string());
        Ok(())
    }

    /// The designated top gate, if any gate was defined.
    pub fn top(&self) -> Option<&str> {
        self.top.as_deref()
    }

    /// The declared primary events.
    pub fn events(&self) -> &EventSpace {
        &self.events
    }

    /// Iterate over the named gates in definition order.
    pub fn gates(&self) -> impl Iterator<Item = (&str, &Formula)> {
        self.gates.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Look up a gate body by name.
    pub fn gate(&self, name: &str) -> Option<&Formula> {
        self.gate_lookup.get(name).map(|&i| &self.gates[i].1)
    }

    /// Names referenced by gate bodies but not declared anywhere.
    ///
    /// The text format treats these as implicitly declared basic events;
    /// programmatic users can surface them as errors instead.
    pub fn undeclared_references(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, formula) in &self.gates {
            let mut refs = Vec::new();
            formula.collect_references(&mut refs);
            for name in refs {
                if !self.events.contains(name)
                    && !self.gate_lookup.contains_key(name)
                    && seen.insert(name.to_string())
                {
                    out.push(name.to_string());
                }
            }
        }
        out
    }

    /// Evaluate the symbolic tree under an assignment of the basic events.
    ///
    /// House events read their declared constant values. This is the
    /// reference evaluator: it walks the formulas by name and shares no
    /// code with the indexed tree.
    pub fn eval(&self, assignment: &Assignment) -> Result<bool, FtkitError> {
        let top = self.top.as_deref().ok_or(FtkitError::UndefinedElement {
            name: "top".to_string(),
            referenced_by: "the evaluation".to_string(),
        })?;
        let mut stack = Vec::new();
        self.eval_gate(top, assignment, &mut stack)
    }

    fn eval_gate(
        &self,
        name: &str,
        assignment: &Assignment,
        stack: &mut Vec<String>,
    ) -> Result<bool, FtkitError> {
        if stack.iter().any(|g| g == name) {
            return Err(FtkitError::CyclicGraph(name.to_string()));
        }
        let formula = self.gate(name).ok_or_else(|| FtkitError::UndefinedElement {
            name: name.to_string(),
            referenced_by: "the evaluation".to_string(),
        })?;
        stack.push(name.to_string());
        let value = self.eval_formula(name, formula, assignment, stack)?;
        stack.pop();
        Ok(value)
    }

    fn eval_formula(
        &self,
        gate_name: &str,
        formula: &Formula,
        assignment: &Assignment,
        stack: &mut Vec<String>,
    ) -> Result<bool, FtkitError> {
        let mut values = Vec::with_capacity(formula.arity());
        for (name, complement) in &formula.event_args {
            let value = match self.events.index_of(name) {
                Some(index) => match self.events.role_of(index) {
                    Some(EventRole::House { value }) => value,
                    _ => assignment.is_active(index),
                },
                None => self.eval_gate(name, assignment, stack)?,
            };
            values.push(value != *complement);
        }
        for f in &formula.formula_args {
            values.push(self.eval_formula(gate_name, f, assignment, stack)?);
        }

        let count = values.iter().filter(|v| **v).count();
        let value = match formula.kind {
            GateKind::And => count == values.len(),
            GateKind::Or => count > 0,
            GateKind::Xor => count == 1,
            GateKind::AtLeast => {
                let vote = formula.vote_number.ok_or(FtkitError::InvalidVoteNumber {
                    gate: gate_name.to_string(),
                    vote: 0,
                    arity: values.len(),
                })?;
                count >= vote as usize
            }
            GateKind::Not => count == 0,
            GateKind::Null => count == values.len(),
            GateKind::Nand => count < values.len(),
            GateKind::Nor => count == 0,
        };
        Ok(value)
    }
}
