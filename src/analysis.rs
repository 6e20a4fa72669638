//! Analysis configuration, the end-to-end driver and the report.

use crate::*;

use delegate::delegate;
use log::debug;
use std::collections::BTreeSet;

/// Configuration of an analysis run.
///
/// No configuration file and no environment variables are consulted: this
/// struct is the whole surface.
#[derive(Clone, Debug)]
pub struct Options {
    /// Maximum size of any returned cut set
    pub order_limit: usize,

    /// House events forced to true, overriding their declared values
    pub true_house_events: BTreeSet<String>,

    /// House events forced to false, overriding their declared values
    pub false_house_events: BTreeSet<String>,

    /// Hint that the tree is coherent (no negation anywhere), allowing the
    /// preprocessor to skip complement propagation. The hint is verified
    /// against the indexed tree and ignored when it does not hold.
    pub assume_coherent: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            order_limit: 20,
            true_house_events: BTreeSet::new(),
            false_house_events: BTreeSet::new(),
            assume_coherent: false,
        }
    }
}

/// The outcome of a minimal-cut-set analysis.
///
/// Carries the cut sets (ordered by size, then lexicographically) together
/// with the event table needed to translate indices back to names.
#[derive(Clone, Debug)]
pub struct McsReport {
    cut_sets: Vec<CutSet>,
    events: EventSpace,
}

impl McsReport {
    /// The minimal cut sets, as sets of signed event indices.
    pub fn cut_sets(&self) -> &[CutSet] {
        &self.cut_sets
    }

    /// The event table of the analyzed tree.
    pub fn events(&self) -> &EventSpace {
        &self.events
    }

    delegate! {
        to self.cut_sets {
            /// Number of minimal cut sets
            pub fn len(&self) -> usize;

            /// True when no cut set was found
            pub fn is_empty(&self) -> bool;

            /// Iterate over the cut sets
            pub fn iter(&self) -> std::slice::Iter<'_, CutSet>;
        }
    }

    /// Translate every cut set back to event names.
    ///
    /// Complemented events are prefixed with `!`.
    pub fn named_cut_sets(&self) -> Vec<Vec<String>> {
        self.cut_sets
            .iter()
            .map(|set| {
                set.basic_events()
                    .map(|literal| {
                        let name = self
                            .events
                            .name_of(literal)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("_{}_", literal.abs()));
                        if literal < 0 {
                            format!("!{}", name)
                        } else {
                            name
                        }
                    })
                    .collect()
            })
            .collect()
    }

    /// Number of cut sets of each order, in ascending order.
    pub fn order_distribution(&self) -> Vec<(usize, usize)> {
        let mut distribution: Vec<(usize, usize)> = Vec::new();
        for set in &self.cut_sets {
            match distribution.last_mut() {
                Some((order, count)) if *order == set.order() => *count += 1,
                _ => distribution.push((set.order(), 1)),
            }
        }
        distribution
    }
}

impl fmt::Display for McsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for set in &self.cut_sets {
            let mut first = true;
            write!(f, "{{")?;
            for literal in set.basic_events() {
                if !first {
                    write!(f, ", ")?;
                }
                first = false;
                self.events.format_literal(f, literal)?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

/// Run the whole pipeline: index, preprocess, enumerate.
///
/// ```
/// use ftkit::{analyze, parse_tree, Options};
/// # use ftkit::FtkitError;
/// # fn main() -> Result<(), FtkitError> {
///
/// let def = parse_tree("top := pump & (valve_a | valve_b)")?;
/// let report = analyze(&def, &Options::default())?;
/// assert_eq!(report.len(), 2);
/// # Ok(())
/// # }
/// ```
pub fn analyze(def: &FaultTreeDef, options: &Options) -> Result<McsReport, FtkitError> {
    analyze_with(def, options, None)
}

/// Run the whole pipeline with a cancellation callback.
///
/// The callback is polled between preprocessing passes and between module
/// expansions; a `true` return aborts with [FtkitError::Cancelled] without
/// leaving any observable state behind.
pub fn analyze_with(
    def: &FaultTreeDef,
    options: &Options,
    cancel: Option<&dyn Fn() -> bool>,
) -> Result<McsReport, FtkitError> {
    debug!("indexing the fault tree");
    let mut tree = FaultTree::build(def, options)?;
    tree.preprocess_with(options, cancel)?;
    let cut_sets = tree.enumerate_mcs_with(options.order_limit, cancel)?;
    Ok(McsReport {
        cut_sets,
        events: def.events().clone(),
    })
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn named(text: &str, options: &Options) -> Result<Vec<Vec<String>>, FtkitError> {
        Ok(analyze(&parse_tree(text)?, options)?.named_cut_sets())
    }

    fn sets(names: &[&[&str]]) -> Vec<Vec<String>> {
        names
            .iter()
            .map(|s| s.iter().map(|n| n.to_string()).collect())
            .collect()
    }

    #[test]
    fn simple_disjunction() -> Result<(), FtkitError> {
        let result = named("top := a | b", &Options::default())?;
        assert_eq!(result, sets(&[&["a"], &["b"]]));
        Ok(())
    }

    #[test]
    fn conjunction_with_alternatives() -> Result<(), FtkitError> {
        let result = named("top := a & (b | c)", &Options::default())?;
        assert_eq!(result, sets(&[&["a", "b"], &["a", "c"]]));
        Ok(())
    }

    #[test]
    fn exclusive_or() -> Result<(), FtkitError> {
        let mut options = Options::default();
        options.order_limit = 2;
        let result = named("top := xor(a, b)", &options)?;
        assert_eq!(result, sets(&[&["!b", "a"], &["!a", "b"]]));
        Ok(())
    }

    #[test]
    fn voting_gate() -> Result<(), FtkitError> {
        let result = named("top := atleast(2; a, b, c)", &Options::default())?;
        assert_eq!(result, sets(&[&["a", "b"], &["a", "c"], &["b", "c"]]));
        Ok(())
    }

    #[test]
    fn fixed_house_event() -> Result<(), FtkitError> {
        let result = named(
            "house h = true\ntop := h & (a | b)",
            &Options::default(),
        )?;
        assert_eq!(result, sets(&[&["a"], &["b"]]));
        Ok(())
    }

    #[test]
    fn shared_subtree() -> Result<(), FtkitError> {
        let result = named("top := (a | b) & (a | c)", &Options::default())?;
        assert_eq!(result, sets(&[&["a"], &["b", "c"]]));
        Ok(())
    }

    #[test]
    fn house_override_flips_the_result() -> Result<(), FtkitError> {
        let text = "house h = true\ntop := h & a";
        assert_eq!(named(text, &Options::default())?, sets(&[&["a"]]));

        let mut options = Options::default();
        options.false_house_events.insert("h".to_string());
        assert_eq!(named(text, &options)?, sets(&[]));
        Ok(())
    }

    #[test]
    fn report_surface() -> Result<(), FtkitError> {
        let def = parse_tree("top := (a & b) | c")?;
        let report = analyze(&def, &Options::default())?;

        assert_eq!(report.len(), 2);
        assert_eq!(report.order_distribution(), vec![(1, 1), (2, 1)]);
        let rendered = format!("{}", report);
        assert_eq!(rendered, "{c}\n{a, b}\n");
        Ok(())
    }

    #[test]
    fn cancellation_propagates() -> Result<(), FtkitError> {
        let def = parse_tree("top := a & (b | c)")?;
        let cancel = || true;
        assert!(matches!(
            analyze_with(&def, &Options::default(), Some(&cancel)),
            Err(FtkitError::Cancelled)
        ));
        Ok(())
    }

    #[test]
    fn repeated_runs_are_identical() -> Result<(), FtkitError> {
        let text = "top := g | atleast(2; c, d, e) | (a & !d)\ng := xor(a, b)";
        let first = named(text, &Options::default())?;
        let second = named(text, &Options::default())?;
        assert_eq!(first, second);
        Ok(())
    }
}
