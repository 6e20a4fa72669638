//! Find the minimal cut sets of a fault tree.
//!
//! A fault tree is a directed acyclic Boolean formula over named events:
//! [basic events](EventRole::Basic) are the random leaves, [house
//! events](EventRole::House) are leaves fixed by the analyst, and gates
//! combine them with AND, OR, XOR, ATLEAST (voting), NOT, NAND and NOR
//! connectives up to a designated top event. A *minimal cut set* is a
//! smallest conjunction of basic events whose joint occurrence implies the
//! top event.
//!
//! The crate covers the analysis core: an index-addressed [gate
//! graph](FaultTree), a [preprocessor](FaultTree::preprocess) rewriting it
//! in place (normalization to AND/OR with signed edges, constant
//! propagation of house events, complement propagation, gate coalescing
//! and independence-based module detection), and an [order-bounded cut-set
//! enumerator](FaultTree::enumerate_mcs) treating detected modules as
//! atomic pseudo-events with per-module memoization.
//!
//! # Quick start
//!
//! [analyze] runs the whole pipeline over a [symbolic tree](FaultTreeDef),
//! which can be [parsed](parse_tree) from a compact text format:
//!
//! ```
//! use ftkit::{analyze, parse_tree, Options};
//! # use ftkit::FtkitError;
//! # fn main() -> Result<(), FtkitError> {
//!
//! let def = parse_tree(
//!     "house maintenance = false\n\
//!      top := pump & (grid_loss | backup)\n\
//!      backup := diesel & !maintenance",
//! )?;
//! let report = analyze(&def, &Options::default())?;
//!
//! for cut_set in report.named_cut_sets() {
//!     println!("{}", cut_set.join(" "));
//! }
//! # assert_eq!(report.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! # Step by step
//!
//! The phases are also exposed separately, together with an
//! [evaluator](FaultTree::evaluate) usable before and after preprocessing:
//!
//! ```
//! use ftkit::{parse_tree, Assignment, FaultTree, Options};
//! use std::iter::FromIterator;
//! # use ftkit::FtkitError;
//! # fn main() -> Result<(), FtkitError> {
//!
//! let def = parse_tree("top := atleast(2; a, b, c)")?;
//! let options = Options::default();
//!
//! let mut tree = FaultTree::build(&def, &options)?;
//! let witness = Assignment::from_iter([1, 3]);
//! assert!(tree.evaluate(&witness));
//!
//! tree.preprocess(&options)?;
//! assert!(tree.evaluate(&witness)); // rewriting preserves semantics
//!
//! let cut_sets = tree.enumerate_mcs(options.order_limit)?;
//! assert_eq!(cut_sets.len(), 3); // {a,b} {a,c} {b,c}
//! # Ok(())
//! # }
//! ```
//!
//! Probability values attached to basic events are carried through
//! untouched; quantifying the cut sets is left to external tooling, which
//! can translate indices back to names through the
//! [report](McsReport::events).

mod analysis;
mod error;
mod gate;
mod mcs;
mod model;
mod parse;
mod preprocess;
mod simple;
mod space;
mod tree;

use std::collections::HashMap;
use std::fmt;

#[macro_use]
extern crate pest_derive;

// Export public structures and API
pub use analysis::{analyze, analyze_with, McsReport, Options};
pub use error::FtkitError;
pub use gate::{Gate, GateKind, GateState};
pub use mcs::CutSet;
pub use model::{FaultTreeDef, Formula};
pub use parse::parse_tree;
pub use space::{EventRole, EventSpace};
pub use tree::{Assignment, FaultTree};
