//! Named table of the primary events of a fault tree.

use crate::*;

use once_cell::sync::Lazy;
use regex::Regex;
use slab::Slab;
use std::fmt;

static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap());

/// Test if a name is usable for an event or a gate.
pub(crate) fn name_is_valid(name: &str) -> bool {
    RE_NAME.is_match(name)
}

/// The role of a primary event in the tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventRole {
    /// A random leaf variable, with an optional probability value.
    ///
    /// The probability is opaque to this crate: it is stored for external
    /// quantifiers and never interpreted here.
    Basic {
        /// Probability of occurrence, if the model provides one
        probability: Option<f64>,
    },
    /// A leaf fixed to a constant by the analyst
    House {
        /// The constant value of the event
        value: bool,
    },
}

#[derive(Clone, Debug)]
struct EventRecord {
    name: String,
    role: EventRole,
}

/// A collection of named primary events with stable integer indices.
///
/// Adding an event assigns the next free index, starting from 1 (index 0 is
/// reserved). Indices are contiguous and never reused: the gates of an
/// indexed tree start right above the last event index. Names must match
/// `[A-Za-z_][A-Za-z0-9_]*` and are unique across the collection.
///
/// ```
/// use ftkit::{EventRole, EventSpace};
/// # use ftkit::FtkitError;
/// # fn main() -> Result<(), FtkitError> {
///
/// let mut events = EventSpace::default();
/// let a = events.add_basic("pump_failure", Some(0.01))?;
/// let h = events.add_house("maintenance_mode", false)?;
///
/// assert_eq!(a, 1);
/// assert_eq!(events.index_of("maintenance_mode"), Some(h));
/// assert_eq!(events.name_of(a), Some("pump_failure"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default, Debug)]
pub struct EventSpace {
    /// Event records; slab keys are `index - 1`
    records: Slab<EventRecord>,

    /// Find an event by name
    lookup: HashMap<String, i32>,
}

impl EventSpace {
    /// Declare a basic event and return its index.
    pub fn add_basic(&mut self, name: &str, probability: Option<f64>) -> Result<i32, FtkitError> {
        self.add_event(name, EventRole::Basic { probability })
    }

    /// Declare a house event with its constant value and return its index.
    pub fn add_house(&mut self, name: &str, value: bool) -> Result<i32, FtkitError> {
        self.add_event(name, EventRole::House { value })
    }

    fn add_event(&mut self, name: &str, role: EventRole) -> Result<i32, FtkitError> {
        if !name_is_valid(name) {
            return Err(FtkitError::InvalidName(name.to_string()));
        }
        if self.lookup.contains_key(name) {
            return Err(FtkitError::DuplicateElement(name.to_string()));
        }
        let key = self.records.insert(EventRecord {
            name: name.to_string(),
            role,
        });
        let index = key as i32 + 1;
        self.lookup.insert(name.to_string(), index);
        Ok(index)
    }

    /// Retrieve the index associated to an event name.
    pub fn index_of(&self, name: &str) -> Option<i32> {
        self.lookup.get(name).copied()
    }

    /// Retrieve the name of the event at the given index.
    ///
    /// The sign of the index is ignored: both edges of an event share a name.
    pub fn name_of(&self, index: i32) -> Option<&str> {
        let key = index.unsigned_abs() as usize;
        if key == 0 {
            return None;
        }
        self.records.get(key - 1).map(|r| r.name.as_str())
    }

    /// Retrieve the role of the event at the given index.
    pub fn role_of(&self, index: i32) -> Option<EventRole> {
        let key = index.unsigned_abs() as usize;
        if key == 0 {
            return None;
        }
        self.records.get(key - 1).map(|r| r.role)
    }

    /// Test if a name is already taken by an event.
    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Number of declared events.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Return whether no event has been declared.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over `(index, name, role)` triples in index order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str, EventRole)> {
        self.records
            .iter()
            .map(|(key, r)| (key as i32 + 1, r.name.as_str(), r.role))
    }

    /// Render a signed event index, prefixing complemented events with `!`.
    pub fn format_literal(&self, f: &mut fmt::Formatter, literal: i32) -> fmt::Result {
        if literal < 0 {
            write!(f, "!")?;
        }
        match self.name_of(literal) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "_{}_", literal.abs()),
        }
    }
}
