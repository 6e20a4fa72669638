use thiserror::Error;

/// Error raised while defining, indexing or analyzing a fault tree.
#[derive(Error, Debug)]
pub enum FtkitError {
    /// The name is not usable for an event or a gate
    #[error("The name '{0}' is invalid")]
    InvalidName(String),

    /// Two events or gates share a name
    #[error("The name '{0}' is already defined")]
    DuplicateElement(String),

    /// A reference could not be resolved to a basic event, house event or gate
    #[error("'{referenced_by}' references '{name}' which is not defined")]
    UndefinedElement {
        /// The unresolved name
        name: String,
        /// The gate (or context) holding the reference
        referenced_by: String,
    },

    /// A gate transitively contains itself
    #[error("The gate '{0}' is part of a cycle")]
    CyclicGraph(String),

    /// A gate's arity is incompatible with its kind
    #[error("The gate '{gate}' is invalid: {reason}")]
    InvalidGate {
        /// The offending gate
        gate: String,
        /// What went wrong
        reason: String,
    },

    /// An ATLEAST gate carries an unusable vote number
    #[error("The gate '{gate}' has vote number {vote} for {arity} arguments")]
    InvalidVoteNumber {
        /// The offending gate
        gate: String,
        /// The declared vote number
        vote: u32,
        /// The number of arguments
        arity: usize,
    },

    /// A child index is already present in the gate
    #[error("Gate #{gate} already contains child {child}")]
    DuplicateChild {
        /// Index of the gate being edited
        gate: i32,
        /// The rejected signed child index
        child: i32,
    },

    /// The tree description could not be parsed
    #[error("Not a valid fault tree description: {0}")]
    InvalidExpression(String),

    /// The operation was aborted by the cancellation callback
    #[error("The analysis was cancelled")]
    Cancelled,

    /// A rewriting post-condition failed. This is a bug, not a user error.
    #[error("Internal invariant violation: {0}")]
    InternalInvariant(&'static str),
}
