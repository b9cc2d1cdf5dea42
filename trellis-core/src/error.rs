//! Error types shared by the reactive core and the reconciler.

use crate::graph::NodeId;

/// Errors raised by signals, stores, and the reconciler.
///
/// All of these are fatal to the operation that produced them. They are
/// returned before any observable mutation of the reactive graph or the
/// node tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A store was created (or replaced) with a value that is not an object or array.
    #[error("initial value of a store must be an object, got {found}")]
    InvalidInitialValue {
        /// JSON kind of the rejected value.
        found: &'static str,
    },

    /// A store write named a key its value cannot hold.
    #[error("cannot store key `{key}`: {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why the write was refused.
        reason: &'static str,
    },

    /// A plain object reached value-to-node conversion.
    #[error("objects are not valid elements")]
    InvalidRenderable,

    /// Recording a dependency would close a cycle in the graph.
    #[error("cyclic dependency through node {0}")]
    CyclicDependency(NodeId),

    /// A reconciler step would have broken one of its own guarantees.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(&'static str),
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
