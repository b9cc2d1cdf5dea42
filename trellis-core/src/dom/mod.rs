//! Node Tree
//!
//! An in-memory tree of element, text, and comment nodes: the rendering
//! target the reconciler keeps in sync with reactive values.
//!
//! Nodes are reference-counted handles with identity semantics. A child
//! holds a weak link to its parent, so dropping the root releases the whole
//! tree. Every node carries cleanup hooks, which the reconciler runs when it
//! releases a node; this is how bindings rooted in a subtree unsubscribe
//! from their sources.

mod node;

pub use node::Node;
