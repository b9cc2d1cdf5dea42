//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! the current computation records it as a dependency.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per running computation. Entering a
//! computed value or effect pushes an entry; the guard pops it on drop, even
//! if the computation panics. Nested computations (a computed reading
//! another computed that has to initialise) get their own entries.

use std::cell::RefCell;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone)]
struct ContextEntry {
    /// The node whose computation is running.
    node_id: NodeId,
    /// Sources read so far, in first-read order, without duplicates.
    dependencies: Vec<NodeId>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    node_id: NodeId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given node.
    ///
    /// While this context is active, any signal read records itself as a
    /// dependency of `node_id`.
    pub fn enter(node_id: NodeId) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                node_id,
                dependencies: Vec::new(),
            });
        });

        Self { node_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Record a dependency on the given source.
    pub fn track_dependency(source: NodeId) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if !entry.dependencies.contains(&source) {
                    entry.dependencies.push(source);
                }
            }
        });
    }

    /// Dependencies collected so far by this context.
    pub fn dependencies(&self) -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .iter()
                .rev()
                .find(|entry| entry.node_id == self.node_id)
                .map(|entry| entry.dependencies.clone())
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.node_id, self.node_id,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.node_id, entry.node_id
                );
            }
        });
    }
}
