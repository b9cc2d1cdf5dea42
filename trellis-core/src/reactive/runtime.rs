//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computed
//! values, and effects. It owns the dependency graph and drives propagation
//! when a source changes.
//!
//! # How It Works
//!
//! 1. A computed value or effect runs inside a [`ReactiveContext`]; every
//!    source it reads is collected and installed as graph edges once the run
//!    finishes (`Runtime::track`).
//!
//! 2. When a source changes, `Runtime::propagate`:
//!    a. asks the graph for the downstream set in topological order,
//!    b. recomputes each node that has a changed dependency,
//!    c. emits the source to its own listeners and outputs,
//!    d. emits every recomputed node whose value changed (effects run here).
//!
//! Everything happens on the caller's stack; there is no queue and no
//! deferred work. Derived values are therefore fresh before any listener of
//! the source can observe them.
//!
//! # Thread Safety
//!
//! The tracking context is thread-local. The registry and the graph are
//! global so handles may move across threads; neither lock is held while a
//! computation or listener runs.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::context::ReactiveContext;
use crate::error::Result;
use crate::graph::{NodeId, NodeKind, UpdateScheduler};

/// A node the runtime can bring up to date.
pub trait Reactive: Send + Sync {
    /// The graph node this reactive value occupies.
    fn node_id(&self) -> NodeId;

    /// Re-evaluate after a dependency changed.
    ///
    /// Returns whether the node's observable state changed. Must not notify
    /// anyone; that happens in [`Reactive::notify`] once every node in the
    /// downstream set is fresh.
    fn recompute(&self) -> Result<bool>;

    /// Notify this node's own listeners and outputs.
    fn notify(&self) -> Result<()>;
}

/// Handle to a registered reactive value.
///
/// Dropping this handle unregisters the reactive value from the runtime.
pub struct ReactiveHandle {
    node_id: NodeId,
}

impl ReactiveHandle {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }
}

impl Drop for ReactiveHandle {
    fn drop(&mut self) {
        Runtime::unregister(self.node_id);
    }
}

/// The global reactive runtime.
pub struct Runtime;

// Weak references so that the registry never keeps a computation alive.
static REGISTRY: OnceLock<DashMap<NodeId, Weak<dyn Reactive>>> = OnceLock::new();
static GRAPH: OnceLock<Mutex<UpdateScheduler>> = OnceLock::new();

fn registry() -> &'static DashMap<NodeId, Weak<dyn Reactive>> {
    REGISTRY.get_or_init(DashMap::new)
}

fn graph() -> &'static Mutex<UpdateScheduler> {
    GRAPH.get_or_init(|| Mutex::new(UpdateScheduler::new()))
}

impl Runtime {
    /// Register a reactive value with the runtime.
    ///
    /// Returns a handle that unregisters the value when dropped.
    pub fn register(reactive: Arc<dyn Reactive>, kind: NodeKind) -> ReactiveHandle {
        let node_id = reactive.node_id();
        registry().insert(node_id, Arc::downgrade(&reactive));
        graph().lock().ensure_node(node_id, kind);
        ReactiveHandle { node_id }
    }

    fn unregister(node_id: NodeId) {
        registry().remove(&node_id);
        Self::forget(node_id);
    }

    /// Drop every edge that involves `node_id`.
    ///
    /// Called when a source is dropped or an effect is disposed.
    pub fn forget(node_id: NodeId) {
        if let Some(graph) = GRAPH.get() {
            graph.lock().remove_node(node_id);
        }
    }

    /// Run `f` as the computation of `node_id` and record what it read.
    ///
    /// The previous dependency set is replaced wholesale, so a computation
    /// that stops reading a source stops being notified by it.
    pub fn track<R>(node_id: NodeId, kind: NodeKind, f: impl FnOnce() -> R) -> Result<R> {
        let ctx = ReactiveContext::enter(node_id);
        let value = f();
        let dependencies = ctx.dependencies();
        drop(ctx);

        graph()
            .lock()
            .replace_dependencies(node_id, kind, &dependencies)?;
        Ok(value)
    }

    /// Propagate a change of `source` through the graph.
    ///
    /// `emit_source` notifies the source's own listeners and outputs; it runs
    /// after every derived value downstream has been recomputed.
    pub fn propagate<F>(source: NodeId, emit_source: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let order = match GRAPH.get() {
            Some(graph) => graph.lock().downstream(source),
            None => Vec::new(),
        };
        if order.is_empty() {
            return emit_source();
        }

        tracing::trace!(source = %source, downstream = order.len(), "propagating change");

        let mut changed_ids = HashSet::from([source]);
        let mut changed = Vec::new();

        for node_id in order {
            let stale = graph().lock().get_node(node_id).is_some_and(|node| {
                node.dependencies()
                    .iter()
                    .any(|dep| changed_ids.contains(dep))
            });
            if !stale {
                continue;
            }

            let Some(reactive) = Self::lookup(node_id) else {
                continue;
            };
            if reactive.recompute()? {
                changed_ids.insert(node_id);
                changed.push(reactive);
            }
        }

        emit_source()?;

        for reactive in changed {
            reactive.notify()?;
        }
        Ok(())
    }

    fn lookup(node_id: NodeId) -> Option<Arc<dyn Reactive>> {
        // Clone the weak pointer out first: upgrading and later dropping the
        // Arc may unregister, which needs the shard lock.
        let weak = registry().get(&node_id).map(|entry| entry.value().clone())?;
        weak.upgrade()
    }

    /// The sources `node_id` currently depends on.
    pub fn dependencies_of(node_id: NodeId) -> Vec<NodeId> {
        GRAPH
            .get()
            .and_then(|graph| {
                graph
                    .lock()
                    .get_node(node_id)
                    .map(|node| node.dependencies().iter().copied().collect())
            })
            .unwrap_or_default()
    }

    /// The nodes that currently depend on `node_id`.
    pub fn dependents_of(node_id: NodeId) -> Vec<NodeId> {
        GRAPH
            .get()
            .and_then(|graph| {
                graph
                    .lock()
                    .get_node(node_id)
                    .map(|node| node.dependents().iter().copied().collect())
            })
            .unwrap_or_default()
    }
}
