//! Computed Implementation
//!
//! A Computed is a derived signal: it owns a [`Signal`] whose value is
//! produced by an updater closure over other reactive values.
//!
//! # How Computed Values Work
//!
//! 1. On creation, the updater runs inside a reactive context; every source
//!    it reads becomes a graph edge.
//!
//! 2. When a source changes, the runtime recomputes the computed value
//!    eagerly, before the source's own listeners run, so no listener can
//!    observe a stale derived value.
//!
//! 3. If the recomputed value differs from the cached one, the computed
//!    value emits to its own listeners and outputs once every other
//!    downstream node is fresh.
//!
//! Dependencies are re-collected on every run, so branches that stop reading
//! a source stop being woken by it.
//!
//! The runtime only holds a weak reference: once the last handle is
//! dropped, the computed value leaves the graph.

use std::fmt::Debug;
use std::sync::Arc;

use super::runtime::{Reactive, ReactiveHandle, Runtime};
use super::signal::{Observable, Signal};
use super::subscriber::{Sink, SubscriberId};
use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

/// A derived value that stays in sync with the signals it reads.
pub struct Computed<T> {
    node: Arc<ComputedNode<T>>,
    _handle: Arc<ReactiveHandle>,
}

struct ComputedNode<T> {
    signal: Signal<T>,
    updater: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T> Reactive for ComputedNode<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.signal.id()
    }

    fn recompute(&self) -> Result<bool> {
        let value = Runtime::track(self.signal.id(), NodeKind::Derived, || (self.updater)())?;
        Ok(self.signal.replace(value))
    }

    fn notify(&self) -> Result<()> {
        self.signal.emit()
    }
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed value from an updater closure.
    ///
    /// The updater runs immediately. Fails with
    /// [`Error::CyclicDependency`](crate::Error::CyclicDependency) if the
    /// updater reads the computed value's own node.
    pub fn new<F>(updater: F) -> Result<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let id = NodeId::new();
        let value = Runtime::track(id, NodeKind::Derived, &updater)?;

        let node = Arc::new(ComputedNode {
            signal: Signal::with_id(id, value),
            updater: Box::new(updater),
        });
        let handle = Runtime::register(node.clone(), NodeKind::Derived);

        Ok(Self {
            node,
            _handle: Arc::new(handle),
        })
    }

    pub fn id(&self) -> NodeId {
        self.node.signal.id()
    }

    /// Get the current value, tracking it as a dependency.
    pub fn get(&self) -> T {
        self.node.signal.get()
    }

    pub fn get_untracked(&self) -> T {
        self.node.signal.get_untracked()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.node.signal.subscribe(listener)
    }

    pub fn attach(&self, sink: Arc<dyn Sink<T>>) -> SubscriberId {
        self.node.signal.attach(sink)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.node.signal.unsubscribe(id)
    }

    /// The sources this value read during its last run.
    pub fn dependencies(&self) -> Vec<NodeId> {
        Runtime::dependencies_of(self.id())
    }
}

impl<T> Observable for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn id(&self) -> NodeId {
        Computed::id(self)
    }

    fn get(&self) -> T {
        Computed::get(self)
    }

    fn get_untracked(&self) -> T {
        Computed::get_untracked(self)
    }

    fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Computed::subscribe(self, listener)
    }

    fn attach(&self, sink: Arc<dyn Sink<T>>) -> SubscriberId {
        Computed::attach(self, sink)
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        Computed::unsubscribe(self, id)
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _handle: Arc::clone(&self._handle),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("signal", &self.node.signal)
            .finish()
    }
}

/// Create a computed value; see [`Computed::new`].
pub fn create_computed<T, F>(updater: F) -> Result<Computed<T>>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(updater)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
