//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever one of
//! the sources it read changes.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs immediately to establish its
//!    dependencies.
//!
//! 2. When a dependency changes, the effect re-runs synchronously on the
//!    writer's stack, after the changed source and every derived value have
//!    emitted.
//!
//! 3. Each run re-collects dependencies.
//!
//! # Differences from Computed
//!
//! - Computed values produce a value; effects do not.
//! - Computed values are notified only when their result changes; effects
//!   re-run on every change of a dependency.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::runtime::{Reactive, ReactiveHandle, Runtime};
use crate::error::Result;
use crate::graph::{NodeId, NodeKind};

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let reader = count.clone();
/// let effect = Effect::new(move || {
///     let _ = reader.get();
/// })
/// .unwrap();
///
/// count.set(5).unwrap();
/// assert_eq!(effect.run_count(), 2);
/// ```
pub struct Effect {
    node: Arc<EffectNode>,
    handle: Arc<ReactiveHandle>,
}

struct EffectNode {
    id: NodeId,
    run: Box<dyn Fn() + Send + Sync>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

impl EffectNode {
    fn execute(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }
        Runtime::track(self.id, NodeKind::Effect, || (self.run)())?;
        self.run_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Reactive for EffectNode {
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn recompute(&self) -> Result<bool> {
        Ok(!self.disposed.load(Ordering::SeqCst))
    }

    fn notify(&self) -> Result<()> {
        self.execute()
    }
}

impl Effect {
    /// Create a new effect and run it once.
    pub fn new<F>(run: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute()?;
        Ok(effect)
    }

    /// Create a new effect without running it.
    ///
    /// It has no dependencies until [`Effect::execute`] is called.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let node = Arc::new(EffectNode {
            id: NodeId::new(),
            run: Box::new(run),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let handle = Runtime::register(node.clone(), NodeKind::Effect);

        Self {
            node,
            handle: Arc::new(handle),
        }
    }

    pub fn id(&self) -> NodeId {
        self.handle.node_id()
    }

    /// Run the effect now, re-collecting dependencies.
    pub fn execute(&self) -> Result<()> {
        self.node.execute()
    }

    /// Stop the effect and drop its dependency edges.
    pub fn dispose(&self) {
        self.node.disposed.store(true, Ordering::SeqCst);
        Runtime::forget(self.node.id);
    }

    pub fn is_disposed(&self) -> bool {
        self.node.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.node.run_count.load(Ordering::SeqCst)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        Runtime::dependencies_of(self.node.id).len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            handle: Arc::clone(&self.handle),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.node.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Create an effect and run it once; see [`Effect::new`].
pub fn create_effect<F>(run: F) -> Result<Effect>
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(run)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
