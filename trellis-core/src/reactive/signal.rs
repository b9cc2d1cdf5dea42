//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value, a list
//! of listeners, and a list of attached outputs that mirror the value.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed/effect), the
//!    read is recorded as a dependency of that context.
//!
//! 2. `set` compares the new value with the current one. If it changed, the
//!    runtime recomputes everything downstream and then the signal emits.
//!
//! 3. Emitting calls every listener in registration order, then updates
//!    every attached output in registration order. Listener panics are not
//!    caught; output errors are returned to the writer.
//!
//! # Memory Layout
//!
//! Each signal is a cheap handle around an `Arc`: clones share the value,
//! the listeners, and the outputs.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{Sink, Subscriber, SubscriberId};
use crate::error::Result;
use crate::graph::NodeId;

/// The capability set shared by every readable reactive handle.
///
/// Signals, computed values, stores, and store fields all implement it, so
/// "is this a signal?" is answered by the type system: anything bounded by
/// `Observable` can be read, listened to, and rendered by a reconciler.
pub trait Observable: Clone + Send + Sync + 'static {
    type Value: Clone + Send + Sync + 'static;

    /// Stable identity of the reactive node.
    fn id(&self) -> NodeId;

    /// Read the value, recording a dependency when tracking.
    fn get(&self) -> Self::Value;

    /// Read the value without recording a dependency.
    fn get_untracked(&self) -> Self::Value;

    /// Register a listener; called with the value on every emit.
    fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&Self::Value) + Send + Sync + 'static;

    /// Register an attached output.
    fn attach(&self, sink: Arc<dyn Sink<Self::Value>>) -> SubscriberId;

    /// Remove a listener or attached output. Returns whether it was present.
    fn unsubscribe(&self, id: SubscriberId) -> bool;
}

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use trellis_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// assert!(count.set(5).unwrap());
/// assert!(!count.set(5).unwrap());
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

/// A check run against a candidate value before `set` stores it.
pub(crate) type Guard<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

struct SignalInner<T> {
    id: NodeId,
    value: RwLock<T>,
    listeners: RwLock<Vec<Subscriber<T>>>,
    outputs: RwLock<Vec<(SubscriberId, Arc<dyn Sink<T>>)>>,
    guards: RwLock<Vec<(SubscriberId, Guard<T>)>>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::forget(self.id);
    }
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_id(NodeId::new(), value)
    }

    /// Create a signal that occupies an already allocated graph node.
    pub(crate) fn with_id(id: NodeId, value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id,
                value: RwLock::new(value),
                listeners: RwLock::new(Vec::new()),
                outputs: RwLock::new(Vec::new()),
                guards: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also records the signal as
    /// a dependency of the running computation.
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value, tracking like [`Signal::get`].
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Borrow the current value without tracking.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.read())
    }

    pub(crate) fn track(&self) {
        if ReactiveContext::is_active() {
            ReactiveContext::track_dependency(self.inner.id);
        }
    }

    /// Set a new value.
    ///
    /// Returns whether the value changed. Only a change propagates and emits.
    /// A value refused by a guard leaves the signal untouched.
    pub fn set(&self, value: T) -> Result<bool> {
        self.check(&value)?;
        if !self.replace(value) {
            return Ok(false);
        }
        self.commit()?;
        Ok(true)
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&T) -> T,
    {
        let next = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(next)
    }

    /// Register a guard under `id`; `unsubscribe(id)` removes it.
    pub(crate) fn guard(&self, id: SubscriberId, guard: Guard<T>) {
        self.inner.guards.write().push((id, guard));
    }

    fn check(&self, value: &T) -> Result<()> {
        let guards: Vec<Guard<T>> = self
            .inner
            .guards
            .read()
            .iter()
            .map(|(_, guard)| Arc::clone(guard))
            .collect();
        guards.iter().try_for_each(|guard| guard(value))
    }

    /// Store `value` without notifying anyone. Returns whether it changed.
    pub(crate) fn replace(&self, value: T) -> bool {
        let mut guard = self.inner.value.write();
        if *guard == value {
            return false;
        }
        *guard = value;
        true
    }

    /// Mutate the value in place without notifying anyone.
    pub(crate) fn write_silently<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.inner.value.write())
    }

    /// Recompute downstream values, then emit.
    pub(crate) fn commit(&self) -> Result<()> {
        Runtime::propagate(self.inner.id, || self.emit())
    }

    /// Notify every listener, then every attached output.
    ///
    /// The value is re-read for each callback: a listener that writes this
    /// signal again must not have its newer value overwritten by a stale
    /// snapshot further down the list.
    pub fn emit(&self) -> Result<()> {
        let listeners = self.inner.listeners.read().clone();
        for listener in &listeners {
            listener.notify(&self.get_untracked());
        }

        let outputs: Vec<Arc<dyn Sink<T>>> = self
            .inner
            .outputs
            .read()
            .iter()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();
        for sink in outputs {
            sink.update(&self.get_untracked())?;
        }
        Ok(())
    }

    /// Register a listener callback. Returns its handle.
    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscriber = Subscriber::new(listener);
        let id = subscriber.id();
        self.inner.listeners.write().push(subscriber);
        id
    }

    /// Register an attached output. Returns its handle.
    pub fn attach(&self, sink: Arc<dyn Sink<T>>) -> SubscriberId {
        let id = SubscriberId::new();
        self.inner.outputs.write().push((id, sink));
        id
    }

    /// Remove a listener or attached output, along with any guard
    /// registered under the same handle.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut removed = false;
        self.inner.listeners.write().retain(|s| {
            let keep = s.id() != id;
            removed |= !keep;
            keep
        });
        self.inner.outputs.write().retain(|(sid, _)| {
            let keep = *sid != id;
            removed |= !keep;
            keep
        });
        self.inner.guards.write().retain(|(gid, _)| *gid != id);
        removed
    }

    /// Get the number of listeners.
    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Get the number of attached outputs.
    pub fn output_count(&self) -> usize {
        self.inner.outputs.read().len()
    }

    /// Whether two handles point at the same signal.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Observable for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn id(&self) -> NodeId {
        Signal::id(self)
    }

    fn get(&self) -> T {
        Signal::get(self)
    }

    fn get_untracked(&self) -> T {
        Signal::get_untracked(self)
    }

    fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Signal::subscribe(self, listener)
    }

    fn attach(&self, sink: Arc<dyn Sink<T>>) -> SubscriberId {
        Signal::attach(self, sink)
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        Signal::unsubscribe(self, id)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.inner.listeners.read().len())
            .field("output_count", &self.inner.outputs.read().len())
            .finish()
    }
}

/// Create a signal holding `initial`.
pub fn create_signal<T>(initial: T) -> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::new(initial)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        assert!(signal.set(42).unwrap());
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn set_reports_change() {
        let signal = Signal::new("a".to_string());
        assert!(!signal.set("a".to_string()).unwrap());
        assert!(signal.set("b".to_string()).unwrap());
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5).unwrap();
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn unchanged_value_does_not_emit() {
        let signal = Signal::new(1);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        signal.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        signal.set(2).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listeners_fire_in_registration_order_before_outputs() {
        struct Recorder(Arc<Mutex<Vec<String>>>);
        impl Sink<i32> for Recorder {
            fn update(&self, value: &i32) -> Result<()> {
                self.0.lock().push(format!("output:{value}"));
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let signal = Signal::new(0);

        signal.attach(Arc::new(Recorder(log.clone())));
        for name in ["first", "second"] {
            let log = log.clone();
            signal.subscribe(move |v| log.lock().push(format!("{name}:{v}")));
        }

        signal.set(3).unwrap();
        assert_eq!(*log.lock(), vec!["first:3", "second:3", "output:3"]);
    }

    #[test]
    fn output_errors_reach_the_writer() {
        struct Failing;
        impl Sink<i32> for Failing {
            fn update(&self, _: &i32) -> Result<()> {
                Err(Error::InvalidRenderable)
            }
        }

        let signal = Signal::new(0);
        signal.attach(Arc::new(Failing));
        assert_eq!(signal.set(1), Err(Error::InvalidRenderable));
    }

    #[test]
    fn guards_refuse_values_before_they_land() {
        let signal = Signal::new(1);
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();
        let id = signal.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        signal.guard(
            id,
            Arc::new(|v: &i32| {
                if *v < 0 {
                    Err(Error::InvariantViolation("negative"))
                } else {
                    Ok(())
                }
            }),
        );

        assert_eq!(signal.set(-1), Err(Error::InvariantViolation("negative")));
        assert_eq!(signal.update(|v| v - 5), Err(Error::InvariantViolation("negative")));
        assert_eq!(signal.get(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(signal.unsubscribe(id));
        assert!(signal.set(-1).unwrap());
        assert_eq!(signal.get(), -1);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let id = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.set(2).unwrap();
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn reentrant_set_from_listener() {
        let signal = Signal::new(0);
        let writer = signal.clone();
        signal.subscribe(move |v| {
            if *v < 3 {
                writer.set(v + 1).unwrap();
            }
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        signal.subscribe(move |v| seen_clone.lock().push(*v));

        signal.set(1).unwrap();
        assert_eq!(signal.get(), 3);
        // The innermost emit sees 3 first; outer emits re-read the value.
        assert_eq!(*seen.lock(), vec![3, 3, 3]);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42).unwrap();
        assert_eq!(signal2.get(), 42);
        assert!(signal1.ptr_eq(&signal2));
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        assert_ne!(s1.id(), s2.id());
    }
}
