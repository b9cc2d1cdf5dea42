//! Subscriber types for the reactive system.
//!
//! A subscriber is anything registered on a signal to hear about changes:
//! a plain listener callback, or an attached output that a reconciler keeps
//! in sync with the signal's value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;

/// Unique identifier for a registration on a signal.
///
/// Returned by every `subscribe`/`attach` call and accepted by `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A listener callback registered on a signal.
///
/// The callback is reference counted so a signal can snapshot its listener
/// list and release its lock before invoking anything; listeners are free to
/// write to signals, including the one that notified them.
pub struct Subscriber<T> {
    id: SubscriberId,
    notify: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T> Subscriber<T> {
    /// Create a new subscriber with the given notification callback.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Arc::new(notify),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Notify the subscriber of the current value.
    pub fn notify(&self, value: &T) {
        (self.notify)(value);
    }
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            notify: Arc::clone(&self.notify),
        }
    }
}

/// An attached output kept in sync with a signal.
///
/// Implemented by the reconciler's bindings. Unlike listeners, a sink can
/// fail (for example when the new value cannot be rendered) and the error
/// reaches whoever wrote the signal.
pub trait Sink<T>: Send + Sync {
    fn update(&self, value: &T) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_notify_passes_value() {
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();

        let subscriber = Subscriber::new(move |value: &i32| {
            seen_clone.store(*value, Ordering::SeqCst);
        });

        subscriber.notify(&7);
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        let copy = subscriber.clone();
        assert_eq!(copy.id(), subscriber.id());
        copy.notify(&9);
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }
}
