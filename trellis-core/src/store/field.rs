//! Store fields: the reactive handle behind one key of a store.

use std::sync::Arc;

use serde_json::Value;

use super::keys::is_structured;
use super::Store;
use crate::error::Result;
use crate::graph::NodeId;
use crate::reactive::{Observable, Signal, Sink, SubscriberId};

/// A materialized store entry.
///
/// Primitive entries are backed by a [`Signal`], structured entries by a
/// nested [`Store`]. Both expose the same read/write/child surface, so code
/// walking a store never needs to know which one it holds.
#[derive(Clone, Debug)]
pub enum Field {
    Signal(Signal<Value>),
    Store(Store),
}

impl Field {
    /// Build the right kind of handle for `value`.
    pub(crate) fn materialize(value: Value) -> Self {
        if is_structured(&value) {
            Field::Store(Store::from_structured(value))
        } else {
            Field::Signal(Signal::new(value))
        }
    }

    /// Whether `value` can be written through this handle without changing
    /// its kind.
    pub(crate) fn accepts(&self, value: &Value) -> bool {
        match self {
            Field::Signal(_) => !is_structured(value),
            Field::Store(_) => is_structured(value),
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            Field::Signal(signal) => signal.id(),
            Field::Store(store) => store.id(),
        }
    }

    pub fn get(&self) -> Value {
        match self {
            Field::Signal(signal) => signal.get(),
            Field::Store(store) => store.get(),
        }
    }

    pub fn get_untracked(&self) -> Value {
        match self {
            Field::Signal(signal) => signal.get_untracked(),
            Field::Store(store) => store.get_untracked(),
        }
    }

    /// Write through the handle. A store field rejects primitives.
    pub fn set(&self, value: Value) -> Result<bool> {
        match self {
            Field::Signal(signal) => signal.set(value),
            Field::Store(store) => store.set(value),
        }
    }

    pub fn update<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        match self {
            Field::Signal(signal) => signal.update(f),
            Field::Store(store) => store.update(f),
        }
    }

    /// Reactive access to a nested key. Primitive fields have no children.
    pub fn child(&self, key: &str) -> Option<Field> {
        match self {
            Field::Signal(_) => None,
            Field::Store(store) => store.child(key),
        }
    }

    /// Every field is a signal-capable handle.
    pub fn is_signal(&self) -> bool {
        true
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Field::Store(_))
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        match self {
            Field::Signal(signal) => signal.subscribe(listener),
            Field::Store(store) => store.subscribe(listener),
        }
    }

    pub fn attach(&self, sink: Arc<dyn Sink<Value>>) -> SubscriberId {
        match self {
            Field::Signal(signal) => signal.attach(sink),
            Field::Store(store) => store.attach(sink),
        }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        match self {
            Field::Signal(signal) => signal.unsubscribe(id),
            Field::Store(store) => store.unsubscribe(id),
        }
    }

    /// Whether both handles refer to the same reactive node.
    pub fn same(&self, other: &Field) -> bool {
        self.id() == other.id()
    }
}

impl Observable for Field {
    type Value = Value;

    fn id(&self) -> NodeId {
        Field::id(self)
    }

    fn get(&self) -> Value {
        Field::get(self)
    }

    fn get_untracked(&self) -> Value {
        Field::get_untracked(self)
    }

    fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Field::subscribe(self, listener)
    }

    fn attach(&self, sink: Arc<dyn Sink<Value>>) -> SubscriberId {
        Field::attach(self, sink)
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        Field::unsubscribe(self, id)
    }
}

impl From<Signal<Value>> for Field {
    fn from(signal: Signal<Value>) -> Self {
        Field::Signal(signal)
    }
}

impl From<Store> for Field {
    fn from(store: Store) -> Self {
        Field::Store(store)
    }
}
