//! Stores
//!
//! A Store is a reactive projection over a structured JSON value (object or
//! array). It behaves like a signal for the whole value and hands out a
//! reactive [`Field`] per key on demand.
//!
//! # Materialization
//!
//! Keys are backed by nothing until first accessed through
//! [`Store::child`]. At that point a structured entry becomes a nested
//! store and a primitive entry becomes a signal. The new handle is cached,
//! and a write-back path keeps the parent's raw value (and every ancestor's)
//! equal to the child's value whenever the child is written directly.
//!
//! # Writes
//!
//! [`Store::set`] stores the new value, then walks materialized children and
//! delegates to them, so handles captured before the write observe the new
//! entries. It then compares every key of the new value against the previous
//! value, catching changes to keys nobody materialized. The store emits once
//! if anything changed.
//!
//! Keyed writes are checked against the value before anything changes: an
//! array takes only canonical indices and a whole-number `length`, and never
//! grows past a fixed cap. A refused write surfaces as
//! [`Error::InvalidKey`], including writes made directly through a child
//! handle.
//!
//! The raw value must only be changed through the store; mutating a clone
//! obtained from `get` has no effect on the store.

mod field;
mod keys;

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::graph::NodeId;
use crate::reactive::{Observable, Signal, Sink, SubscriberId};

pub use field::Field;
use keys::{check_write, entry, has_own, is_structured, kind_of, own_keys, write_own};

/// A reactive projection over an object or array.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    signal: Signal<Value>,
    children: RwLock<IndexMap<String, Child>>,
    /// Stores that hold this one as a child, and under which key.
    parents: RwLock<Vec<ParentLink>>,
}

struct Child {
    field: Field,
    /// Write-back registration: a listener on a signal child, a parent link
    /// on a store child.
    writeback: SubscriberId,
}

struct ParentLink {
    id: SubscriberId,
    parent: Weak<StoreInner>,
    key: String,
}

impl Store {
    /// Create a store over `value`.
    ///
    /// Fails with [`Error::InvalidInitialValue`] unless `value` is an object
    /// or an array.
    pub fn new(value: Value) -> Result<Self> {
        ensure_structured(&value)?;
        Ok(Self::from_structured(value))
    }

    pub(crate) fn from_structured(value: Value) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                signal: Signal::new(value),
                children: RwLock::new(IndexMap::new()),
                parents: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.signal.id()
    }

    /// The whole value, tracked as a dependency.
    pub fn get(&self) -> Value {
        self.inner.signal.get()
    }

    pub fn get_untracked(&self) -> Value {
        self.inner.signal.get_untracked()
    }

    /// Borrow the whole value, tracked as a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        self.inner.signal.with(f)
    }

    /// Reactive handle for `key`, materializing it on first access.
    ///
    /// Returns `None` if the underlying value does not own `key`.
    pub fn child(&self, key: &str) -> Option<Field> {
        if let Some(child) = self.inner.children.read().get(key) {
            return Some(child.field.clone());
        }

        let value = self
            .inner
            .signal
            .with_untracked(|raw| entry(raw, key).map(|value| value.into_owned()))?;
        let field = Field::materialize(value);
        tracing::trace!(store = %self.id(), key, store_child = field.is_store(), "materialized field");

        self.adopt(key, field.clone());
        Some(field)
    }

    /// Array convenience for [`Store::child`].
    pub fn at(&self, index: usize) -> Option<Field> {
        self.child(&index.to_string())
    }

    /// Keys that currently have a materialized handle.
    pub fn keys(&self) -> Vec<String> {
        self.inner.children.read().keys().cloned().collect()
    }

    /// Write `value` under `key`.
    ///
    /// A materialized handle receives the value through its own `set`;
    /// otherwise a new handle is created for it. The store emits afterwards
    /// even when the handle reported no change. Returns whether the entry
    /// changed.
    ///
    /// Fails with [`Error::InvalidKey`], leaving the store untouched, if the
    /// value cannot hold `key`.
    pub fn assign(&self, key: &str, value: Value) -> Result<bool> {
        self.inner.check(key, &value)?;
        let changed = match self.field(key) {
            Some(field) if field.accepts(&value) => field.set(value)?,
            _ => {
                self.inner.write_raw(key, value.clone())?;
                self.adopt(key, Field::materialize(value));
                true
            }
        };

        self.inner.signal.commit()?;
        Ok(changed)
    }

    /// Write a reactive handle under `key`.
    ///
    /// If `key` is already materialized, the handle is unwrapped and its
    /// current value written through the existing child. Otherwise the
    /// handle itself becomes the child, aliasing it into this store.
    pub fn assign_field(&self, key: &str, field: Field) -> Result<bool> {
        let value = field.get_untracked();
        self.inner.check(key, &value)?;
        let changed = match self.field(key) {
            Some(existing) if existing.accepts(&value) => existing.set(value)?,
            _ => {
                self.inner.write_raw(key, value)?;
                self.adopt(key, field);
                true
            }
        };

        self.inner.signal.commit()?;
        Ok(changed)
    }

    /// Replace the whole value.
    ///
    /// Fails with [`Error::InvalidInitialValue`], before touching anything,
    /// unless `next` is an object or an array. Returns whether anything
    /// changed; the store emits exactly once in that case.
    pub fn set(&self, next: Value) -> Result<bool> {
        ensure_structured(&next)?;

        let previous = self
            .inner
            .signal
            .write_silently(|raw| std::mem::replace(raw, next.clone()));
        self.inner.sync_parents();
        let mut changed = false;

        // Existing handles pick up the new entries.
        let materialized: Vec<(String, Field)> = self
            .inner
            .children
            .read()
            .iter()
            .map(|(key, child)| (key.clone(), child.field.clone()))
            .collect();

        for (key, field) in materialized {
            match entry(&next, &key) {
                Some(value) if field.accepts(&value) => {
                    changed |= field.set(value.into_owned())?;
                }
                _ => {
                    self.release(&key);
                    changed = true;
                }
            }
        }

        // Entries nobody materialized.
        if !changed {
            changed = own_keys(&next)
                .iter()
                .any(|key| entry(&previous, key) != entry(&next, key))
                || own_keys(&previous).iter().any(|key| !has_own(&next, key));
        }

        if changed {
            self.inner.signal.commit()?;
        }
        Ok(changed)
    }

    /// Replace the whole value with a function of the current one.
    pub fn update<F>(&self, f: F) -> Result<bool>
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = self.inner.signal.with_untracked(f);
        self.set(next)
    }

    /// Notify listeners and attached outputs with the current value.
    pub fn emit(&self) -> Result<()> {
        self.inner.signal.emit()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.signal.subscribe(listener)
    }

    pub fn attach(&self, sink: Arc<dyn Sink<Value>>) -> SubscriberId {
        self.inner.signal.attach(sink)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.signal.unsubscribe(id)
    }

    /// Whether two handles point at the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn field(&self, key: &str) -> Option<Field> {
        self.inner
            .children
            .read()
            .get(key)
            .map(|child| child.field.clone())
    }

    /// Cache `field` as the child for `key`, replacing any previous child.
    fn adopt(&self, key: &str, field: Field) {
        self.release(key);

        let parent: Weak<StoreInner> = Arc::downgrade(&self.inner);
        let writeback = match &field {
            Field::Signal(signal) => {
                let (guard_parent, guard_key) = (parent.clone(), key.to_string());
                let owned_key = key.to_string();
                let id = signal.subscribe(move |value| {
                    if let Some(parent) = parent.upgrade() {
                        parent.write_back(&owned_key, value.clone());
                    }
                });
                signal.guard(
                    id,
                    Arc::new(move |value: &Value| match guard_parent.upgrade() {
                        Some(parent) => parent.check(&guard_key, value),
                        None => Ok(()),
                    }),
                );
                id
            }
            Field::Store(store) => {
                let id = SubscriberId::new();
                store.inner.parents.write().push(ParentLink {
                    id,
                    parent,
                    key: key.to_string(),
                });
                id
            }
        };

        self.inner
            .children
            .write()
            .insert(key.to_string(), Child { field, writeback });
    }

    /// Drop the child for `key` and detach it from this store.
    fn release(&self, key: &str) {
        let removed = self.inner.children.write().shift_remove(key);
        if let Some(child) = removed {
            match &child.field {
                Field::Signal(signal) => {
                    signal.unsubscribe(child.writeback);
                }
                Field::Store(store) => {
                    store
                        .inner
                        .parents
                        .write()
                        .retain(|link| link.id != child.writeback);
                }
            }
        }
    }
}

impl StoreInner {
    /// Whether `value` can be written under `key` right now.
    fn check(&self, key: &str, value: &Value) -> Result<()> {
        self.signal.with_untracked(|raw| check_write(raw, key, value))
    }

    /// Store `value` under `key` without emitting, then carry the change to
    /// every store that holds this one.
    fn write_raw(&self, key: &str, value: Value) -> Result<()> {
        self.signal.write_silently(|raw| write_own(raw, key, value))?;
        self.sync_parents();
        Ok(())
    }

    /// [`StoreInner::write_raw`] from a listener, where a refusal can only
    /// be logged.
    fn write_back(&self, key: &str, value: Value) {
        if let Err(error) = self.write_raw(key, value) {
            tracing::warn!(store = %self.signal.id(), key, %error, "write-back refused");
        }
    }

    fn sync_parents(&self) {
        let links: Vec<(Weak<StoreInner>, String)> = self
            .parents
            .read()
            .iter()
            .map(|link| (link.parent.clone(), link.key.clone()))
            .collect();
        if links.is_empty() {
            return;
        }

        let value = self.signal.get_untracked();
        for (parent, key) in links {
            if let Some(parent) = parent.upgrade() {
                parent.write_back(&key, value.clone());
            }
        }
    }
}

fn ensure_structured(value: &Value) -> Result<()> {
    if is_structured(value) {
        Ok(())
    } else {
        Err(Error::InvalidInitialValue {
            found: kind_of(value),
        })
    }
}

impl Observable for Store {
    type Value = Value;

    fn id(&self) -> NodeId {
        Store::id(self)
    }

    fn get(&self) -> Value {
        Store::get(self)
    }

    fn get_untracked(&self) -> Value {
        Store::get_untracked(self)
    }

    fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        Store::subscribe(self, listener)
    }

    fn attach(&self, sink: Arc<dyn Sink<Value>>) -> SubscriberId {
        Store::attach(self, sink)
    }

    fn unsubscribe(&self, id: SubscriberId) -> bool {
        Store::unsubscribe(self, id)
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id())
            .field("value", &self.get_untracked())
            .field("materialized", &self.keys())
            .finish()
    }
}

/// Create a store over `initial`; see [`Store::new`].
pub fn create_store(initial: Value) -> Result<Store> {
    Store::new(initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter(store: &Store) -> Arc<AtomicI32> {
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        store.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn rejects_non_structured_values() {
        assert_eq!(
            Store::new(json!(0)).unwrap_err(),
            Error::InvalidInitialValue { found: "number" }
        );
        assert!(Store::new(json!(null)).is_err());
        assert!(Store::new(json!("text")).is_err());

        let store = Store::new(json!({})).unwrap();
        assert!(store.set(json!(true)).is_err());
        assert_eq!(store.get(), json!({}));
    }

    #[test]
    fn children_materialize_lazily_and_are_cached() {
        let store = Store::new(json!({"counter": {"value": 0}, "name": "x"})).unwrap();
        assert!(store.keys().is_empty());

        let counter = store.child("counter").unwrap();
        assert!(counter.is_store());
        let value = counter.child("value").unwrap();
        assert!(!value.is_store());
        assert_eq!(value.get(), json!(0));

        assert!(store.child("counter").unwrap().same(&counter));
        assert_eq!(store.keys(), vec!["counter"]);
        assert!(store.child("missing").is_none());
    }

    #[test]
    fn whole_store_writes_reach_captured_children() {
        let store = Store::new(json!({"key": "value"})).unwrap();
        let key = store.child("key").unwrap();

        assert!(store.set(json!({"key": "baz"})).unwrap());
        assert_eq!(key.get(), json!("baz"));
    }

    #[test]
    fn child_writes_reach_parent_value() {
        let store = Store::new(json!({"key": "value"})).unwrap();
        let alias = store.child("key").unwrap();

        store.child("key").unwrap().set(json!("42")).unwrap();
        assert_eq!(store.get()["key"], json!("42"));
        assert_eq!(alias.get(), json!("42"));
    }

    #[test]
    fn nested_writes_reach_every_level() {
        let store = Store::new(json!({"a": {"b": {"c": 1}}})).unwrap();
        let c = store
            .child("a")
            .and_then(|a| a.child("b"))
            .and_then(|b| b.child("c"))
            .unwrap();

        c.set(json!(2)).unwrap();
        assert_eq!(store.get(), json!({"a": {"b": {"c": 2}}}));
    }

    #[test]
    fn array_length_is_reactive() {
        let store = Store::new(json!([0, 1, 2])).unwrap();
        let length = store.child("length").unwrap();
        assert_eq!(length.get(), json!(3));

        store
            .update(|arr| {
                let mut items = arr.as_array().cloned().unwrap_or_default();
                let len = items.len();
                items.push(json!(len));
                Value::Array(items)
            })
            .unwrap();

        assert_eq!(length.get(), json!(4));
        assert_eq!(store.at(3).unwrap().get(), json!(3));
    }

    #[test]
    fn set_emits_once_and_reports_change() {
        let store = Store::new(json!({"a": 1, "b": 2})).unwrap();
        let _a = store.child("a").unwrap();
        let emits = counter(&store);

        assert!(!store.set(json!({"a": 1, "b": 2})).unwrap());
        assert_eq!(emits.load(Ordering::SeqCst), 0);

        // Only an unmaterialized key changes.
        assert!(store.set(json!({"a": 1, "b": 3})).unwrap());
        assert_eq!(emits.load(Ordering::SeqCst), 1);

        // An unmaterialized key disappears.
        assert!(store.set(json!({"a": 1})).unwrap());
        assert_eq!(emits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn removed_keys_drop_their_child() {
        let store = Store::new(json!({"a": 1, "b": 2})).unwrap();
        let a = store.child("a").unwrap();

        assert!(store.set(json!({"b": 2})).unwrap());
        assert!(store.keys().is_empty());
        assert!(store.child("a").is_none());

        // The dropped handle no longer writes into the store.
        a.set(json!(9)).unwrap();
        assert_eq!(store.get(), json!({"b": 2}));
    }

    #[test]
    fn kind_changes_replace_the_child() {
        let store = Store::new(json!({"a": {"x": 1}})).unwrap();
        let old = store.child("a").unwrap();

        assert!(store.set(json!({"a": 5})).unwrap());
        let new = store.child("a").unwrap();
        assert!(!new.is_store());
        assert!(!new.same(&old));
        assert_eq!(new.get(), json!(5));
    }

    #[test]
    fn assign_always_emits() {
        let store = Store::new(json!({"a": 1})).unwrap();
        let a = store.child("a").unwrap();
        let emits = counter(&store);

        assert!(!store.assign("a", json!(1)).unwrap());
        assert_eq!(emits.load(Ordering::SeqCst), 1);

        assert!(store.assign("a", json!(2)).unwrap());
        assert_eq!(a.get(), json!(2));
        assert_eq!(emits.load(Ordering::SeqCst), 2);

        assert!(store.assign("fresh", json!({"deep": true})).unwrap());
        assert!(store.child("fresh").unwrap().is_store());
        assert_eq!(store.get(), json!({"a": 2, "fresh": {"deep": true}}));
    }

    #[test]
    fn assign_field_aliases_or_unwraps() {
        let store = Store::new(json!({"a": 1})).unwrap();
        let shared = Field::Signal(Signal::new(json!("shared")));

        store.assign_field("b", shared.clone()).unwrap();
        assert!(store.child("b").unwrap().same(&shared));
        shared.set(json!("changed")).unwrap();
        assert_eq!(store.get()["b"], json!("changed"));

        let a = store.child("a").unwrap();
        store.assign_field("a", shared.clone()).unwrap();
        assert!(store.child("a").unwrap().same(&a));
        assert_eq!(a.get(), json!("changed"));
    }

    #[test]
    fn array_writes_through_length() {
        let store = Store::new(json!([1, 2, 3])).unwrap();
        store.child("length").unwrap().set(json!(1)).unwrap();
        assert_eq!(store.get(), json!([1]));
    }

    #[test]
    fn out_of_range_index_is_refused() {
        let store = Store::new(json!([1, 2])).unwrap();
        let emits = counter(&store);

        let err = store.assign("18446744073709551615", json!(9)).unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
        assert_eq!(store.get(), json!([1, 2]));
        assert!(store.keys().is_empty());
        assert_eq!(emits.load(Ordering::SeqCst), 0);

        let huge = (keys::MAX_ARRAY_LEN + 5).to_string();
        assert!(store.assign(&huge, json!(0)).is_err());
        assert_eq!(store.get(), json!([1, 2]));
    }

    #[test]
    fn oversized_length_leaves_child_and_store_alone() {
        let store = Store::new(json!([1, 2])).unwrap();
        let length = store.child("length").unwrap();
        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();
        length.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        for bad in [json!(u64::MAX), json!(-1), json!("three")] {
            assert!(matches!(length.set(bad), Err(Error::InvalidKey { .. })));
        }
        assert_eq!(length.get(), json!(2));
        assert_eq!(store.get(), json!([1, 2]));
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        assert!(length.set(json!(3)).unwrap());
        assert_eq!(store.get(), json!([1, 2, null]));
    }

    #[test]
    fn named_keys_on_arrays_are_refused() {
        let store = Store::new(json!([1, 2])).unwrap();

        assert!(matches!(
            store.assign("name", json!("x")),
            Err(Error::InvalidKey { reason: "not an array index", .. })
        ));
        assert!(store
            .assign_field("name", Field::Signal(Signal::new(json!("x"))))
            .is_err());
        assert!(store.keys().is_empty());
        assert!(store.child("name").is_none());
        assert!(!store.set(json!([1, 2])).unwrap());
    }

    #[test]
    fn array_can_become_an_object_with_length() {
        let store = Store::new(json!([1, 2])).unwrap();
        let length = store.child("length").unwrap();

        assert!(store.set(json!({"length": 99_999_999_999u64})).unwrap());
        assert_eq!(length.get(), json!(99_999_999_999u64));
        assert_eq!(store.get(), json!({"length": 99_999_999_999u64}));
    }
}
