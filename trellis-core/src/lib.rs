//! Trellis Core
//!
//! This crate provides a fine-grained reactive state engine bound to a
//! tree of nodes. It implements:
//!
//! - Reactive primitives (signals, computed values, effects)
//! - Stores: lazily reactive projections over structured JSON data
//! - An in-memory node tree
//! - A reconciler that keeps rendered nodes in sync with reactive values
//!
//! Everything runs synchronously: a write recomputes derived values,
//! notifies listeners, and patches the tree before it returns.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `graph`: Dependency graph implementation
//! - `store`: Store projection and per-key fields
//! - `dom`: Element, text, and comment nodes
//! - `reconcile`: Value-to-node conversion and in-place updates
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis_core::dom::Node;
//! use trellis_core::reconcile::Reconciler;
//! use trellis_core::{create_computed, create_store};
//!
//! let store = create_store(json!({"todos": ["write", "test"]})).unwrap();
//! let todos = store.child("todos").unwrap();
//!
//! let reader = todos.clone();
//! let count = create_computed(move || reader.get().as_array().map_or(0, Vec::len)).unwrap();
//!
//! let list = Node::element("ul");
//! Reconciler::default().mount(&list, &todos).unwrap();
//!
//! todos.set(json!(["write", "test", "ship"])).unwrap();
//! assert_eq!(count.get(), 3);
//! assert_eq!(list.text_content(), "writetestship");
//! ```

pub mod dom;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod reconcile;
pub mod store;

pub use error::{Error, Result};
pub use reactive::{
    create_computed, create_effect, create_signal, Computed, Effect, Observable, Signal,
    SubscriberId,
};
pub use reconcile::{Content, Output, Reconciler, ReconcilerConfig};
pub use store::{create_store, Field, Store};
