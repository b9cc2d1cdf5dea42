//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computed
//! values, and effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state with listeners and attached
//! outputs. Writing a different value notifies both, synchronously.
//!
//! ## Computed values
//!
//! A Computed value is a signal whose value is derived from other signals.
//! It is recomputed eagerly, before listeners of the changed source run.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs whenever a source
//! it read changes.
//!
//! # Implementation Notes
//!
//! Dependencies are discovered automatically: reads inside a computed value
//! or effect are recorded by a thread-local [`ReactiveContext`] and turned
//! into edges of the runtime's dependency graph. There is no scheduler; the
//! whole propagation runs on the stack of the call that wrote the source.

mod computed;
mod context;
mod effect;
mod runtime;
mod signal;
mod subscriber;

pub use computed::{create_computed, Computed};
pub use context::ReactiveContext;
pub use effect::{create_effect, Effect};
pub use runtime::{Reactive, ReactiveHandle, Runtime};
pub use signal::{create_signal, Observable, Signal};
pub use subscriber::{Sink, Subscriber, SubscriberId};
