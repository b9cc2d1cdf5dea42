//! Bindings: attached outputs registered on a reactive source.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::content::{Content, Nodes, Output};
use super::Reconciler;
use crate::dom::Node;
use crate::error::Result;
use crate::reactive::{Sink, SubscriberId};

/// An output the reconciler keeps in sync with a source.
///
/// Each update reconciles the current output against the new value and
/// keeps whatever output results, so a binding follows its content through
/// replacements.
pub struct Binding {
    reconciler: Reconciler,
    output: Mutex<Output>,
}

impl Binding {
    pub(crate) fn new(reconciler: Reconciler, output: Output) -> Self {
        Self {
            reconciler,
            output: Mutex::new(output),
        }
    }

    /// The output as of the last update.
    pub fn output(&self) -> Output {
        self.output.lock().clone()
    }
}

impl<T> Sink<T> for Binding
where
    T: Clone + Into<Content> + Send + Sync,
{
    fn update(&self, value: &T) -> Result<()> {
        // Not held across reconciliation: cleanups may write signals.
        let current = self.output.lock().clone();
        let next = self.reconciler.update(current, value.clone())?;
        *self.output.lock() = next;
        Ok(())
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("output", &*self.output.lock())
            .finish()
    }
}

/// A source rendered after a marker comment.
///
/// Running the marker's cleanup unsubscribes the binding.
#[derive(Debug, Clone)]
pub struct Mount {
    pub(crate) marker: Node,
    pub(crate) binding: Arc<Binding>,
    pub(crate) subscription: SubscriberId,
}

impl Mount {
    pub fn marker(&self) -> &Node {
        &self.marker
    }

    pub fn output(&self) -> Output {
        self.binding.output()
    }

    /// Currently rendered nodes, marker excluded.
    pub fn nodes(&self) -> Nodes {
        self.binding.output().into_nodes()
    }

    pub fn subscription(&self) -> SubscriberId {
        self.subscription
    }
}
