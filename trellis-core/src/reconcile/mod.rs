//! Reconciliation
//!
//! The reconciler turns values into nodes and keeps rendered nodes in sync
//! with reactive sources.
//!
//! # Outputs
//!
//! A source renders into an [`Output`]: a single node, a run of sibling
//! nodes, or an attribute slot. When the source changes, the output is
//! updated in place where the node can represent the new value (text nodes
//! take new text, empty markers stay empty for `null`) and replaced
//! otherwise. Lists are reconciled position by position, then shrunk or
//! grown at the tail.
//!
//! # Guarantees
//!
//! - A rendered output is never empty; an empty value renders as an empty
//!   marker comment.
//! - New content is validated before the tree is touched, so a rejected
//!   update leaves the output as it was.
//! - A replaced node is detached and cleaned up exactly once before its
//!   replacement is inserted at the same position.

mod binding;
mod config;
mod content;

use std::sync::Arc;

use serde_json::Value;

use crate::dom::Node;
use crate::error::{Error, Result};
use crate::reactive::{Observable, Sink, SubscriberId};

pub use binding::{Binding, Mount};
pub use config::ReconcilerConfig;
pub use content::{Content, Nodes, Output};

use content::coerce;

/// Renders values into nodes and keeps them current.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: Arc<ReconcilerConfig>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Convert `content` into nodes.
    ///
    /// `null` and empty sequences become an empty marker. Sequences are
    /// flattened into a [`Output::List`]; objects are rejected with
    /// [`Error::InvalidRenderable`].
    pub fn to_node(&self, content: impl Into<Content>) -> Result<Output> {
        let content = content.into();
        content.validate()?;
        self.render(content)
    }

    /// Bring `output` in line with `content`, returning the output that now
    /// represents it.
    pub fn update(&self, output: Output, content: impl Into<Content>) -> Result<Output> {
        let content = content.into();
        content.validate()?;

        match output {
            Output::Attribute { element, name } => {
                self.update_attribute(&element, &name, &content)?;
                Ok(Output::Attribute { element, name })
            }
            Output::Single(node) => self.update_node(node, content),
            Output::List(nodes) => self.update_list(nodes, content),
        }
    }

    /// Write a primitive to an attribute, and to the matching property if
    /// the element has one. `null` removes the attribute.
    pub fn update_attribute(&self, element: &Node, name: &str, content: &Content) -> Result<()> {
        let value = match content {
            Content::Value(value) if !matches!(value, Value::Array(_) | Value::Object(_)) => value,
            _ => return Err(Error::InvalidRenderable),
        };

        if value.is_null() {
            element.remove_attribute(name);
        } else {
            element.set_attribute(name, coerce(value));
        }

        let property = self.config.property_for(name);
        if element.has_property(property) {
            element.set_property(property, value.clone());
        }
        tracing::trace!(tag = element.tag(), attribute = name, "updated attribute");
        Ok(())
    }

    /// Render `source` after a fresh marker comment and keep it updated.
    ///
    /// Nothing is inserted into a tree; see [`Reconciler::mount`].
    pub fn attach<S>(&self, source: &S) -> Result<Mount>
    where
        S: Observable,
        S::Value: Into<Content>,
    {
        let output = self.to_node(source.get_untracked())?;
        let marker = Node::comment(source.id().to_string());

        let binding = Arc::new(Binding::new(self.clone(), output));
        let sink: Arc<dyn Sink<S::Value>> = binding.clone();
        let subscription = source.attach(sink);

        let owner = source.clone();
        marker.on_cleanup(move || {
            owner.unsubscribe(subscription);
        });

        tracing::debug!(source = %source.id(), "attached output");
        Ok(Mount {
            marker,
            binding,
            subscription,
        })
    }

    /// [`Reconciler::attach`], appending the marker and the rendered nodes
    /// to `parent`.
    pub fn mount<S>(&self, parent: &Node, source: &S) -> Result<Mount>
    where
        S: Observable,
        S::Value: Into<Content>,
    {
        let mount = self.attach(source)?;
        parent.append_child(&mount.marker)?;
        for node in mount.nodes() {
            parent.append_child(&node)?;
        }
        Ok(mount)
    }

    /// Keep attribute `name` of `element` equal to `source`.
    ///
    /// Cleaning up the element unsubscribes.
    pub fn bind_attribute<S>(&self, element: &Node, name: &str, source: &S) -> Result<SubscriberId>
    where
        S: Observable,
        S::Value: Into<Content>,
    {
        self.update_attribute(element, name, &source.get_untracked().into())?;

        let output = Output::Attribute {
            element: element.clone(),
            name: name.to_string(),
        };
        let sink: Arc<dyn Sink<S::Value>> = Arc::new(Binding::new(self.clone(), output));
        let subscription = source.attach(sink);

        let owner = source.clone();
        element.on_cleanup(move || {
            owner.unsubscribe(subscription);
        });
        Ok(subscription)
    }

    /// Run the cleanup hooks of `node` and its subtree. Returns how many ran.
    pub fn cleanup(&self, node: &Node) -> usize {
        let ran = node.run_cleanups();
        if ran > 0 {
            tracing::trace!(node = ?node, hooks = ran, "cleaned up");
        }
        ran
    }

    fn render(&self, content: Content) -> Result<Output> {
        match content {
            Content::Node(node) => Ok(Output::Single(node)),
            Content::Value(Value::Null) => Ok(Output::Single(Node::marker())),
            Content::Value(Value::Object(_)) => Err(Error::InvalidRenderable),
            Content::Value(Value::Array(items)) => {
                self.render_sequence(items.into_iter().map(Content::Value))
            }
            Content::List(items) => self.render_sequence(items),
            Content::Value(value) => Ok(Output::Single(Node::text(coerce(&value)))),
        }
    }

    fn render_sequence(&self, items: impl IntoIterator<Item = Content>) -> Result<Output> {
        let mut nodes = Nodes::new();
        for item in items {
            nodes.extend(self.render(item)?.into_nodes());
        }
        if nodes.is_empty() {
            return Ok(Output::Single(Node::marker()));
        }
        Ok(Output::List(nodes))
    }

    fn update_node(&self, node: Node, content: Content) -> Result<Output> {
        if let Content::Node(next) = &content {
            if next.ptr_eq(&node) {
                return Ok(Output::Single(node));
            }
        }

        if !content.is_sequence() {
            if node.is_text() && content.is_primitive() {
                if let Content::Value(value) = &content {
                    node.set_text(coerce(value))?;
                }
                return Ok(Output::Single(node));
            }
            if node.is_empty_marker() && content.is_null() {
                return Ok(Output::Single(node));
            }
        }

        self.replace(node, content)
    }

    /// Swap `old` for the rendering of `content` at the same position.
    fn replace(&self, old: Node, content: Content) -> Result<Output> {
        let next = self.render(content)?;

        let position = old.detach();
        self.cleanup(&old);

        if let Some((parent, index)) = position {
            for (offset, node) in next.nodes().iter().enumerate() {
                parent.insert_child_at(index + offset, node)?;
            }
        }
        tracing::debug!(old = ?old, nodes = next.len(), "replaced node");
        Ok(next)
    }

    fn update_list(&self, nodes: Nodes, content: Content) -> Result<Output> {
        let items = match content.into_items() {
            Ok(items) if !items.is_empty() => items,
            Ok(_) => return self.collapse(nodes, Content::null()),
            Err(scalar) => return self.collapse(nodes, scalar),
        };

        let mut old = nodes.into_vec();
        let mut items = items;
        let shared = old.len().min(items.len());
        let surplus_old = old.split_off(shared);
        let surplus_new = items.split_off(shared);

        let mut result = Nodes::new();
        for (node, item) in old.into_iter().zip(items) {
            result.extend(self.update_node(node, item)?.into_nodes());
        }

        if !surplus_old.is_empty() {
            tracing::debug!(removed = surplus_old.len(), "shrinking node list");
        }
        for node in surplus_old {
            self.remove(&node);
        }

        if !surplus_new.is_empty() {
            tracing::debug!(added = surplus_new.len(), "growing node list");
            let mut anchor = result
                .last()
                .cloned()
                .ok_or(Error::InvariantViolation("node list output is empty"))?;
            for item in surplus_new {
                for node in self.render(item)?.into_nodes() {
                    if anchor.parent().is_some() {
                        anchor.insert_after(&node)?;
                    }
                    anchor = node.clone();
                    result.push(node);
                }
            }
        }

        if result.is_empty() {
            return Err(Error::InvariantViolation("node list output is empty"));
        }
        Ok(Output::List(result))
    }

    /// Reduce a list to its first node and update that node with `content`.
    fn collapse(&self, nodes: Nodes, content: Content) -> Result<Output> {
        let mut nodes = nodes.into_iter();
        let first = nodes
            .next()
            .ok_or(Error::InvariantViolation("node list output is empty"))?;
        for surplus in nodes {
            self.remove(&surplus);
        }
        self.update_node(first, content)
    }

    fn remove(&self, node: &Node) {
        node.detach();
        self.cleanup(node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    use crate::reactive::Signal;

    fn mounted(values: Value) -> (Reconciler, Node, Output) {
        let reconciler = Reconciler::default();
        let parent = Node::element("div");
        let output = reconciler.to_node(values).unwrap();
        for node in output.nodes() {
            parent.append_child(&node).unwrap();
        }
        (reconciler, parent, output)
    }

    #[test]
    fn to_node_shapes() {
        let reconciler = Reconciler::default();

        for empty in [json!([]), json!(null)] {
            match reconciler.to_node(empty).unwrap() {
                Output::Single(node) => assert!(node.is_empty_marker()),
                other => panic!("expected a marker, got {other:?}"),
            }
        }

        assert_eq!(
            reconciler.to_node(json!({})).unwrap_err(),
            Error::InvalidRenderable
        );

        let text = reconciler.to_node(3).unwrap();
        assert_eq!(text.nodes()[0].text_content(), "3");

        let flat = reconciler.to_node(json!([1, [2, 3], "x"])).unwrap();
        assert_eq!(flat.len(), 4);

        let node = Node::element("b");
        match reconciler.to_node(node.clone()).unwrap() {
            Output::Single(same) => assert!(same.ptr_eq(&node)),
            other => panic!("expected the node itself, got {other:?}"),
        }
    }

    #[test]
    fn list_update_with_same_values_keeps_identity() {
        let (reconciler, parent, output) = mounted(json!(["a", "b", "c"]));
        let before = output.nodes();

        let after = reconciler.update(output, json!(["a", "b", "c"])).unwrap();
        assert_eq!(after.nodes(), before);
        assert_eq!(parent.text_content(), "abc");
    }

    #[test]
    fn list_grows_at_the_tail() {
        let (reconciler, parent, output) = mounted(json!([1, 2, 3]));
        let tail = Node::element("hr");
        parent.append_child(&tail).unwrap();
        let before = output.nodes();

        let after = reconciler.update(output, json!([1, 2, 3, 4, 5])).unwrap();
        let nodes = after.nodes();
        assert_eq!(nodes.len(), 5);
        assert_eq!(&nodes[..3], &before[..]);
        assert_eq!(parent.to_html(), "12345<hr></hr>");
    }

    #[test]
    fn list_shrinks_but_never_empties() {
        let (reconciler, parent, output) = mounted(json!([1, 2, 3]));
        let first = output.nodes()[0].clone();

        let after = reconciler.update(output, json!([9])).unwrap();
        assert_eq!(after.len(), 1);
        assert!(after.nodes()[0].ptr_eq(&first));
        assert_eq!(parent.text_content(), "9");

        let empty = reconciler.update(after, json!([])).unwrap();
        assert_eq!(empty.len(), 1);
        assert!(empty.nodes()[0].is_empty_marker());
        assert_eq!(parent.child_count(), 1);
    }

    #[test]
    fn scalar_collapses_list() {
        let (reconciler, parent, output) = mounted(json!(["a", "b"]));
        let after = reconciler.update(output, "z").unwrap();
        assert!(matches!(after, Output::Single(_)));
        assert_eq!(parent.to_html(), "z");
    }

    #[test]
    fn text_updates_in_place() {
        let (reconciler, parent, output) = mounted(json!("old"));
        let node = output.nodes()[0].clone();

        let after = reconciler.update(output, 7).unwrap();
        assert!(after.nodes()[0].ptr_eq(&node));
        assert_eq!(parent.text_content(), "7");

        // Structured content replaces the text node.
        let list = reconciler.update(after, json!(["x", "y"])).unwrap();
        assert_eq!(list.len(), 2);
        assert!(node.parent().is_none());
        assert_eq!(parent.text_content(), "xy");
    }

    #[test]
    fn marker_stays_for_null() {
        let (reconciler, parent, output) = mounted(json!(null));
        let marker = output.nodes()[0].clone();

        let same = reconciler.update(output, json!(null)).unwrap();
        assert!(same.nodes()[0].ptr_eq(&marker));

        reconciler.update(same, "now").unwrap();
        assert!(marker.parent().is_none());
        assert_eq!(parent.to_html(), "now");
    }

    #[test]
    fn replacement_cleans_up_once_before_insertion() {
        let reconciler = Reconciler::default();
        let parent = Node::element("div");
        let old = Node::element("span");
        parent.append_child(&old).unwrap();

        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let watched = parent.clone();
        old.on_cleanup(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
            // Old node already detached, new one not yet inserted.
            assert_eq!(watched.child_count(), 0);
        });

        let next = reconciler
            .update(Output::Single(old), Node::element("em"))
            .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(parent.to_html(), "<em></em>");
        assert_eq!(reconciler.cleanup(&next.nodes()[0]), 0);
    }

    #[test]
    fn invalid_content_leaves_output_untouched() {
        let (reconciler, parent, output) = mounted(json!(["a", "b"]));
        let before = output.nodes();

        let err = reconciler
            .update(output.clone(), json!(["c", {"not": "renderable"}]))
            .unwrap_err();
        assert_eq!(err, Error::InvalidRenderable);
        assert_eq!(output.nodes(), before);
        assert_eq!(parent.text_content(), "ab");
    }

    #[test]
    fn identical_node_is_a_no_op() {
        let reconciler = Reconciler::default();
        let node = Node::element("p");
        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        node.on_cleanup(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let same = reconciler
            .update(Output::Single(node.clone()), node.clone())
            .unwrap();
        assert!(same.nodes()[0].ptr_eq(&node));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn attributes_sync_reflected_properties() {
        let reconciler = Reconciler::default();
        let input = Node::element("input");
        input.set_property("className", json!(""));
        let output = Output::Attribute {
            element: input.clone(),
            name: "class".into(),
        };

        let output = reconciler.update(output, "wide").unwrap();
        assert_eq!(input.attribute("class").as_deref(), Some("wide"));
        assert_eq!(input.property("className"), Some(json!("wide")));

        // No `title` property on the element, so only the attribute changes.
        let title = Output::Attribute {
            element: input.clone(),
            name: "title".into(),
        };
        reconciler.update(title, 5).unwrap();
        assert_eq!(input.attribute("title").as_deref(), Some("5"));
        assert!(!input.has_property("title"));

        reconciler.update(output.clone(), json!(null)).unwrap();
        assert!(!input.has_attribute("class"));
        assert!(reconciler.update(output, json!([1])).is_err());
    }

    #[test]
    fn mounted_signal_follows_writes_until_cleanup() {
        let reconciler = Reconciler::default();
        let parent = Node::element("p");
        let count = Signal::new(1);

        let mount = reconciler.mount(&parent, &count).unwrap();
        assert_eq!(parent.text_content(), "1");
        assert_eq!(mount.marker().to_html(), format!("<!--{}-->", count.id()));

        count.set(2).unwrap();
        assert_eq!(parent.text_content(), "2");
        assert_eq!(count.output_count(), 1);

        reconciler.cleanup(&parent);
        assert_eq!(count.output_count(), 0);
        count.set(3).unwrap();
        assert_eq!(parent.text_content(), "2");
    }

    #[test]
    fn mounted_list_signal_reconciles() {
        let reconciler = Reconciler::default();
        let parent = Node::element("ul");
        let items = Signal::new(json!(["a", "b"]));
        let mount = reconciler.mount(&parent, &items).unwrap();
        let first = mount.nodes()[0].clone();

        items.set(json!(["a", "b", "c"])).unwrap();
        assert_eq!(parent.text_content(), "abc");
        assert!(mount.nodes()[0].ptr_eq(&first));

        assert_eq!(
            items.set(json!([{"bad": true}])).unwrap_err(),
            Error::InvalidRenderable
        );
        assert_eq!(parent.text_content(), "abc");
    }

    #[test]
    fn bound_attribute_unsubscribes_on_cleanup() {
        let reconciler = Reconciler::default();
        let link = Node::element("a");
        let href = Signal::new(String::from("/home"));

        reconciler.bind_attribute(&link, "href", &href).unwrap();
        assert_eq!(link.attribute("href").as_deref(), Some("/home"));

        href.set("/about".to_string()).unwrap();
        assert_eq!(link.attribute("href").as_deref(), Some("/about"));

        reconciler.cleanup(&link);
        href.set("/gone".to_string()).unwrap();
        assert_eq!(link.attribute("href").as_deref(), Some("/about"));
    }

    #[test]
    fn custom_property_table() {
        let config =
            ReconcilerConfig::from_json(r#"{"attribute_properties": {"data-state": "state"}}"#)
                .unwrap();
        let reconciler = Reconciler::new(config);
        let el = Node::element("div");
        el.set_property("state", json!("idle"));

        reconciler
            .update_attribute(&el, "data-state", &Content::from("busy"))
            .unwrap();
        assert_eq!(el.property("state"), Some(json!("busy")));
    }
}
