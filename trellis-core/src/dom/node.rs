//! Tree nodes.

use std::fmt;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::error::{Error, Result};

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeType {
    Element,
    Text,
    Comment,
}

type Cleanup = Box<dyn FnOnce() + Send>;

/// A handle to a node in a tree.
///
/// Clones share the node; equality is identity, as with DOM nodes.
#[derive(Clone)]
pub struct Node(Arc<NodeData>);

struct NodeData {
    kind: NodeType,
    tag: String,
    /// Text of a text node, data of a comment.
    data: RwLock<String>,
    attributes: RwLock<IndexMap<String, String>>,
    properties: RwLock<IndexMap<String, Value>>,
    parent: RwLock<Weak<NodeData>>,
    children: RwLock<Vec<Node>>,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl Node {
    fn with_kind(kind: NodeType, tag: &str, data: String) -> Self {
        Self(Arc::new(NodeData {
            kind,
            tag: tag.to_string(),
            data: RwLock::new(data),
            attributes: RwLock::new(IndexMap::new()),
            properties: RwLock::new(IndexMap::new()),
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
        }))
    }

    pub fn element(tag: &str) -> Self {
        Self::with_kind(NodeType::Element, tag, String::new())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_kind(NodeType::Text, "#text", text.into())
    }

    pub fn comment(data: impl Into<String>) -> Self {
        Self::with_kind(NodeType::Comment, "#comment", data.into())
    }

    /// A placeholder standing for "nothing rendered": an empty comment.
    pub fn marker() -> Self {
        Self::comment(String::new())
    }

    /// Tag name of an element, `#text` or `#comment` otherwise.
    pub fn tag(&self) -> &str {
        &self.0.tag
    }

    pub fn is_element(&self) -> bool {
        self.0.kind == NodeType::Element
    }

    pub fn is_text(&self) -> bool {
        self.0.kind == NodeType::Text
    }

    pub fn is_comment(&self) -> bool {
        self.0.kind == NodeType::Comment
    }

    pub fn is_empty_marker(&self) -> bool {
        self.is_comment() && self.0.data.read().is_empty()
    }

    /// Identity comparison.
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Text of a text node or data of a comment; the concatenated text of
    /// every descendant for an element.
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeType::Element => self
                .children()
                .iter()
                .filter(|child| !child.is_comment())
                .map(Node::text_content)
                .collect(),
            _ => self.0.data.read().clone(),
        }
    }

    /// Replace the text of a text node or the data of a comment.
    pub fn set_text(&self, text: impl Into<String>) -> Result<()> {
        if self.is_element() {
            return Err(Error::InvariantViolation("elements carry no text of their own"));
        }
        *self.0.data.write() = text.into();
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0.attributes.read().get(name).cloned()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.0.attributes.read().contains_key(name)
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        self.0
            .attributes
            .write()
            .insert(name.to_string(), value.into());
    }

    pub fn remove_attribute(&self, name: &str) -> bool {
        self.0.attributes.write().shift_remove(name).is_some()
    }

    pub fn property(&self, name: &str) -> Option<Value> {
        self.0.properties.read().get(name).cloned()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.0.properties.read().contains_key(name)
    }

    pub fn set_property(&self, name: &str, value: Value) {
        self.0.properties.write().insert(name.to_string(), value);
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.read().upgrade().map(Node)
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.0.children.read().len()
    }

    /// Position of this node among its parent's children.
    pub fn index(&self) -> Option<usize> {
        let parent = self.parent()?;
        let children = parent.0.children.read();
        children.iter().position(|child| child.ptr_eq(self))
    }

    pub fn append_child(&self, child: &Node) -> Result<()> {
        self.insert_child_at(usize::MAX, child)
    }

    /// Insert `child` at `index`, clamped to the number of children.
    ///
    /// A child that already has a parent is moved.
    pub fn insert_child_at(&self, index: usize, child: &Node) -> Result<()> {
        if !self.is_element() {
            return Err(Error::InvariantViolation("only elements have children"));
        }
        if self.is_inclusive_descendant_of(child) {
            return Err(Error::InvariantViolation("a node cannot contain itself"));
        }

        child.detach();
        *child.0.parent.write() = Arc::downgrade(&self.0);

        let mut children = self.0.children.write();
        let index = index.min(children.len());
        children.insert(index, child.clone());
        Ok(())
    }

    /// Insert `node` as the next sibling of this node.
    pub fn insert_after(&self, node: &Node) -> Result<()> {
        if node.ptr_eq(self) {
            return Ok(());
        }
        let parent = self
            .parent()
            .ok_or(Error::InvariantViolation("anchor node has no parent"))?;

        // Moving a node out of the same parent shifts the anchor's index.
        node.detach();
        let index = self
            .index()
            .ok_or(Error::InvariantViolation("anchor node is not among its parent's children"))?;
        parent.insert_child_at(index + 1, node)
    }

    /// Remove the node from its parent. Returns the former parent and index.
    pub fn detach(&self) -> Option<(Node, usize)> {
        let parent = self.parent()?;
        let index = {
            let mut children = parent.0.children.write();
            let index = children.iter().position(|child| child.ptr_eq(self))?;
            children.remove(index);
            index
        };
        *self.0.parent.write() = Weak::new();
        Some((parent, index))
    }

    /// Register a hook run when this node is released.
    pub fn on_cleanup<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.0.cleanups.lock().push(Box::new(f));
    }

    /// Run and discard the cleanup hooks of this node and every descendant.
    ///
    /// Each hook runs at most once. Returns how many ran.
    pub fn run_cleanups(&self) -> usize {
        let hooks: Vec<Cleanup> = std::mem::take(&mut *self.0.cleanups.lock());
        let mut ran = hooks.len();
        for hook in hooks {
            hook();
        }
        for child in self.children() {
            ran += child.run_cleanups();
        }
        ran
    }

    fn is_inclusive_descendant_of(&self, other: &Node) -> bool {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            if node.ptr_eq(other) {
                return true;
            }
            current = node.parent();
        }
        false
    }

    /// Serialize the subtree as markup. Attributes only; properties are not
    /// reflected.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self.0.kind {
            NodeType::Text => out.push_str(&escape(&self.0.data.read(), false)),
            NodeType::Comment => {
                out.push_str("<!--");
                out.push_str(&self.0.data.read());
                out.push_str("-->");
            }
            NodeType::Element => {
                out.push('<');
                out.push_str(&self.0.tag);
                for (name, value) in self.0.attributes.read().iter() {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value, true));
                    out.push('"');
                }
                out.push('>');
                for child in self.children() {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(&self.0.tag);
                out.push('>');
            }
        }
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.kind {
            NodeType::Element => f
                .debug_struct("Element")
                .field("tag", &self.0.tag)
                .field("children", &self.child_count())
                .finish(),
            NodeType::Text => f.debug_tuple("Text").field(&*self.0.data.read()).finish(),
            NodeType::Comment => f.debug_tuple("Comment").field(&*self.0.data.read()).finish(),
        }
    }
}
