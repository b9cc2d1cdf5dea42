//! Renderable content and the outputs it produces.

use serde_json::Value;
use smallvec::SmallVec;

use crate::dom::Node;
use crate::error::{Error, Result};

/// Nodes produced for one output. Never empty once rendered.
pub type Nodes = SmallVec<[Node; 4]>;

/// Anything the reconciler can render.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Plain data. Arrays are sequences; objects are not renderable.
    Value(Value),
    /// An existing node, rendered as itself.
    Node(Node),
    List(Vec<Content>),
}

impl Content {
    pub fn null() -> Self {
        Content::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Content::Value(Value::Null))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Content::List(_) | Content::Value(Value::Array(_)))
    }

    /// A scalar that renders as text.
    pub(crate) fn is_primitive(&self) -> bool {
        matches!(
            self,
            Content::Value(Value::Bool(_) | Value::Number(_) | Value::String(_))
        )
    }

    /// Elements of a sequence; anything else is handed back unchanged.
    pub(crate) fn into_items(self) -> std::result::Result<Vec<Content>, Content> {
        match self {
            Content::List(items) => Ok(items),
            Content::Value(Value::Array(items)) => {
                Ok(items.into_iter().map(Content::Value).collect())
            }
            scalar => Err(scalar),
        }
    }

    /// Reject anything conversion would refuse, without building nodes.
    pub(crate) fn validate(&self) -> Result<()> {
        match self {
            Content::Value(Value::Object(_)) => Err(Error::InvalidRenderable),
            Content::Value(Value::Array(items)) => items.iter().try_for_each(|item| match item {
                Value::Object(_) => Err(Error::InvalidRenderable),
                Value::Array(_) => Content::Value(item.clone()).validate(),
                _ => Ok(()),
            }),
            Content::List(items) => items.iter().try_for_each(Content::validate),
            _ => Ok(()),
        }
    }
}

/// String coercion for primitives. Whole floats print without a fraction;
/// very large or very small ones switch to exponent form.
pub(crate) fn coerce(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_float(f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Plain decimal inside `[1e-6, 1e21)`, exponent form (`1e+21`, `1.5e-7`)
/// outside it.
fn format_float(f: f64) -> String {
    let magnitude = f.abs();
    if magnitude == 0.0 || (1e-6..1e21).contains(&magnitude) {
        return f.to_string();
    }
    let text = format!("{f:e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => text,
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Content::Value(value)
    }
}

impl From<Node> for Content {
    fn from(node: Node) -> Self {
        Content::Node(node)
    }
}

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(items: Vec<T>) -> Self {
        Content::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Content>> From<Option<T>> for Content {
    fn from(item: Option<T>) -> Self {
        item.map_or_else(Content::null, Into::into)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Value(Value::from(text))
    }
}

macro_rules! scalar_content {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Content {
                fn from(value: $ty) -> Self {
                    Content::Value(Value::from(value))
                }
            }
        )*
    };
}

scalar_content!(String, bool, i32, i64, u32, u64, usize, f64);

/// Where a reactive value is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Single(Node),
    /// An ordered, non-empty run of sibling nodes.
    List(Nodes),
    /// An attribute slot on an element.
    Attribute { element: Node, name: String },
}

impl Output {
    /// Rendered nodes, in order. Empty for attribute outputs.
    pub fn nodes(&self) -> Nodes {
        match self {
            Output::Single(node) => smallvec::smallvec![node.clone()],
            Output::List(nodes) => nodes.clone(),
            Output::Attribute { .. } => Nodes::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Output::Single(_) => 1,
            Output::List(nodes) => nodes.len(),
            Output::Attribute { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn into_nodes(self) -> Nodes {
        match self {
            Output::Single(node) => smallvec::smallvec![node],
            Output::List(nodes) => nodes,
            Output::Attribute { .. } => Nodes::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coercion_matches_text_rendering() {
        assert_eq!(coerce(&json!(1)), "1");
        assert_eq!(coerce(&json!(1.0)), "1");
        assert_eq!(coerce(&json!(2.5)), "2.5");
        assert_eq!(coerce(&json!(-3)), "-3");
        assert_eq!(coerce(&json!("hi")), "hi");
        assert_eq!(coerce(&json!(false)), "false");
    }

    #[test]
    fn extreme_floats_use_exponent_form() {
        assert_eq!(coerce(&json!(1e21)), "1e+21");
        assert_eq!(coerce(&json!(-2.5e30)), "-2.5e+30");
        assert_eq!(coerce(&json!(1.5e-7)), "1.5e-7");
        assert_eq!(coerce(&json!(1e20)), "100000000000000000000");
        assert_eq!(coerce(&json!(0.000001)), "0.000001");
        assert_eq!(coerce(&json!(0.0)), "0");
    }

    #[test]
    fn validation_finds_nested_objects() {
        assert!(Content::from(json!({})).validate().is_err());
        assert!(Content::from(json!([1, [2, {"x": 1}]])).validate().is_err());
        assert!(Content::from(vec![Content::from(1), Content::from(json!({}))])
            .validate()
            .is_err());
        assert!(Content::from(json!([1, "a", null, [true]])).validate().is_ok());
    }

    #[test]
    fn sequences_and_primitives() {
        assert!(Content::from(json!([])).is_sequence());
        assert!(Content::from(Vec::<Content>::new()).is_sequence());
        assert!(Content::from("x").is_primitive());
        assert!(!Content::null().is_primitive());
        assert!(Content::from(None::<i32>).is_null());
    }
}
