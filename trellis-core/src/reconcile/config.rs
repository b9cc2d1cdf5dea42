//! Reconciler configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Settings a [`Reconciler`](super::Reconciler) is built with.
///
/// Deserializes from JSON; missing fields take their defaults.
///
/// ```rust
/// use trellis_core::reconcile::ReconcilerConfig;
///
/// let config = ReconcilerConfig::from_json(r#"{"attribute_properties": {"x": "y"}}"#).unwrap();
/// assert_eq!(config.property_for("x"), "y");
/// assert_eq!(config.property_for("value"), "value");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Attribute names whose element property is spelled differently.
    /// Unlisted attributes map to the property of the same name.
    pub attribute_properties: IndexMap<String, String>,
}

impl ReconcilerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Property kept in sync with `attribute`.
    pub fn property_for<'a>(&'a self, attribute: &'a str) -> &'a str {
        self.attribute_properties
            .get(attribute)
            .map(String::as_str)
            .unwrap_or(attribute)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        let attribute_properties = [
            ("class", "className"),
            ("for", "htmlFor"),
            ("readonly", "readOnly"),
            ("tabindex", "tabIndex"),
            ("maxlength", "maxLength"),
            ("colspan", "colSpan"),
            ("rowspan", "rowSpan"),
            ("contenteditable", "contentEditable"),
            ("accesskey", "accessKey"),
            ("crossorigin", "crossOrigin"),
            ("novalidate", "noValidate"),
            ("usemap", "useMap"),
        ]
        .into_iter()
        .map(|(attribute, property)| (attribute.to_string(), property.to_string()))
        .collect();

        Self {
            attribute_properties,
        }
    }
}
