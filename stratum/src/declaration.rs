//! Resource declarations and cross-layer references embedded in them.
//!
//! A declaration describes what should exist; it carries no provider
//! identity. Attribute values are untyped JSON so provider-specific schemas
//! stay at the backend boundary. A value of the exact shape
//! `{"$upstream": {"layer": "...", "output": "..."}}` is an [`UpstreamRef`]
//! that is replaced with the upstream layer's output when a plan is built.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute map carried by declarations and state entries.
pub type Attributes = BTreeMap<String, Value>;

/// Object key marking an attribute value as a cross-layer reference.
pub const UPSTREAM_KEY: &str = "$upstream";

/// Desired state of a single resource within a layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDeclaration {
    /// Resource type tag understood by the provisioning backend.
    pub kind: String,
    /// Identifier unique within the owning layer.
    pub id: String,
    /// Desired attributes.
    #[serde(default)]
    pub attributes: Attributes,
    /// Ids of declarations in the same layer that must be applied first.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
    /// Refuse to plan a deletion of this resource.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub prevent_destroy: bool,
}

impl ResourceDeclaration {
    /// Create a declaration with no attributes or dependencies.
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            attributes: Attributes::new(),
            depends_on: BTreeSet::new(),
            prevent_destroy: false,
        }
    }

    /// Set a desired attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add an ordering dependency on another declaration in the same layer.
    #[must_use]
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.depends_on.insert(id.into());
        self
    }

    /// Mark the declaration as protected from deletion.
    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.prevent_destroy = true;
        self
    }

    /// Collect every upstream reference found in the attributes, at any depth.
    #[must_use]
    pub fn upstream_refs(&self) -> BTreeSet<UpstreamRef> {
        let mut refs = BTreeSet::new();
        for value in self.attributes.values() {
            collect_refs(value, &mut refs);
        }
        refs
    }

    /// Return a copy with every upstream reference replaced by `lookup`.
    ///
    /// References that `lookup` cannot satisfy are left in place; callers
    /// resolve all references before substituting.
    #[must_use]
    pub fn substitute<F>(&self, lookup: F) -> Self
    where
        F: Fn(&UpstreamRef) -> Option<Value>,
    {
        let attributes = self
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), substitute_value(value, &lookup)))
            .collect();
        Self {
            attributes,
            ..self.clone()
        }
    }
}

/// Reference to an output exposed by an upstream layer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamRef {
    /// Upstream layer name.
    pub layer: String,
    /// Output name exposed by that layer.
    pub output: String,
}

impl UpstreamRef {
    /// Create a reference to `layer`'s `output`.
    #[must_use]
    pub fn new(layer: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            layer: layer.into(),
            output: output.into(),
        }
    }

    /// Recognise a reference in its JSON attribute form.
    ///
    /// # Examples
    ///
    /// ```
    /// use serde_json::json;
    /// use stratum::UpstreamRef;
    ///
    /// let value = json!({"$upstream": {"layer": "bootstrap", "output": "deployer_email"}});
    /// let parsed = UpstreamRef::from_value(&value);
    /// assert_eq!(parsed, Some(UpstreamRef::new("bootstrap", "deployer_email")));
    /// assert_eq!(UpstreamRef::from_value(&json!("plain")), None);
    /// ```
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }
        let inner = map.get(UPSTREAM_KEY)?;
        serde_json::from_value(inner.clone()).ok()
    }

    /// Render the reference in its JSON attribute form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut inner = Map::new();
        inner.insert("layer".to_owned(), Value::String(self.layer.clone()));
        inner.insert("output".to_owned(), Value::String(self.output.clone()));
        let mut outer = Map::new();
        outer.insert(UPSTREAM_KEY.to_owned(), Value::Object(inner));
        Value::Object(outer)
    }
}

impl std::fmt::Display for UpstreamRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.layer, self.output)
    }
}

fn collect_refs(value: &Value, refs: &mut BTreeSet<UpstreamRef>) {
    if let Some(reference) = UpstreamRef::from_value(value) {
        refs.insert(reference);
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_refs(item, refs)),
        Value::Object(map) => map.values().for_each(|item| collect_refs(item, refs)),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

fn substitute_value<F>(value: &Value, lookup: &F) -> Value
where
    F: Fn(&UpstreamRef) -> Option<Value>,
{
    if let Some(reference) = UpstreamRef::from_value(value) {
        return lookup(&reference).unwrap_or_else(|| value.clone());
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_value(item, lookup))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute_value(item, lookup)))
                .collect(),
        ),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => value.clone(),
    }
}
