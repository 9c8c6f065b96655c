//! Serializable representations of repository items.
//!
//! Every representation carries its identity (`name`, `type`) and a
//! [`Decorator`] holding the `_links` block and, for reference properties,
//! the embedded `references`. Representations are built fresh per request
//! from a [`Projection`] and dropped once serialized.
//!
//! | Type | Item |
//! |------|------|
//! | [`NodeRepresentation`] | a node, optionally with children, or a version node |
//! | [`PropertyRepresentation`] | a property and its value(s) |
//! | [`MixinRepresentation`] | one mixin type applied to a node |

mod decorator;

pub use decorator::{property_type_path, Decorator};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::names;
use crate::projection::Projection;
use crate::repository::{Item, Node, Property, PropertyType, PropertyValue};
use crate::uri;

/// Link relation names.
pub mod rel {
    pub const SELF: &str = "self";
    pub const ABSOLUTE: &str = "absolute";
    pub const TYPE: &str = "type";
    pub const PARENT: &str = "parent";
    pub const PATH: &str = "path";
    pub const TARGET: &str = "target";
    pub const PREVIOUS: &str = "previous";
    pub const NEXT: &str = "next";
    pub const NODE_AT_VERSION: &str = "node-at-version";
}

// ---------------------------------------------------------------------------
// OrderedMap
// ---------------------------------------------------------------------------

/// String-keyed map that keeps first-insertion order.
///
/// Re-inserting an existing key replaces the value in place. Serializes as a
/// JSON object in iteration order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace. Returns the replaced value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// A typed hyperlink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: Href,
}

/// Link target: a single URI, or a list for relations that accumulate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Href {
    One(String),
    Many(Vec<String>),
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: Href::One(href.into()),
        }
    }

    /// The single target URI, or `None` for list-valued links.
    pub fn uri(&self) -> Option<&str> {
        match &self.href {
            Href::One(uri) => Some(uri),
            Href::Many(_) => None,
        }
    }

    /// Every target URI in order.
    pub fn uris(&self) -> Vec<&str> {
        match &self.href {
            Href::One(uri) => vec![uri.as_str()],
            Href::Many(uris) => uris.iter().map(String::as_str).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// JSON shape of a node.
///
/// `children` is absent when the node was built at depth 0, so a listing can
/// tell "not expanded" apart from "has no children".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRepresentation {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub path: String,
    pub id: String,
    #[serde(skip_serializing_if = "OrderedMap::is_empty")]
    pub properties: OrderedMap<PropertyRepresentation>,
    #[serde(skip_serializing_if = "OrderedMap::is_empty")]
    pub mixins: OrderedMap<MixinRepresentation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<OrderedMap<NodeRepresentation>>,
    #[serde(skip_serializing_if = "OrderedMap::is_empty")]
    pub versions: OrderedMap<NodeRepresentation>,
    #[serde(flatten)]
    pub decorator: Decorator,
}

impl NodeRepresentation {
    /// Build a node's representation, expanding children `depth` levels deep.
    ///
    /// Properties, mixins and versions are always included. Container links
    /// are attached only for containers that have entries.
    pub fn build(ctx: &Projection<'_>, node: &Node, depth: u32) -> Result<Self> {
        let mut decorator = Decorator::new(ctx.options);
        decorator.init_item(ctx, Item::Node(node))?;

        let node_uri = uri::id_uri(&node.identifier);

        let mut properties = OrderedMap::new();
        for property in ctx.session.properties(node)? {
            let representation = PropertyRepresentation::build(ctx, &property)?;
            properties.insert(names::escape(&property.name), representation);
        }

        let mixins_uri = uri::child_uri(&node_uri, "mixins", false);
        let mut mixins = OrderedMap::new();
        for mixin in &node.mixin_types {
            let representation = MixinRepresentation::build(ctx, &mixins_uri, mixin);
            mixins.insert(names::escape(mixin), representation);
        }

        let child_nodes = ctx.session.child_nodes(node)?;
        let has_children = !child_nodes.is_empty();
        let children = if depth > 0 {
            let mut children = OrderedMap::new();
            for child in &child_nodes {
                children.insert(names::escape_leaf(&child.path), Self::build(ctx, child, depth - 1)?);
            }
            Some(children)
        } else {
            None
        };

        let mut versions = OrderedMap::new();
        for version in ctx.session.versions(node)? {
            versions.insert(names::escape(&version.name), Self::build_version(ctx, &version)?);
        }

        let mut present = Vec::new();
        if !properties.is_empty() {
            present.push("properties");
        }
        if has_children {
            present.push("children");
        }
        if !mixins.is_empty() {
            present.push("mixins");
        }
        if !versions.is_empty() {
            present.push("versions");
        }
        decorator.init_node(&node_uri, &present);

        Ok(Self {
            name: node.name.clone(),
            type_name: node.primary_type.clone(),
            path: node.path.clone(),
            id: node.identifier.clone(),
            properties,
            mixins,
            children,
            versions,
            decorator,
        })
    }

    /// Build a version node: a depth-0 node plus its history links.
    pub fn build_version(ctx: &Projection<'_>, version: &Node) -> Result<Self> {
        let mut representation = Self::build(ctx, version, 0)?;
        representation.decorator.init_version(ctx, version)?;
        Ok(representation)
    }

    /// Canonical URI of this node, when links were emitted.
    pub fn uri(&self) -> Option<&str> {
        self.decorator.uri()
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// JSON shape of a property.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRepresentation {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "multiValued")]
    pub multi_valued: bool,
    pub reference: bool,
    pub value: Value,
    #[serde(flatten)]
    pub decorator: Decorator,
}

impl PropertyRepresentation {
    pub fn build(ctx: &Projection<'_>, property: &Property) -> Result<Self> {
        let mut decorator = Decorator::new(ctx.options);
        decorator.init_item(ctx, Item::Property(property))?;
        decorator.init_property(ctx, property)?;

        Ok(Self {
            name: property.name.clone(),
            type_name: property.property_type.to_string(),
            multi_valued: property.is_multiple(),
            reference: property.is_reference(),
            value: json_value(property.property_type, &property.value),
            decorator,
        })
    }

    pub fn uri(&self) -> Option<&str> {
        self.decorator.uri()
    }
}

/// Render stored values as JSON. Numeric and boolean types become JSON
/// numbers and booleans; anything that fails to parse stays a string.
pub fn json_value(property_type: PropertyType, value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Single(v) => scalar(property_type, v),
        PropertyValue::Multiple(vs) => {
            Value::Array(vs.iter().map(|v| scalar(property_type, v)).collect())
        }
    }
}

fn scalar(property_type: PropertyType, raw: &str) -> Value {
    let parsed = match property_type {
        PropertyType::Long => raw.parse::<i64>().ok().map(Value::from),
        PropertyType::Double => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        PropertyType::Boolean => raw.parse::<bool>().ok().map(Value::Bool),
        _ => None,
    };
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Mixins
// ---------------------------------------------------------------------------

/// JSON shape of a mixin applied to a node. The mixin's name is its type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixinRepresentation {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(flatten)]
    pub decorator: Decorator,
}

impl MixinRepresentation {
    /// `container_uri` is the owning node's mixins container.
    pub fn build(ctx: &Projection<'_>, container_uri: &str, mixin: &str) -> Self {
        let mut decorator = Decorator::new(ctx.options);
        decorator.init_mixin(ctx, container_uri, mixin);
        Self {
            name: mixin.to_string(),
            type_name: mixin.to_string(),
            decorator,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        self.decorator.uri()
    }
}
