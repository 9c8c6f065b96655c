//! Uniform read/create/delete access to a node's sub-element containers.
//!
//! A node exposes four containers, each served by one [`ElementAccessor`]:
//!
//! | Kind | Elements | create | delete |
//! |------|----------|--------|--------|
//! | `properties` | [`PropertyRepresentation`] | sets (or replaces) a value | removes |
//! | `children` | [`NodeRepresentation`] | adds a subtree | removes |
//! | `mixins` | [`MixinRepresentation`] | applies a mixin | removes it |
//! | `versions` | version nodes | not allowed | not allowed |
//!
//! Element names arrive as escaped URI segments and are unescaped before they
//! reach the repository. Every successful mutation is followed by a save.

mod children;
mod mixins;
mod properties;
mod versions;

pub use children::ChildrenAccessor;
pub use mixins::MixinsAccessor;
pub use properties::PropertiesAccessor;
pub use versions::VersionsAccessor;

use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{ProjectionError, Result};
use crate::projection::Projection;
use crate::repository::Node;
use crate::representation::{
    Decorator, MixinRepresentation, NodeRepresentation, OrderedMap, PropertyRepresentation,
};
use crate::uri;

/// The four kinds of sub-element container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubElementKind {
    Properties,
    Children,
    Mixins,
    Versions,
}

impl SubElementKind {
    pub const ALL: [SubElementKind; 4] = [
        SubElementKind::Properties,
        SubElementKind::Children,
        SubElementKind::Mixins,
        SubElementKind::Versions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubElementKind::Properties => "properties",
            SubElementKind::Children => "children",
            SubElementKind::Mixins => "mixins",
            SubElementKind::Versions => "versions",
        }
    }
}

impl fmt::Display for SubElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubElementKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        SubElementKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown sub-element kind: {s}"))
    }
}

/// Operations understood by [`ElementAccessor::perform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Create,
    Delete,
}

impl Operation {
    /// Parse an operation token. Unknown tokens yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "read" => Some(Operation::Read),
            "create" => Some(Operation::Create),
            "delete" => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// One entry of a sub-element container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Element {
    Property(PropertyRepresentation),
    Node(NodeRepresentation),
    Mixin(MixinRepresentation),
}

impl Element {
    pub fn uri(&self) -> Option<&str> {
        match self {
            Element::Property(p) => p.uri(),
            Element::Node(n) => n.uri(),
            Element::Mixin(m) => m.uri(),
        }
    }

    pub fn as_property(&self) -> Option<&PropertyRepresentation> {
        match self {
            Element::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeRepresentation> {
        match self {
            Element::Node(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_mixin(&self) -> Option<&MixinRepresentation> {
        match self {
            Element::Mixin(m) => Some(m),
            _ => None,
        }
    }
}

/// A whole container: its entries keyed by escaped name, plus its own links.
///
/// Serializes as `{"<kind>": {...entries}, "_links": {...}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubElementContainer {
    kind: SubElementKind,
    entries: OrderedMap<Element>,
    decorator: Decorator,
}

impl SubElementContainer {
    /// A container for `node` with `self` and `parent` links.
    pub fn new(
        ctx: &Projection<'_>,
        node: &Node,
        kind: SubElementKind,
        entries: OrderedMap<Element>,
    ) -> Self {
        let mut decorator = Decorator::new(ctx.options);
        decorator.init_container(ctx, &uri::id_uri(&node.identifier), kind.as_str());
        Self {
            kind,
            entries,
            decorator,
        }
    }

    pub fn kind(&self) -> SubElementKind {
        self.kind
    }

    pub fn entries(&self) -> &OrderedMap<Element> {
        &self.entries
    }

    pub fn get(&self, escaped_name: &str) -> Option<&Element> {
        self.entries.get(escaped_name)
    }

    pub fn decorator(&self) -> &Decorator {
        &self.decorator
    }

    pub fn uri(&self) -> Option<&str> {
        self.decorator.uri()
    }
}

impl Serialize for SubElementContainer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(self.kind.as_str(), &self.entries)?;
        if !self.decorator.links().is_empty() {
            map.serialize_entry("_links", self.decorator.links())?;
        }
        map.end()
    }
}

/// Result of [`ElementAccessor::perform`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Container(SubElementContainer),
    Element(Element),
}

/// Read, create and delete over one kind of sub-element container.
pub trait ElementAccessor: Send + Sync {
    fn kind(&self) -> SubElementKind;

    /// The whole container of `node`.
    fn get_container(&self, ctx: &Projection<'_>, node: &Node) -> Result<SubElementContainer>;

    /// One element by escaped name. Fails with `NotFound` when absent.
    fn get_element(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element>;

    /// Create the named element from an optional JSON payload.
    fn create(
        &self,
        ctx: &Projection<'_>,
        node: &Node,
        name: &str,
        data: Option<&Value>,
    ) -> Result<Element>;

    /// Remove the named element, returning its representation from just
    /// before removal.
    fn delete(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element>;

    /// Dispatch an operation token.
    ///
    /// `read` with an empty name returns the container, otherwise the
    /// element. `create` and `delete` go straight to the accessor, which
    /// refuses an empty name unless it refuses the write altogether. Unknown
    /// tokens yield `Ok(None)` so the caller can decide how to answer.
    fn perform(
        &self,
        ctx: &Projection<'_>,
        node: &Node,
        name: &str,
        operation: &str,
        data: Option<&Value>,
    ) -> Result<Option<Outcome>> {
        let Some(operation) = Operation::from_token(operation) else {
            return Ok(None);
        };
        let outcome = match operation {
            Operation::Read if name.is_empty() => {
                Outcome::Container(self.get_container(ctx, node)?)
            }
            Operation::Read => Outcome::Element(self.get_element(ctx, node, name)?),
            Operation::Create => Outcome::Element(self.create(ctx, node, name, data)?),
            Operation::Delete => Outcome::Element(self.delete(ctx, node, name)?),
        };
        Ok(Some(outcome))
    }
}

/// The accessor serving `kind`.
pub fn accessor_for(kind: SubElementKind) -> &'static dyn ElementAccessor {
    match kind {
        SubElementKind::Properties => &PropertiesAccessor,
        SubElementKind::Children => &ChildrenAccessor,
        SubElementKind::Mixins => &MixinsAccessor,
        SubElementKind::Versions => &VersionsAccessor,
    }
}

/// Deserialize a create payload, mapping malformed input to `BadRequest`.
fn parse_payload<T: serde::de::DeserializeOwned>(data: &Value) -> Result<T> {
    T::deserialize(data).map_err(|e| ProjectionError::BadRequest(format!("invalid payload: {e}")))
}

fn not_found(kind: SubElementKind, node: &Node, name: &str) -> ProjectionError {
    ProjectionError::NotFound(format!("{kind} of {} has no entry {name:?}", node.path))
}

fn require_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProjectionError::BadRequest("element name must not be empty".into()));
    }
    Ok(())
}
