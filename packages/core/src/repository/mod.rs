//! Contract with the content-repository collaborator.
//!
//! The projection layer never touches persistence directly. It reads and
//! writes through a [`Session`], obtained from a [`Repository`] and released
//! by [`SessionGuard`] when the request ends. Permission decisions are
//! delegated to a [`PermissionCheck`].
//!
//! # Implementations
//!
//! | Type | When to use |
//! |------|-------------|
//! | [`MemoryRepository`] | Tests, demos, the bundled server |
//!
//! [`MemoryRepository`]: memory::MemoryRepository

pub mod memory;

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

/// Scope checked before a reference target is embedded in a representation.
pub const REFERENCES_SCOPE: &str = "repolink.references";

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// A structured repository item: owns properties, children, mixins, versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Stable identifier, independent of the node's position in the tree.
    pub identifier: String,
    /// Qualified name; empty for the root node.
    pub name: String,
    /// Absolute path, `/` for the root node.
    pub path: String,
    pub primary_type: String,
    /// Mixin types in the order they were added.
    pub mixin_types: Vec<String>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }
}

/// A leaf item attached to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub path: String,
    /// Identifier of the owning node.
    pub parent_identifier: String,
    pub property_type: PropertyType,
    pub value: PropertyValue,
}

impl Property {
    /// Reference properties point at other nodes, by identifier or by path.
    pub fn is_reference(&self) -> bool {
        self.property_type.is_reference()
    }

    /// Whether reference values are stored as paths rather than identifiers.
    pub fn is_path(&self) -> bool {
        self.property_type == PropertyType::Path
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self.value, PropertyValue::Multiple(_))
    }
}

/// Either view of a repository item.
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Node(&'a Node),
    Property(&'a Property),
}

impl<'a> Item<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Item::Node(node) => &node.name,
            Item::Property(property) => &property.name,
        }
    }

    pub fn path(&self) -> &'a str {
        match self {
            Item::Node(node) => &node.path,
            Item::Property(property) => &property.path,
        }
    }
}

/// Value type of a property.
///
/// Serialises with the repository's canonical type names (e.g. `"WeakReference"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PropertyType {
    #[default]
    String,
    Binary,
    Long,
    Double,
    Decimal,
    Date,
    Boolean,
    Name,
    Path,
    Reference,
    WeakReference,
    #[serde(rename = "URI")]
    Uri,
}

impl PropertyType {
    /// References by identifier and by path.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            PropertyType::Reference | PropertyType::WeakReference | PropertyType::Path
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyType::String => "String",
            PropertyType::Binary => "Binary",
            PropertyType::Long => "Long",
            PropertyType::Double => "Double",
            PropertyType::Decimal => "Decimal",
            PropertyType::Date => "Date",
            PropertyType::Boolean => "Boolean",
            PropertyType::Name => "Name",
            PropertyType::Path => "Path",
            PropertyType::Reference => "Reference",
            PropertyType::WeakReference => "WeakReference",
            PropertyType::Uri => "URI",
        };
        f.write_str(name)
    }
}

/// Stored value(s) of a property, in string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Single(String),
    Multiple(Vec<String>),
}

impl PropertyValue {
    /// All values in order; a single value yields one element.
    pub fn values(&self) -> Vec<&str> {
        match self {
            PropertyValue::Single(v) => vec![v.as_str()],
            PropertyValue::Multiple(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A registered node type and the property definitions it declares itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeType {
    pub name: String,
    pub mixin: bool,
    pub supertypes: Vec<String>,
    /// Definitions in declaration order. Several may share a name.
    pub declared_property_definitions: Vec<PropertyDefinition>,
}

/// Name used by residual definitions, which match any property name.
pub const RESIDUAL: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: String,
    /// Name of the node type declaring this definition.
    pub declaring_type: String,
    pub required_type: Option<PropertyType>,
    pub multiple: bool,
    pub protected: bool,
}

impl PropertyDefinition {
    pub fn is_residual(&self) -> bool {
        self.name == RESIDUAL
    }
}

// ---------------------------------------------------------------------------
// Session / Repository traits
// ---------------------------------------------------------------------------

/// One unit of work against the repository, scoped to a single request.
///
/// All methods are synchronous. Nodes and properties are returned as
/// snapshots; writes are visible to the same session immediately and to other
/// sessions after [`Session::save`].
pub trait Session: Send {
    // --- Reads ---------------------------------------------------------------

    fn root_node(&self) -> Result<Node, RepositoryError>;

    fn node_by_identifier(&self, identifier: &str) -> Result<Node, RepositoryError>;

    /// Look up a node by absolute path.
    fn node_by_path(&self, path: &str) -> Result<Node, RepositoryError>;

    /// Parent of an item. Fails with [`RepositoryError::ItemNotFound`] for the root.
    fn parent(&self, item: Item<'_>) -> Result<Node, RepositoryError>;

    fn child_nodes(&self, node: &Node) -> Result<Vec<Node>, RepositoryError>;

    fn child_node(&self, node: &Node, name: &str) -> Result<Option<Node>, RepositoryError>;

    fn properties(&self, node: &Node) -> Result<Vec<Property>, RepositoryError>;

    fn property(&self, node: &Node, name: &str) -> Result<Option<Property>, RepositoryError>;

    // --- Types ---------------------------------------------------------------

    fn node_type(&self, name: &str) -> Result<NodeType, RepositoryError>;

    /// The definition that governs an existing property.
    fn property_definition(&self, property: &Property) -> Result<PropertyDefinition, RepositoryError>;

    // --- Versions ------------------------------------------------------------

    /// Version nodes of a versionable node, oldest first. Empty otherwise.
    fn versions(&self, node: &Node) -> Result<Vec<Node>, RepositoryError>;

    fn linear_predecessor(&self, version: &Node) -> Result<Option<Node>, RepositoryError>;

    fn linear_successor(&self, version: &Node) -> Result<Option<Node>, RepositoryError>;

    fn frozen_node(&self, version: &Node) -> Result<Option<Node>, RepositoryError>;

    // --- Writes --------------------------------------------------------------

    fn add_node(&self, parent: &Node, name: &str, primary_type: &str) -> Result<Node, RepositoryError>;

    fn remove_node(&self, node: &Node) -> Result<(), RepositoryError>;

    fn set_property(
        &self,
        node: &Node,
        name: &str,
        property_type: PropertyType,
        value: PropertyValue,
    ) -> Result<Property, RepositoryError>;

    fn remove_property(&self, node: &Node, name: &str) -> Result<(), RepositoryError>;

    /// Whether the mixin set of this node may be changed at all.
    fn can_modify_mixins(&self, node: &Node) -> Result<bool, RepositoryError>;

    fn add_mixin(&self, node: &Node, mixin: &str) -> Result<(), RepositoryError>;

    fn remove_mixin(&self, node: &Node, mixin: &str) -> Result<(), RepositoryError>;

    fn save(&self) -> Result<(), RepositoryError>;

    /// Release the session. Idempotent; later calls on the session fail with
    /// [`RepositoryError::SessionClosed`].
    fn logout(&self);
}

/// Source of sessions. Shared across requests.
pub trait Repository: Send + Sync + 'static {
    fn login(&self) -> Result<Box<dyn Session>, RepositoryError>;
}

// ---------------------------------------------------------------------------
// SessionGuard
// ---------------------------------------------------------------------------

/// A session that is logged out when dropped, on every exit path.
pub struct SessionGuard {
    session: Box<dyn Session>,
}

impl SessionGuard {
    /// Open a session for the current request.
    pub fn open(repository: &dyn Repository) -> Result<Self, RepositoryError> {
        let session = repository.login()?;
        tracing::debug!("session opened");
        Ok(Self { session })
    }
}

impl Deref for SessionGuard {
    type Target = dyn Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.logout();
        tracing::debug!("session logged out");
    }
}

// ---------------------------------------------------------------------------
// PermissionCheck
// ---------------------------------------------------------------------------

/// Opaque access-control oracle.
pub trait PermissionCheck: Send + Sync {
    fn has_permission(&self, scope: &str, node: &Node) -> bool;
}

impl<F> PermissionCheck for F
where
    F: Fn(&str, &Node) -> bool + Send + Sync,
{
    fn has_permission(&self, scope: &str, node: &Node) -> bool {
        self(scope, node)
    }
}

/// Grants every permission.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionCheck for AllowAll {
    fn has_permission(&self, _scope: &str, _node: &Node) -> bool {
        true
    }
}
