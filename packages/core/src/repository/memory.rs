//! In-memory repository implementation.
//!
//! All data is held in RAM behind a [`RwLock`] and is lost when the process
//! exits. Use this for tests, demos, and the bundled server.
//!
//! The tree is a map of node records keyed by identifier; each record keeps
//! its children's identifiers in insertion order. A fixed set of built-in
//! node types is registered at construction, and every registered type gets
//! a node below `/jcr:system/jcr:nodeTypes` so type links resolve. Each
//! declared property definition becomes a `jcr:propertyDefinition` child of
//! its type node; these are same-name siblings, addressed as
//! `jcr:propertyDefinition[N]` for N > 1.
//!
//! Versions are ordinary nodes: checking in a `mix:versionable` node appends
//! an `nt:version` child to its `nt:versionHistory` (stored below
//! `/jcr:system/jcr:versionStorage`), and each version owns a
//! `jcr:frozenNode` snapshot of the node's properties. Histories here are
//! strictly linear.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use uuid::Uuid;

use super::{
    Item, Node, NodeType, Property, PropertyDefinition, PropertyType, PropertyValue, Repository,
    Session, RESIDUAL,
};
use crate::error::RepositoryError;

/// Identifier of the root node.
pub const ROOT_IDENTIFIER: &str = "cafebabe-cafe-babe-cafe-babecafebabe";

pub const NT_BASE: &str = "nt:base";
pub const NT_UNSTRUCTURED: &str = "nt:unstructured";
pub const NT_FOLDER: &str = "nt:folder";
pub const NT_HIERARCHY_NODE: &str = "nt:hierarchyNode";
pub const NT_NODE_TYPE: &str = "nt:nodeType";
pub const NT_PROPERTY_DEFINITION: &str = "nt:propertyDefinition";
pub const NT_VERSION_HISTORY: &str = "nt:versionHistory";
pub const NT_VERSION: &str = "nt:version";
pub const NT_FROZEN_NODE: &str = "nt:frozenNode";
pub const REP_ROOT: &str = "rep:root";
pub const REP_SYSTEM: &str = "rep:system";
pub const REP_NODE_TYPES: &str = "rep:nodeTypes";
pub const REP_VERSION_STORAGE: &str = "rep:versionStorage";
pub const MIX_REFERENCEABLE: &str = "mix:referenceable";
pub const MIX_VERSIONABLE: &str = "mix:versionable";
pub const MIX_TITLE: &str = "mix:title";
pub const MIX_LOCKABLE: &str = "mix:lockable";

pub const JCR_PRIMARY_TYPE: &str = "jcr:primaryType";
pub const JCR_MIXIN_TYPES: &str = "jcr:mixinTypes";
pub const JCR_UUID: &str = "jcr:uuid";
pub const JCR_FROZEN_NODE: &str = "jcr:frozenNode";
pub const JCR_PROPERTY_DEFINITION: &str = "jcr:propertyDefinition";

/// Types whose instances are read-only.
const READ_ONLY_TYPES: [&str; 7] = [
    REP_NODE_TYPES,
    NT_NODE_TYPE,
    NT_PROPERTY_DEFINITION,
    NT_VERSION_HISTORY,
    NT_VERSION,
    NT_FROZEN_NODE,
    REP_VERSION_STORAGE,
];

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct NodeRecord {
    identifier: String,
    name: String,
    parent: Option<String>,
    primary_type: String,
    mixins: Vec<String>,
    properties: Vec<PropertyRecord>,
    children: Vec<String>,
}

#[derive(Debug, Clone)]
struct PropertyRecord {
    name: String,
    property_type: PropertyType,
    value: PropertyValue,
}

struct Inner {
    nodes: HashMap<String, NodeRecord>,
    types: HashMap<String, NodeType>,
    node_types_folder: String,
    version_storage: String,
}

impl Inner {
    fn new() -> Self {
        let mut inner = Self {
            nodes: HashMap::new(),
            types: HashMap::new(),
            node_types_folder: String::new(),
            version_storage: String::new(),
        };
        inner.nodes.insert(
            ROOT_IDENTIFIER.to_string(),
            NodeRecord {
                identifier: ROOT_IDENTIFIER.to_string(),
                name: String::new(),
                parent: None,
                primary_type: REP_ROOT.to_string(),
                mixins: Vec::new(),
                properties: Vec::new(),
                children: Vec::new(),
            },
        );
        let system = inner.insert_node(ROOT_IDENTIFIER, "jcr:system", REP_SYSTEM);
        inner.node_types_folder = inner.insert_node(&system, "jcr:nodeTypes", REP_NODE_TYPES);
        inner.version_storage = inner.insert_node(&system, "jcr:versionStorage", REP_VERSION_STORAGE);
        for node_type in builtin_types() {
            inner.register(node_type);
        }
        inner
    }

    fn record(&self, identifier: &str) -> Result<&NodeRecord, RepositoryError> {
        self.nodes
            .get(identifier)
            .ok_or_else(|| RepositoryError::ItemNotFound(identifier.to_string()))
    }

    fn record_mut(&mut self, identifier: &str) -> Result<&mut NodeRecord, RepositoryError> {
        self.nodes
            .get_mut(identifier)
            .ok_or_else(|| RepositoryError::ItemNotFound(identifier.to_string()))
    }

    fn path_of(&self, identifier: &str) -> String {
        let mut segments: Vec<String> = Vec::new();
        let mut current = self.nodes.get(identifier);
        while let Some(record) = current {
            if record.parent.is_none() {
                break;
            }
            segments.push(self.segment_of(record));
            current = record.parent.as_deref().and_then(|p| self.nodes.get(p));
        }
        if segments.is_empty() {
            return "/".to_string();
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Path segment of a record: its name, with `[N]` for the Nth same-name
    /// sibling when N > 1.
    fn segment_of(&self, record: &NodeRecord) -> String {
        let index = record
            .parent
            .as_deref()
            .and_then(|p| self.nodes.get(p))
            .map_or(1, |parent| {
                parent
                    .children
                    .iter()
                    .filter_map(|id| self.nodes.get(id))
                    .take_while(|sibling| sibling.identifier != record.identifier)
                    .filter(|sibling| sibling.name == record.name)
                    .count()
                    + 1
            });
        if index > 1 {
            format!("{}[{index}]", record.name)
        } else {
            record.name.clone()
        }
    }

    fn snapshot(&self, identifier: &str) -> Result<Node, RepositoryError> {
        let record = self.record(identifier)?;
        Ok(Node {
            identifier: record.identifier.clone(),
            name: record.name.clone(),
            path: self.path_of(identifier),
            primary_type: record.primary_type.clone(),
            mixin_types: record.mixins.clone(),
        })
    }

    /// Child by name; `name[N]` selects the Nth same-name sibling.
    fn child_id(&self, parent: &str, name: &str) -> Option<String> {
        let (name, index) = split_sibling_index(name);
        let record = self.nodes.get(parent)?;
        record
            .children
            .iter()
            .filter(|id| self.nodes.get(*id).is_some_and(|c| c.name == name))
            .nth(index.checked_sub(1)?)
            .cloned()
    }

    fn resolve_path(&self, path: &str) -> Result<String, RepositoryError> {
        if !path.starts_with('/') {
            return Err(RepositoryError::ItemNotFound(path.to_string()));
        }
        let mut current = ROOT_IDENTIFIER.to_string();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self
                .child_id(&current, segment)
                .ok_or_else(|| RepositoryError::ItemNotFound(path.to_string()))?;
        }
        Ok(current)
    }

    /// Primary type and its supertypes first, then each mixin and its supertypes.
    fn effective_types(&self, record: &NodeRecord) -> Vec<&NodeType> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect_types(&record.primary_type, &mut seen, &mut out);
        for mixin in &record.mixins {
            self.collect_types(mixin, &mut seen, &mut out);
        }
        out
    }

    fn collect_types<'a>(&'a self, name: &str, seen: &mut HashSet<String>, out: &mut Vec<&'a NodeType>) {
        if !seen.insert(name.to_string()) {
            return;
        }
        if let Some(node_type) = self.types.get(name) {
            out.push(node_type);
            for supertype in &node_type.supertypes {
                self.collect_types(supertype, seen, out);
            }
        }
    }

    fn has_type(&self, record: &NodeRecord, name: &str) -> bool {
        self.effective_types(record).iter().any(|t| t.name == name)
    }

    /// Named definitions win over residual ones; among residuals, matching
    /// multiplicity wins.
    fn definition_for(&self, record: &NodeRecord, name: &str, multiple: bool) -> Option<PropertyDefinition> {
        let declared: Vec<&PropertyDefinition> = self
            .effective_types(record)
            .into_iter()
            .flat_map(|t| t.declared_property_definitions.iter())
            .collect();
        declared
            .iter()
            .find(|d| d.name == name)
            .or_else(|| declared.iter().find(|d| d.is_residual() && d.multiple == multiple))
            .or_else(|| declared.iter().find(|d| d.is_residual()))
            .map(|d| (*d).clone())
    }

    fn property_snapshots(&self, identifier: &str) -> Result<Vec<Property>, RepositoryError> {
        let record = self.record(identifier)?;
        let path = self.path_of(identifier);
        let make = |name: &str, property_type: PropertyType, value: PropertyValue| Property {
            name: name.to_string(),
            path: child_path(&path, name),
            parent_identifier: record.identifier.clone(),
            property_type,
            value,
        };

        let mut out = vec![make(
            JCR_PRIMARY_TYPE,
            PropertyType::Name,
            PropertyValue::Single(record.primary_type.clone()),
        )];
        if !record.mixins.is_empty() {
            out.push(make(
                JCR_MIXIN_TYPES,
                PropertyType::Name,
                PropertyValue::Multiple(record.mixins.clone()),
            ));
        }
        if self.has_type(record, MIX_REFERENCEABLE) {
            out.push(make(
                JCR_UUID,
                PropertyType::String,
                PropertyValue::Single(record.identifier.clone()),
            ));
        }
        for p in &record.properties {
            out.push(make(&p.name, p.property_type, p.value.clone()));
        }
        Ok(out)
    }

    fn is_read_only(&self, record: &NodeRecord) -> bool {
        READ_ONLY_TYPES.contains(&record.primary_type.as_str())
    }

    fn insert_node(&mut self, parent: &str, name: &str, primary_type: &str) -> String {
        let identifier = Uuid::now_v7().to_string();
        self.nodes.insert(
            identifier.clone(),
            NodeRecord {
                identifier: identifier.clone(),
                name: name.to_string(),
                parent: Some(parent.to_string()),
                primary_type: primary_type.to_string(),
                mixins: Vec::new(),
                properties: Vec::new(),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.push(identifier.clone());
        }
        identifier
    }

    fn push_property(&mut self, identifier: &str, name: &str, property_type: PropertyType, value: PropertyValue) {
        if let Some(record) = self.nodes.get_mut(identifier) {
            record.properties.push(PropertyRecord {
                name: name.to_string(),
                property_type,
                value,
            });
        }
    }

    fn remove_subtree(&mut self, identifier: &str) {
        if let Some(record) = self.nodes.remove(identifier) {
            for child in record.children {
                self.remove_subtree(&child);
            }
        }
    }

    fn register(&mut self, node_type: NodeType) {
        let folder = self.node_types_folder.clone();
        let type_node = match self.child_id(&folder, &node_type.name) {
            Some(existing) => existing,
            None => self.insert_node(&folder, &node_type.name, NT_NODE_TYPE),
        };
        let stale: Vec<String> = match self.nodes.get_mut(&type_node) {
            Some(record) => {
                record.properties.clear();
                std::mem::take(&mut record.children)
            }
            None => Vec::new(),
        };
        for child in stale {
            self.remove_subtree(&child);
        }
        self.push_property(
            &type_node,
            "jcr:nodeTypeName",
            PropertyType::Name,
            PropertyValue::Single(node_type.name.clone()),
        );
        self.push_property(
            &type_node,
            "jcr:isMixin",
            PropertyType::Boolean,
            PropertyValue::Single(node_type.mixin.to_string()),
        );
        self.push_property(
            &type_node,
            "jcr:supertypes",
            PropertyType::Name,
            PropertyValue::Multiple(node_type.supertypes.clone()),
        );
        for definition in &node_type.declared_property_definitions {
            let node = self.insert_node(&type_node, JCR_PROPERTY_DEFINITION, NT_PROPERTY_DEFINITION);
            self.push_property(
                &node,
                "jcr:name",
                PropertyType::Name,
                PropertyValue::Single(definition.name.clone()),
            );
            self.push_property(
                &node,
                "jcr:requiredType",
                PropertyType::String,
                PropertyValue::Single(
                    definition
                        .required_type
                        .map_or_else(|| "undefined".to_string(), |t| t.to_string()),
                ),
            );
            self.push_property(
                &node,
                "jcr:multiple",
                PropertyType::Boolean,
                PropertyValue::Single(definition.multiple.to_string()),
            );
            self.push_property(
                &node,
                "jcr:protected",
                PropertyType::Boolean,
                PropertyValue::Single(definition.protected.to_string()),
            );
        }
        self.types.insert(node_type.name.clone(), node_type);
    }

    fn check_value(&self, property_type: PropertyType, value: &PropertyValue) -> Result<(), RepositoryError> {
        for v in value.values() {
            let valid = match property_type {
                PropertyType::Long => v.parse::<i64>().is_ok(),
                PropertyType::Double => v.parse::<f64>().is_ok(),
                PropertyType::Boolean => v == "true" || v == "false",
                PropertyType::Reference => self.nodes.contains_key(v),
                PropertyType::Path => v.starts_with('/'),
                _ => true,
            };
            if !valid {
                return Err(RepositoryError::ConstraintViolation(format!(
                    "{v:?} is not a valid {property_type} value"
                )));
            }
        }
        Ok(())
    }
}

/// Split `name[N]` into `(name, N)`; plain names have index 1.
fn split_sibling_index(segment: &str) -> (&str, usize) {
    segment
        .strip_suffix(']')
        .and_then(|rest| rest.rsplit_once('['))
        .and_then(|(name, index)| index.parse().ok().map(|i| (name, i)))
        .unwrap_or((segment, 1))
}

fn child_path(parent_path: &str, name: &str) -> String {
    if parent_path == "/" {
        format!("/{name}")
    } else {
        format!("{parent_path}/{name}")
    }
}

fn validate_name(name: &str) -> Result<(), RepositoryError> {
    if name.is_empty() || name.contains(['/', '[', ']', '*', '|']) {
        return Err(RepositoryError::ConstraintViolation(format!(
            "{name:?} is not a valid item name"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Built-in node types
// ---------------------------------------------------------------------------

fn definition(
    declaring: &str,
    name: &str,
    required_type: Option<PropertyType>,
    multiple: bool,
    protected: bool,
) -> PropertyDefinition {
    PropertyDefinition {
        name: name.to_string(),
        declaring_type: declaring.to_string(),
        required_type,
        multiple,
        protected,
    }
}

fn node_type(name: &str, mixin: bool, supertypes: &[&str], definitions: Vec<PropertyDefinition>) -> NodeType {
    NodeType {
        name: name.to_string(),
        mixin,
        supertypes: supertypes.iter().map(|s| s.to_string()).collect(),
        declared_property_definitions: definitions,
    }
}

fn builtin_types() -> Vec<NodeType> {
    use PropertyType::{Boolean, Date, Name, String as Str};

    vec![
        node_type(
            NT_BASE,
            false,
            &[],
            vec![
                definition(NT_BASE, JCR_MIXIN_TYPES, Some(Name), true, true),
                definition(NT_BASE, JCR_PRIMARY_TYPE, Some(Name), false, true),
            ],
        ),
        node_type(
            NT_UNSTRUCTURED,
            false,
            &[NT_BASE],
            vec![
                definition(NT_UNSTRUCTURED, RESIDUAL, None, true, false),
                definition(NT_UNSTRUCTURED, RESIDUAL, None, false, false),
            ],
        ),
        node_type(
            NT_HIERARCHY_NODE,
            false,
            &[NT_BASE],
            vec![definition(NT_HIERARCHY_NODE, "jcr:created", Some(Date), false, true)],
        ),
        node_type(NT_FOLDER, false, &[NT_HIERARCHY_NODE], vec![]),
        node_type(
            NT_NODE_TYPE,
            false,
            &[NT_BASE],
            vec![
                definition(NT_NODE_TYPE, "jcr:nodeTypeName", Some(Name), false, true),
                definition(NT_NODE_TYPE, "jcr:supertypes", Some(Name), true, true),
                definition(NT_NODE_TYPE, "jcr:isMixin", Some(Boolean), false, true),
            ],
        ),
        node_type(
            NT_PROPERTY_DEFINITION,
            false,
            &[NT_BASE],
            vec![
                definition(NT_PROPERTY_DEFINITION, "jcr:name", Some(Name), false, true),
                definition(NT_PROPERTY_DEFINITION, "jcr:requiredType", Some(Str), false, true),
                definition(NT_PROPERTY_DEFINITION, "jcr:multiple", Some(Boolean), false, true),
                definition(NT_PROPERTY_DEFINITION, "jcr:protected", Some(Boolean), false, true),
            ],
        ),
        node_type(REP_ROOT, false, &[NT_UNSTRUCTURED], vec![]),
        node_type(REP_SYSTEM, false, &[NT_BASE], vec![]),
        node_type(REP_NODE_TYPES, false, &[NT_BASE], vec![]),
        node_type(REP_VERSION_STORAGE, false, &[NT_BASE], vec![]),
        node_type(NT_VERSION_HISTORY, false, &[NT_BASE], vec![]),
        node_type(
            NT_VERSION,
            false,
            &[NT_BASE],
            vec![definition(NT_VERSION, "jcr:created", Some(Date), false, true)],
        ),
        node_type(
            NT_FROZEN_NODE,
            false,
            &[NT_BASE],
            vec![
                definition(NT_FROZEN_NODE, "jcr:frozenPrimaryType", Some(Name), false, true),
                definition(NT_FROZEN_NODE, "jcr:frozenMixinTypes", Some(Name), true, true),
                definition(NT_FROZEN_NODE, "jcr:frozenUuid", Some(Str), false, true),
                definition(NT_FROZEN_NODE, RESIDUAL, None, true, true),
                definition(NT_FROZEN_NODE, RESIDUAL, None, false, true),
            ],
        ),
        node_type(
            MIX_REFERENCEABLE,
            true,
            &[],
            vec![definition(MIX_REFERENCEABLE, JCR_UUID, Some(Str), false, true)],
        ),
        node_type(MIX_VERSIONABLE, true, &[MIX_REFERENCEABLE], vec![]),
        node_type(
            MIX_TITLE,
            true,
            &[],
            vec![
                definition(MIX_TITLE, "jcr:title", Some(Str), false, false),
                definition(MIX_TITLE, "jcr:description", Some(Str), false, false),
            ],
        ),
        node_type(
            MIX_LOCKABLE,
            true,
            &[],
            vec![
                definition(MIX_LOCKABLE, "jcr:lockOwner", Some(Str), false, true),
                definition(MIX_LOCKABLE, "jcr:lockIsDeep", Some(Boolean), false, true),
            ],
        ),
    ]
}

// ---------------------------------------------------------------------------
// MemoryRepository
// ---------------------------------------------------------------------------

/// Thread-safe, in-memory implementation of [`Repository`].
pub struct MemoryRepository {
    inner: Arc<RwLock<Inner>>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::new())),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of sessions that have been opened and not yet logged out.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Register (or replace) a node type.
    pub fn register_node_type(&self, node_type: NodeType) -> Result<(), RepositoryError> {
        let mut inner = write_lock(&self.inner)?;
        inner.register(node_type);
        Ok(())
    }

    /// Create a new version of a `mix:versionable` node and return the
    /// version node.
    pub fn checkin(&self, identifier: &str) -> Result<Node, RepositoryError> {
        let mut inner = write_lock(&self.inner)?;
        let record = inner.record(identifier)?.clone();
        if !inner.has_type(&record, MIX_VERSIONABLE) {
            return Err(RepositoryError::ConstraintViolation(format!(
                "{} is not versionable",
                inner.path_of(identifier)
            )));
        }

        let storage = inner.version_storage.clone();
        let history = match inner.child_id(&storage, identifier) {
            Some(existing) => existing,
            None => inner.insert_node(&storage, identifier, NT_VERSION_HISTORY),
        };
        let count = inner.record(&history)?.children.len();
        let version = inner.insert_node(&history, &format!("1.{count}"), NT_VERSION);
        inner.push_property(
            &version,
            "jcr:created",
            PropertyType::Date,
            PropertyValue::Single(Utc::now().to_rfc3339()),
        );

        let frozen = inner.insert_node(&version, JCR_FROZEN_NODE, NT_FROZEN_NODE);
        inner.push_property(
            &frozen,
            "jcr:frozenPrimaryType",
            PropertyType::Name,
            PropertyValue::Single(record.primary_type.clone()),
        );
        inner.push_property(
            &frozen,
            "jcr:frozenUuid",
            PropertyType::String,
            PropertyValue::Single(record.identifier.clone()),
        );
        if !record.mixins.is_empty() {
            inner.push_property(
                &frozen,
                "jcr:frozenMixinTypes",
                PropertyType::Name,
                PropertyValue::Multiple(record.mixins.clone()),
            );
        }
        for p in record.properties {
            inner.push_property(&frozen, &p.name, p.property_type, p.value);
        }

        tracing::debug!(node = identifier, version = %version, "checked in");
        inner.snapshot(&version)
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MemoryRepository {
    fn login(&self) -> Result<Box<dyn Session>, RepositoryError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
            live: AtomicBool::new(true),
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }
}

fn read_lock(inner: &RwLock<Inner>) -> Result<RwLockReadGuard<'_, Inner>, RepositoryError> {
    inner
        .read()
        .map_err(|_| RepositoryError::Internal("repository lock poisoned".into()))
}

fn write_lock(inner: &RwLock<Inner>) -> Result<RwLockWriteGuard<'_, Inner>, RepositoryError> {
    inner
        .write()
        .map_err(|_| RepositoryError::Internal("repository lock poisoned".into()))
}

// ---------------------------------------------------------------------------
// MemorySession
// ---------------------------------------------------------------------------

/// A session over a [`MemoryRepository`]. Writes are applied immediately.
pub struct MemorySession {
    inner: Arc<RwLock<Inner>>,
    live: AtomicBool,
    open_sessions: Arc<AtomicUsize>,
}

impl MemorySession {
    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, RepositoryError> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(RepositoryError::SessionClosed);
        }
        read_lock(&self.inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, RepositoryError> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(RepositoryError::SessionClosed);
        }
        write_lock(&self.inner)
    }

    fn sibling(&self, version: &Node, offset: isize) -> Result<Option<Node>, RepositoryError> {
        let inner = self.read()?;
        let record = inner.record(&version.identifier)?;
        if record.primary_type != NT_VERSION {
            return Ok(None);
        }
        let Some(history) = record.parent.as_deref() else {
            return Ok(None);
        };
        let siblings = &inner.record(history)?.children;
        let Some(position) = siblings.iter().position(|id| *id == version.identifier) else {
            return Ok(None);
        };
        let target = position as isize + offset;
        if target < 0 {
            return Ok(None);
        }
        match siblings.get(target as usize) {
            Some(id) => inner.snapshot(id).map(Some),
            None => Ok(None),
        }
    }
}

impl Session for MemorySession {
    fn root_node(&self) -> Result<Node, RepositoryError> {
        self.read()?.snapshot(ROOT_IDENTIFIER)
    }

    fn node_by_identifier(&self, identifier: &str) -> Result<Node, RepositoryError> {
        self.read()?.snapshot(identifier)
    }

    fn node_by_path(&self, path: &str) -> Result<Node, RepositoryError> {
        let inner = self.read()?;
        let identifier = inner.resolve_path(path)?;
        inner.snapshot(&identifier)
    }

    fn parent(&self, item: Item<'_>) -> Result<Node, RepositoryError> {
        let inner = self.read()?;
        match item {
            Item::Node(node) => {
                let record = inner.record(&node.identifier)?;
                match record.parent.as_deref() {
                    Some(parent) => inner.snapshot(parent),
                    None => Err(RepositoryError::ItemNotFound(format!(
                        "parent of {}",
                        node.path
                    ))),
                }
            }
            Item::Property(property) => inner.snapshot(&property.parent_identifier),
        }
    }

    fn child_nodes(&self, node: &Node) -> Result<Vec<Node>, RepositoryError> {
        let inner = self.read()?;
        let record = inner.record(&node.identifier)?;
        record.children.iter().map(|id| inner.snapshot(id)).collect()
    }

    fn child_node(&self, node: &Node, name: &str) -> Result<Option<Node>, RepositoryError> {
        let inner = self.read()?;
        inner.record(&node.identifier)?;
        inner
            .child_id(&node.identifier, name)
            .map(|id| inner.snapshot(&id))
            .transpose()
    }

    fn properties(&self, node: &Node) -> Result<Vec<Property>, RepositoryError> {
        self.read()?.property_snapshots(&node.identifier)
    }

    fn property(&self, node: &Node, name: &str) -> Result<Option<Property>, RepositoryError> {
        Ok(self
            .read()?
            .property_snapshots(&node.identifier)?
            .into_iter()
            .find(|p| p.name == name))
    }

    fn node_type(&self, name: &str) -> Result<NodeType, RepositoryError> {
        self.read()?
            .types
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::NoSuchNodeType(name.to_string()))
    }

    fn property_definition(&self, property: &Property) -> Result<PropertyDefinition, RepositoryError> {
        let inner = self.read()?;
        let record = inner.record(&property.parent_identifier)?;
        inner
            .definition_for(record, &property.name, property.is_multiple())
            .ok_or_else(|| {
                RepositoryError::ConstraintViolation(format!(
                    "no definition governs {}",
                    property.path
                ))
            })
    }

    fn versions(&self, node: &Node) -> Result<Vec<Node>, RepositoryError> {
        let inner = self.read()?;
        inner.record(&node.identifier)?;
        let Some(history) = inner.child_id(&inner.version_storage, &node.identifier) else {
            return Ok(Vec::new());
        };
        inner
            .record(&history)?
            .children
            .iter()
            .map(|id| inner.snapshot(id))
            .collect()
    }

    fn linear_predecessor(&self, version: &Node) -> Result<Option<Node>, RepositoryError> {
        self.sibling(version, -1)
    }

    fn linear_successor(&self, version: &Node) -> Result<Option<Node>, RepositoryError> {
        self.sibling(version, 1)
    }

    fn frozen_node(&self, version: &Node) -> Result<Option<Node>, RepositoryError> {
        let inner = self.read()?;
        if inner.record(&version.identifier)?.primary_type != NT_VERSION {
            return Ok(None);
        }
        inner
            .child_id(&version.identifier, JCR_FROZEN_NODE)
            .map(|id| inner.snapshot(&id))
            .transpose()
    }

    fn add_node(&self, parent: &Node, name: &str, primary_type: &str) -> Result<Node, RepositoryError> {
        validate_name(name)?;
        let mut inner = self.write()?;
        let parent_record = inner.record(&parent.identifier)?;
        if inner.is_read_only(parent_record) {
            return Err(RepositoryError::Protected(parent.path.clone()));
        }
        if inner.child_id(&parent.identifier, name).is_some() {
            return Err(RepositoryError::ItemExists(child_path(&parent.path, name)));
        }
        let node_type = inner
            .types
            .get(primary_type)
            .ok_or_else(|| RepositoryError::NoSuchNodeType(primary_type.to_string()))?;
        if node_type.mixin {
            return Err(RepositoryError::ConstraintViolation(format!(
                "{primary_type} is a mixin and cannot be a primary type"
            )));
        }
        let identifier = inner.insert_node(&parent.identifier, name, primary_type);
        inner.snapshot(&identifier)
    }

    fn remove_node(&self, node: &Node) -> Result<(), RepositoryError> {
        let mut inner = self.write()?;
        let record = inner.record(&node.identifier)?;
        let Some(parent) = record.parent.clone() else {
            return Err(RepositoryError::ConstraintViolation(
                "the root node cannot be removed".into(),
            ));
        };
        if inner.is_read_only(record) || inner.is_read_only(inner.record(&parent)?) {
            return Err(RepositoryError::Protected(node.path.clone()));
        }
        inner.record_mut(&parent)?.children.retain(|id| *id != node.identifier);
        inner.remove_subtree(&node.identifier);
        Ok(())
    }

    fn set_property(
        &self,
        node: &Node,
        name: &str,
        property_type: PropertyType,
        value: PropertyValue,
    ) -> Result<Property, RepositoryError> {
        validate_name(name)?;
        let mut inner = self.write()?;
        let record = inner.record(&node.identifier)?;
        let path = child_path(&inner.path_of(&node.identifier), name);
        if inner.is_read_only(record) {
            return Err(RepositoryError::Protected(path));
        }
        let multiple = matches!(value, PropertyValue::Multiple(_));
        let definition = inner
            .definition_for(record, name, multiple)
            .ok_or_else(|| RepositoryError::ConstraintViolation(format!("no definition allows {path}")))?;
        if definition.protected {
            return Err(RepositoryError::Protected(path));
        }
        if !definition.is_residual() && definition.multiple != multiple {
            return Err(RepositoryError::ConstraintViolation(format!(
                "{path} must be {}",
                if definition.multiple { "multi-valued" } else { "single-valued" }
            )));
        }
        if let Some(required) = definition.required_type {
            if required != property_type {
                return Err(RepositoryError::ConstraintViolation(format!(
                    "{path} requires type {required}, got {property_type}"
                )));
            }
        }
        inner.check_value(property_type, &value)?;

        let record = inner.record_mut(&node.identifier)?;
        let stored = PropertyRecord {
            name: name.to_string(),
            property_type,
            value: value.clone(),
        };
        match record.properties.iter_mut().find(|p| p.name == name) {
            Some(existing) => *existing = stored,
            None => record.properties.push(stored),
        }
        Ok(Property {
            name: name.to_string(),
            path,
            parent_identifier: node.identifier.clone(),
            property_type,
            value,
        })
    }

    fn remove_property(&self, node: &Node, name: &str) -> Result<(), RepositoryError> {
        let mut inner = self.write()?;
        let record = inner.record(&node.identifier)?;
        let path = child_path(&inner.path_of(&node.identifier), name);
        let Some(stored) = record.properties.iter().find(|p| p.name == name) else {
            let synthesized = [JCR_PRIMARY_TYPE, JCR_MIXIN_TYPES, JCR_UUID];
            return Err(if synthesized.contains(&name) {
                RepositoryError::Protected(path)
            } else {
                RepositoryError::ItemNotFound(path)
            });
        };
        let multiple = matches!(stored.value, PropertyValue::Multiple(_));
        let protected = inner.is_read_only(record)
            || inner
                .definition_for(record, name, multiple)
                .is_some_and(|d| d.protected);
        if protected {
            return Err(RepositoryError::Protected(path));
        }
        inner
            .record_mut(&node.identifier)?
            .properties
            .retain(|p| p.name != name);
        Ok(())
    }

    fn can_modify_mixins(&self, node: &Node) -> Result<bool, RepositoryError> {
        let inner = self.read()?;
        let record = inner.record(&node.identifier)?;
        Ok(!inner.is_read_only(record))
    }

    fn add_mixin(&self, node: &Node, mixin: &str) -> Result<(), RepositoryError> {
        let mut inner = self.write()?;
        let record = inner.record(&node.identifier)?;
        if inner.is_read_only(record) {
            return Err(RepositoryError::Protected(node.path.clone()));
        }
        let node_type = inner
            .types
            .get(mixin)
            .ok_or_else(|| RepositoryError::NoSuchNodeType(mixin.to_string()))?;
        if !node_type.mixin {
            return Err(RepositoryError::ConstraintViolation(format!("{mixin} is not a mixin type")));
        }
        if record.mixins.iter().any(|m| m == mixin) {
            return Err(RepositoryError::ItemExists(format!("{} on {}", mixin, node.path)));
        }
        inner.record_mut(&node.identifier)?.mixins.push(mixin.to_string());
        Ok(())
    }

    fn remove_mixin(&self, node: &Node, mixin: &str) -> Result<(), RepositoryError> {
        let mut inner = self.write()?;
        let record = inner.record(&node.identifier)?;
        if inner.is_read_only(record) {
            return Err(RepositoryError::Protected(node.path.clone()));
        }
        if !record.mixins.iter().any(|m| m == mixin) {
            return Err(RepositoryError::ItemNotFound(format!("{} on {}", mixin, node.path)));
        }
        inner.record_mut(&node.identifier)?.mixins.retain(|m| m != mixin);

        // Properties only the removed mixin allowed go with it.
        let record = inner.record(&node.identifier)?;
        let orphaned: Vec<String> = record
            .properties
            .iter()
            .filter(|p| {
                let multiple = matches!(p.value, PropertyValue::Multiple(_));
                inner.definition_for(record, &p.name, multiple).is_none()
            })
            .map(|p| p.name.clone())
            .collect();
        inner
            .record_mut(&node.identifier)?
            .properties
            .retain(|p| !orphaned.contains(&p.name));
        Ok(())
    }

    fn save(&self) -> Result<(), RepositoryError> {
        if !self.live.load(Ordering::SeqCst) {
            return Err(RepositoryError::SessionClosed);
        }
        Ok(())
    }

    fn logout(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.logout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(repo: &MemoryRepository) -> Box<dyn Session> {
        repo.login().unwrap()
    }

    #[test]
    fn root_and_system_nodes_exist() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        assert_eq!(root.identifier, ROOT_IDENTIFIER);
        assert_eq!(root.path, "/");
        assert_eq!(root.name, "");
        assert_eq!(root.primary_type, REP_ROOT);

        let system = s.node_by_path("/jcr:system").unwrap();
        assert_eq!(system.primary_type, REP_SYSTEM);
        let base_type = s.node_by_path("/jcr:system/jcr:nodeTypes/nt:base").unwrap();
        assert_eq!(base_type.primary_type, NT_NODE_TYPE);
    }

    #[test]
    fn property_definitions_are_same_name_siblings() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let first = s
            .node_by_path("/jcr:system/jcr:nodeTypes/nt:base/jcr:propertyDefinition")
            .unwrap();
        let second = s
            .node_by_path("/jcr:system/jcr:nodeTypes/nt:base/jcr:propertyDefinition[2]")
            .unwrap();
        assert_eq!(first.name, JCR_PROPERTY_DEFINITION);
        assert_eq!(second.name, JCR_PROPERTY_DEFINITION);
        assert_eq!(
            second.path,
            "/jcr:system/jcr:nodeTypes/nt:base/jcr:propertyDefinition[2]"
        );
        let name = s.property(&second, "jcr:name").unwrap().unwrap();
        assert_eq!(name.value, PropertyValue::Single(JCR_PRIMARY_TYPE.into()));
        assert!(s
            .node_by_path("/jcr:system/jcr:nodeTypes/nt:base/jcr:propertyDefinition[3]")
            .is_err());

        let base_type = s.node_by_path("/jcr:system/jcr:nodeTypes/nt:base").unwrap();
        assert!(matches!(
            s.add_node(&base_type, "extra", NT_UNSTRUCTURED),
            Err(RepositoryError::Protected(_))
        ));
    }

    #[test]
    fn root_has_no_parent() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        assert!(matches!(
            s.parent(Item::Node(&root)),
            Err(RepositoryError::ItemNotFound(_))
        ));
    }

    #[test]
    fn add_find_and_remove_nodes() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        let site = s.add_node(&root, "site", NT_UNSTRUCTURED).unwrap();
        let page = s.add_node(&site, "page", NT_UNSTRUCTURED).unwrap();
        assert_eq!(page.path, "/site/page");
        assert_eq!(s.node_by_path("/site/page").unwrap(), page);
        assert_eq!(s.parent(Item::Node(&page)).unwrap(), site);

        assert!(matches!(
            s.add_node(&root, "site", NT_UNSTRUCTURED),
            Err(RepositoryError::ItemExists(_))
        ));
        assert!(matches!(
            s.add_node(&root, "x", "nt:nope"),
            Err(RepositoryError::NoSuchNodeType(_))
        ));
        assert!(matches!(
            s.add_node(&root, "x", MIX_TITLE),
            Err(RepositoryError::ConstraintViolation(_))
        ));

        s.remove_node(&site).unwrap();
        assert!(s.node_by_identifier(&page.identifier).is_err());
        assert!(s.child_node(&root, "site").unwrap().is_none());
    }

    #[test]
    fn synthesized_properties_are_protected() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        let names: Vec<String> = s.properties(&root).unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec![JCR_PRIMARY_TYPE.to_string()]);
        assert!(matches!(
            s.set_property(&root, JCR_PRIMARY_TYPE, PropertyType::Name, PropertyValue::Single("x".into())),
            Err(RepositoryError::Protected(_))
        ));
        assert!(matches!(
            s.remove_property(&root, JCR_PRIMARY_TYPE),
            Err(RepositoryError::Protected(_))
        ));
    }

    #[test]
    fn property_definitions_resolve_named_before_residual() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        let node = s.add_node(&root, "n", NT_UNSTRUCTURED).unwrap();
        let single = s
            .set_property(&node, "title", PropertyType::String, PropertyValue::Single("t".into()))
            .unwrap();
        let multi = s
            .set_property(
                &node,
                "tags",
                PropertyType::String,
                PropertyValue::Multiple(vec!["a".into(), "b".into()]),
            )
            .unwrap();

        let def = s.property_definition(&single).unwrap();
        assert!(def.is_residual());
        assert!(!def.multiple);
        assert!(s.property_definition(&multi).unwrap().multiple);

        let primary = s.property(&node, JCR_PRIMARY_TYPE).unwrap().unwrap();
        let def = s.property_definition(&primary).unwrap();
        assert_eq!(def.declaring_type, NT_BASE);
        assert!(def.protected);
    }

    #[test]
    fn value_constraints_are_checked() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        let node = s.add_node(&root, "n", NT_UNSTRUCTURED).unwrap();
        assert!(matches!(
            s.set_property(&node, "count", PropertyType::Long, PropertyValue::Single("ten".into())),
            Err(RepositoryError::ConstraintViolation(_))
        ));
        assert!(matches!(
            s.set_property(&node, "ref", PropertyType::Reference, PropertyValue::Single("missing".into())),
            Err(RepositoryError::ConstraintViolation(_))
        ));
        s.set_property(
            &node,
            "ref",
            PropertyType::Reference,
            PropertyValue::Single(root.identifier.clone()),
        )
        .unwrap();
    }

    #[test]
    fn mixins_add_and_remove() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        let system = s.node_by_path("/jcr:system").unwrap();
        let node = s.add_node(&system, "titled", REP_SYSTEM).unwrap();

        assert!(matches!(
            s.set_property(&node, "jcr:title", PropertyType::String, PropertyValue::Single("t".into())),
            Err(RepositoryError::ConstraintViolation(_))
        ));
        s.add_mixin(&node, MIX_TITLE).unwrap();
        s.set_property(&node, "jcr:title", PropertyType::String, PropertyValue::Single("t".into()))
            .unwrap();
        assert!(matches!(s.add_mixin(&node, MIX_TITLE), Err(RepositoryError::ItemExists(_))));
        assert!(matches!(s.add_mixin(&node, NT_FOLDER), Err(RepositoryError::ConstraintViolation(_))));

        let node = s.node_by_identifier(&node.identifier).unwrap();
        assert_eq!(node.mixin_types, vec![MIX_TITLE.to_string()]);
        s.remove_mixin(&node, MIX_TITLE).unwrap();
        assert!(s.property(&node, "jcr:title").unwrap().is_none());
        assert!(matches!(s.remove_mixin(&node, MIX_TITLE), Err(RepositoryError::ItemNotFound(_))));
        assert!(s.can_modify_mixins(&root).unwrap());
    }

    #[test]
    fn checkin_builds_linear_history() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        let root = s.root_node().unwrap();
        let doc = s.add_node(&root, "doc", NT_UNSTRUCTURED).unwrap();
        assert!(repo.checkin(&doc.identifier).is_err());
        s.add_mixin(&doc, MIX_VERSIONABLE).unwrap();
        s.set_property(&doc, "body", PropertyType::String, PropertyValue::Single("v1".into()))
            .unwrap();

        let v1 = repo.checkin(&doc.identifier).unwrap();
        let v2 = repo.checkin(&doc.identifier).unwrap();
        assert_eq!(v1.name, "1.0");
        assert_eq!(v2.name, "1.1");
        assert_eq!(s.versions(&doc).unwrap(), vec![v1.clone(), v2.clone()]);
        assert_eq!(s.linear_predecessor(&v2).unwrap(), Some(v1.clone()));
        assert_eq!(s.linear_successor(&v1).unwrap(), Some(v2.clone()));
        assert_eq!(s.linear_predecessor(&v1).unwrap(), None);
        assert_eq!(s.linear_successor(&v2).unwrap(), None);

        let frozen = s.frozen_node(&v1).unwrap().unwrap();
        assert_eq!(frozen.primary_type, NT_FROZEN_NODE);
        let body = s.property(&frozen, "body").unwrap().unwrap();
        assert_eq!(body.value, PropertyValue::Single("v1".into()));
        assert!(!s.can_modify_mixins(&frozen).unwrap());
        assert!(matches!(
            s.add_node(&frozen, "x", NT_UNSTRUCTURED),
            Err(RepositoryError::Protected(_))
        ));
    }

    #[test]
    fn closed_session_rejects_calls() {
        let repo = MemoryRepository::new();
        let s = session(&repo);
        assert_eq!(repo.open_sessions(), 1);
        s.logout();
        s.logout();
        assert_eq!(repo.open_sessions(), 0);
        assert_eq!(s.root_node(), Err(RepositoryError::SessionClosed));
        assert_eq!(s.save(), Err(RepositoryError::SessionClosed));
    }
}
