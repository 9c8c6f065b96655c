use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::properties::PropertyInput;
use super::{not_found, parse_payload, require_name, Element, ElementAccessor, SubElementContainer, SubElementKind};
use crate::error::{ProjectionError, RepositoryError, Result};
use crate::names;
use crate::projection::Projection;
use crate::repository::{Node, PropertyType, PropertyValue};
use crate::representation::{NodeRepresentation, OrderedMap};

/// Primary type of a created child when the payload names none.
const DEFAULT_PRIMARY_TYPE: &str = "nt:unstructured";

/// Serves a node's `children` container.
///
/// Child entries are built at depth 1 when full children are requested,
/// otherwise at depth 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildrenAccessor;

/// Payload describing a subtree to create.
///
/// ```json
/// {"type": "nt:unstructured", "mixins": ["mix:title"],
///  "properties": {"jcr:title": "Home"}, "children": {"teaser": {}}}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct NodeData {
    #[serde(rename = "type")]
    primary_type: Option<String>,
    mixins: Vec<String>,
    properties: BTreeMap<String, PropertyInput>,
    children: BTreeMap<String, NodeData>,
}

/// [`NodeData`] with every type checked and every value converted.
struct ValidatedNode {
    primary_type: String,
    mixins: Vec<String>,
    properties: Vec<(String, PropertyType, PropertyValue)>,
    children: Vec<(String, ValidatedNode)>,
}

impl NodeData {
    fn validate(&self, ctx: &Projection<'_>) -> Result<ValidatedNode> {
        let primary_type = self
            .primary_type
            .clone()
            .unwrap_or_else(|| DEFAULT_PRIMARY_TYPE.to_string());
        match ctx.session.node_type(&primary_type) {
            Ok(t) if t.mixin => {
                return Err(ProjectionError::BadRequest(format!(
                    "{primary_type} is a mixin, not a primary type"
                )))
            }
            Ok(_) => {}
            Err(RepositoryError::NoSuchNodeType(t)) => {
                return Err(ProjectionError::BadRequest(format!("unknown node type {t}")))
            }
            Err(e) => return Err(e.into()),
        }

        for mixin in &self.mixins {
            match ctx.session.node_type(mixin) {
                Ok(t) if t.mixin => {}
                Ok(_) => {
                    return Err(ProjectionError::BadRequest(format!("{mixin} is not a mixin")))
                }
                Err(RepositoryError::NoSuchNodeType(t)) => {
                    return Err(ProjectionError::BadRequest(format!("unknown mixin {t}")))
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut properties = Vec::with_capacity(self.properties.len());
        for (name, input) in &self.properties {
            let (property_type, value) = input.resolve(None)?;
            properties.push((name.clone(), property_type, value));
        }

        let mut children = Vec::with_capacity(self.children.len());
        for (name, child) in &self.children {
            if name.is_empty() {
                return Err(ProjectionError::BadRequest("child names must not be empty".into()));
            }
            children.push((name.clone(), child.validate(ctx)?));
        }

        Ok(ValidatedNode {
            primary_type,
            mixins: self.mixins.clone(),
            properties,
            children,
        })
    }
}

impl ValidatedNode {
    fn write(&self, ctx: &Projection<'_>, parent: &Node, name: &str) -> Result<Node> {
        let mut node = ctx.session.add_node(parent, name, &self.primary_type)?;
        for mixin in &self.mixins {
            ctx.session.add_mixin(&node, mixin)?;
        }
        if !self.mixins.is_empty() {
            node = ctx.session.node_by_identifier(&node.identifier)?;
        }
        for (property, property_type, value) in &self.properties {
            ctx.session
                .set_property(&node, property, *property_type, value.clone())?;
        }
        for (child_name, child) in &self.children {
            child.write(ctx, &node, child_name)?;
        }
        Ok(node)
    }
}

impl ElementAccessor for ChildrenAccessor {
    fn kind(&self) -> SubElementKind {
        SubElementKind::Children
    }

    fn get_container(&self, ctx: &Projection<'_>, node: &Node) -> Result<SubElementContainer> {
        let depth = ctx.options.child_depth();
        let mut entries = OrderedMap::new();
        for child in ctx.session.child_nodes(node)? {
            let representation = NodeRepresentation::build(ctx, &child, depth)?;
            entries.insert(names::escape_leaf(&child.path), Element::Node(representation));
        }
        Ok(SubElementContainer::new(ctx, node, self.kind(), entries))
    }

    fn get_element(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element> {
        let child = ctx
            .session
            .child_node(node, &names::unescape_segment(name))?
            .ok_or_else(|| not_found(self.kind(), node, name))?;
        let representation = NodeRepresentation::build(ctx, &child, ctx.options.child_depth())?;
        Ok(Element::Node(representation))
    }

    fn create(
        &self,
        ctx: &Projection<'_>,
        node: &Node,
        name: &str,
        data: Option<&Value>,
    ) -> Result<Element> {
        require_name(name)?;
        if names::split_index(name).1 > 1 {
            return Err(ProjectionError::BadRequest(format!(
                "cannot create {name}: a new child cannot take a same-name index"
            )));
        }
        let name = names::unescape_segment(name);
        if ctx.session.child_node(node, &name)?.is_some() {
            return Err(ProjectionError::Conflict(format!(
                "{} already has a child named {name}",
                node.path
            )));
        }

        let payload: NodeData = match data {
            Some(data) => parse_payload(data)?,
            None => NodeData::default(),
        };
        let validated = payload.validate(ctx)?;

        let child = validated.write(ctx, node, &name)?;
        ctx.session.save()?;
        tracing::debug!(parent = %node.path, child = %child.path, "child node created");

        let representation = NodeRepresentation::build(ctx, &child, ctx.options.child_depth())?;
        Ok(Element::Node(representation))
    }

    fn delete(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element> {
        require_name(name)?;
        let name = names::unescape_segment(name);
        let child = ctx
            .session
            .child_node(node, &name)?
            .ok_or_else(|| not_found(self.kind(), node, &name))?;

        let representation = NodeRepresentation::build(ctx, &child, ctx.options.child_depth())?;
        ctx.session.remove_node(&child)?;
        ctx.session.save()?;
        tracing::debug!(parent = %node.path, child = %child.path, "child node removed");

        Ok(Element::Node(representation))
    }
}
