use serde_json::Value;

use super::{not_found, Element, ElementAccessor, SubElementContainer, SubElementKind};
use crate::error::{ProjectionError, Result};
use crate::names;
use crate::projection::Projection;
use crate::repository::Node;
use crate::representation::{NodeRepresentation, OrderedMap};

/// Serves a node's `versions` container. Versions are created by checking a
/// node in, never through this accessor, so writes are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionsAccessor;

fn read_only() -> ProjectionError {
    ProjectionError::MethodNotAllowed("versions are read-only".into())
}

impl ElementAccessor for VersionsAccessor {
    fn kind(&self) -> SubElementKind {
        SubElementKind::Versions
    }

    fn get_container(&self, ctx: &Projection<'_>, node: &Node) -> Result<SubElementContainer> {
        let mut entries = OrderedMap::new();
        for version in ctx.session.versions(node)? {
            let representation = NodeRepresentation::build_version(ctx, &version)?;
            entries.insert(names::escape(&version.name), Element::Node(representation));
        }
        Ok(SubElementContainer::new(ctx, node, self.kind(), entries))
    }

    fn get_element(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element> {
        let wanted = names::unescape(name);
        let version = ctx
            .session
            .versions(node)?
            .into_iter()
            .find(|v| v.name == wanted)
            .ok_or_else(|| not_found(self.kind(), node, &wanted))?;
        Ok(Element::Node(NodeRepresentation::build_version(ctx, &version)?))
    }

    fn create(
        &self,
        _ctx: &Projection<'_>,
        _node: &Node,
        _name: &str,
        _data: Option<&Value>,
    ) -> Result<Element> {
        Err(read_only())
    }

    fn delete(&self, _ctx: &Projection<'_>, _node: &Node, _name: &str) -> Result<Element> {
        Err(read_only())
    }
}
