use serde_json::Value;

use super::{not_found, require_name, Element, ElementAccessor, SubElementContainer, SubElementKind};
use crate::error::{ProjectionError, RepositoryError, Result};
use crate::names;
use crate::projection::Projection;
use crate::repository::Node;
use crate::representation::{MixinRepresentation, OrderedMap};
use crate::uri;

/// Serves a node's `mixins` container. The element name is the mixin type;
/// create payloads are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct MixinsAccessor;

impl MixinsAccessor {
    fn container_uri(node: &Node) -> String {
        uri::child_uri(&uri::id_uri(&node.identifier), SubElementKind::Mixins.as_str(), false)
    }

    fn require_modifiable(ctx: &Projection<'_>, node: &Node) -> Result<()> {
        if ctx.session.can_modify_mixins(node)? {
            Ok(())
        } else {
            Err(ProjectionError::MethodNotAllowed(format!(
                "mixins of {} cannot be changed",
                node.path
            )))
        }
    }
}

impl ElementAccessor for MixinsAccessor {
    fn kind(&self) -> SubElementKind {
        SubElementKind::Mixins
    }

    fn get_container(&self, ctx: &Projection<'_>, node: &Node) -> Result<SubElementContainer> {
        let container_uri = Self::container_uri(node);
        let mut entries = OrderedMap::new();
        for mixin in &node.mixin_types {
            let representation = MixinRepresentation::build(ctx, &container_uri, mixin);
            entries.insert(names::escape(mixin), Element::Mixin(representation));
        }
        Ok(SubElementContainer::new(ctx, node, self.kind(), entries))
    }

    fn get_element(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element> {
        let mixin = names::unescape(name);
        if !node.mixin_types.contains(&mixin) {
            return Err(not_found(self.kind(), node, &mixin));
        }
        let representation = MixinRepresentation::build(ctx, &Self::container_uri(node), &mixin);
        Ok(Element::Mixin(representation))
    }

    fn create(
        &self,
        ctx: &Projection<'_>,
        node: &Node,
        name: &str,
        _data: Option<&Value>,
    ) -> Result<Element> {
        require_name(name)?;
        let mixin = names::unescape(name);
        Self::require_modifiable(ctx, node)?;
        if node.mixin_types.contains(&mixin) {
            return Err(ProjectionError::Conflict(format!(
                "{mixin} is already applied to {}",
                node.path
            )));
        }
        match ctx.session.node_type(&mixin) {
            Ok(t) if t.mixin => {}
            Ok(_) => {
                return Err(ProjectionError::BadRequest(format!("{mixin} is not a mixin type")))
            }
            Err(RepositoryError::NoSuchNodeType(_)) => {
                return Err(ProjectionError::BadRequest(format!("unknown mixin type {mixin}")))
            }
            Err(e) => return Err(e.into()),
        }

        ctx.session.add_mixin(node, &mixin)?;
        ctx.session.save()?;
        tracing::debug!(node = %node.path, %mixin, "mixin added");

        let representation = MixinRepresentation::build(ctx, &Self::container_uri(node), &mixin);
        Ok(Element::Mixin(representation))
    }

    fn delete(&self, ctx: &Projection<'_>, node: &Node, name: &str) -> Result<Element> {
        require_name(name)?;
        let mixin = names::unescape(name);
        Self::require_modifiable(ctx, node)?;
        if !node.mixin_types.contains(&mixin) {
            return Err(not_found(self.kind(), node, &mixin));
        }

        let representation = MixinRepresentation::build(ctx, &Self::container_uri(node), &mixin);
        ctx.session.remove_mixin(node, &mixin)?;
        ctx.session.save()?;
        tracing::debug!(node = %node.path, %mixin, "mixin removed");

        Ok(Element::Mixin(representation))
    }
}
