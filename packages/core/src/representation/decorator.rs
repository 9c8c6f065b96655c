//! Link and reference decoration.

use serde::Serialize;

use super::{rel, Href, Link, NodeRepresentation, OrderedMap};
use crate::config::LinkOptions;
use crate::error::{RepositoryError, Result};
use crate::names;
use crate::projection::Projection;
use crate::repository::{Item, Node, Property, REFERENCES_SCOPE};
use crate::uri;

/// Name of the definition nodes below a node type.
const PROPERTY_DEFINITION: &str = "jcr:propertyDefinition";

/// The `_links` block of a representation plus embedded reference targets.
///
/// Adding a link under an existing relation replaces it, except for `target`,
/// which accumulates every reference target in value order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decorator {
    #[serde(skip)]
    options: LinkOptions,
    #[serde(rename = "_links", skip_serializing_if = "OrderedMap::is_empty")]
    links: OrderedMap<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    references: Option<OrderedMap<NodeRepresentation>>,
}

impl Decorator {
    pub fn new(options: LinkOptions) -> Self {
        Self {
            options,
            links: OrderedMap::new(),
            references: None,
        }
    }

    pub fn options(&self) -> LinkOptions {
        self.options
    }

    pub fn links(&self) -> &OrderedMap<Link> {
        &self.links
    }

    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.get(rel)
    }

    /// The `self` URI, if links were emitted.
    pub fn uri(&self) -> Option<&str> {
        self.links.get(rel::SELF).and_then(Link::uri)
    }

    /// Embedded reference targets keyed by node identifier.
    pub fn references(&self) -> Option<&OrderedMap<NodeRepresentation>> {
        self.references.as_ref()
    }

    /// Set a link, replacing any previous link with the same relation.
    pub fn add_link(&mut self, rel: &str, href: impl Into<String>) {
        self.links.insert(rel, Link::new(rel, href));
    }

    /// Append a URI to the `target` list.
    pub fn add_target(&mut self, href: impl Into<String>) {
        let href = href.into();
        match self.links.get_mut(rel::TARGET) {
            Some(Link {
                href: Href::Many(uris),
                ..
            }) => uris.push(href),
            Some(link) => {
                let mut uris: Vec<String> = link.uris().into_iter().map(str::to_string).collect();
                uris.push(href);
                link.href = Href::Many(uris);
            }
            None => {
                self.links.insert(
                    rel::TARGET,
                    Link {
                        rel: rel::TARGET.to_string(),
                        href: Href::Many(vec![href]),
                    },
                );
            }
        }
    }

    /// `self` and `absolute` links for a relative URI.
    pub fn init_with(&mut self, ctx: &Projection<'_>, relative_uri: &str) {
        if !self.options.output_links {
            return;
        }
        self.add_link(rel::SELF, relative_uri);
        self.add_link(rel::ABSOLUTE, uri::absolute_uri(ctx.base_url, relative_uri));
    }

    /// Base links of any item: `self`, `absolute`, `type`, `parent`, `path`.
    ///
    /// The root node has no parent; its `parent` link points at itself.
    pub fn init_item(&mut self, ctx: &Projection<'_>, item: Item<'_>) -> Result<()> {
        if !self.options.output_links {
            return Ok(());
        }
        self.init_with(ctx, &uri::item_uri(&item));

        let type_path = match item {
            Item::Node(node) => names::escape(&node.primary_type),
            Item::Property(property) => property_type_path(ctx, property)?,
        };
        self.add_link(rel::TYPE, uri::type_uri(&type_path));

        let parent = parent_identifier(ctx, item)?;
        self.add_link(rel::PARENT, uri::id_uri(&parent));
        self.add_link(rel::PATH, uri::item_path_uri(&item));
        Ok(())
    }

    /// Links to the node's sub-element containers that have entries.
    pub fn init_node(&mut self, node_uri: &str, present: &[&str]) {
        if !self.options.output_links {
            return;
        }
        for container in present {
            self.add_link(container, uri::child_uri(node_uri, container, false));
        }
    }

    /// `target` links and embedded targets of a reference property.
    ///
    /// Values are resolved by path for path-typed properties and by
    /// identifier otherwise. A target is embedded only when the permission
    /// check grants [`REFERENCES_SCOPE`] on it; a denied target keeps its
    /// `target` link. Embedded nodes never resolve their own references.
    pub fn init_property(&mut self, ctx: &Projection<'_>, property: &Property) -> Result<()> {
        let output_links = self.options.output_links;
        let resolve = self.options.resolve_references;
        if !property.is_reference() || !(output_links || resolve) {
            return Ok(());
        }

        for value in property.value.values() {
            if output_links {
                let target = if property.is_path() {
                    uri::path_uri(&names::escape_path(value), value == "/")
                } else {
                    uri::id_uri(value)
                };
                self.add_target(target);
            }
            if resolve {
                self.embed(ctx, property, value)?;
            }
        }
        Ok(())
    }

    fn embed(&mut self, ctx: &Projection<'_>, property: &Property, value: &str) -> Result<()> {
        let target = if property.is_path() {
            ctx.session.node_by_path(value)?
        } else {
            ctx.session.node_by_identifier(value)?
        };

        if !ctx.permissions.has_permission(REFERENCES_SCOPE, &target) {
            tracing::debug!(
                property = %property.path,
                target = %target.path,
                "reference target not embedded: permission denied"
            );
            return Ok(());
        }

        let embedded = ctx.with_options(self.options.for_embedded());
        let representation =
            NodeRepresentation::build(&embedded, &target, self.options.child_depth())?;
        self.references
            .get_or_insert_with(OrderedMap::new)
            .insert(target.identifier.clone(), representation);
        Ok(())
    }

    /// Links of a mixin entry inside a node's mixins container.
    pub fn init_mixin(&mut self, ctx: &Projection<'_>, container_uri: &str, mixin: &str) {
        if !self.options.output_links {
            return;
        }
        self.init_with(ctx, &uri::child_uri(container_uri, mixin, true));
        self.add_link(rel::TYPE, uri::type_uri(&names::escape(mixin)));
    }

    /// `previous`, `next` and `node-at-version` links of a version node.
    pub fn init_version(&mut self, ctx: &Projection<'_>, version: &Node) -> Result<()> {
        if !self.options.output_links {
            return Ok(());
        }
        if let Some(previous) = ctx.session.linear_predecessor(version)? {
            self.add_link(rel::PREVIOUS, uri::id_uri(&previous.identifier));
        }
        if let Some(next) = ctx.session.linear_successor(version)? {
            self.add_link(rel::NEXT, uri::id_uri(&next.identifier));
        }
        if let Some(frozen) = ctx.session.frozen_node(version)? {
            self.add_link(rel::NODE_AT_VERSION, uri::id_uri(&frozen.identifier));
        }
        Ok(())
    }

    /// Links of a sub-element container: itself and its owning node.
    pub fn init_container(&mut self, ctx: &Projection<'_>, node_uri: &str, container: &str) {
        if !self.options.output_links {
            return;
        }
        self.init_with(ctx, &uri::child_uri(node_uri, container, false));
        self.add_link(rel::PARENT, node_uri);
    }
}

fn parent_identifier(ctx: &Projection<'_>, item: Item<'_>) -> Result<String> {
    match ctx.session.parent(item) {
        Ok(parent) => Ok(parent.identifier),
        Err(RepositoryError::ItemNotFound(path)) => match item {
            Item::Node(node) => Ok(node.identifier.clone()),
            Item::Property(_) => Err(RepositoryError::ItemNotFound(path).into()),
        },
        Err(e) => Err(e.into()),
    }
}

/// Escaped path, relative to the node-types folder, of the definition that
/// governs `property`.
///
/// Definitions are stored as same-name siblings below their declaring type,
/// so the segment carries a `--N` index when the type declares more than one
/// and the governing definition is not the first. The index is the 1-based
/// position of the governing definition in declaration order; if it cannot
/// be found verbatim, the first definition with the same name is used.
pub fn property_type_path(ctx: &Projection<'_>, property: &Property) -> Result<String> {
    let definition = ctx.session.property_definition(property)?;
    let declaring = ctx.session.node_type(&definition.declaring_type)?;
    let declared = &declaring.declared_property_definitions;

    let index = if declared.len() > 1 {
        declared
            .iter()
            .position(|d| *d == definition)
            .or_else(|| declared.iter().position(|d| d.name == definition.name))
            .map_or(1, |i| i + 1)
    } else {
        1
    };

    Ok(uri::child_uri(
        &names::escape(&declaring.name),
        &names::escape_indexed(PROPERTY_DEFINITION, index),
        false,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_replace_by_relation() {
        let mut decorator = Decorator::new(LinkOptions::default());
        decorator.add_link(rel::SELF, "/a");
        decorator.add_link(rel::PARENT, "/p");
        decorator.add_link(rel::SELF, "/b");
        assert_eq!(decorator.uri(), Some("/b"));
        assert_eq!(
            decorator.links().keys().collect::<Vec<_>>(),
            vec![rel::SELF, rel::PARENT]
        );
    }

    #[test]
    fn targets_accumulate() {
        let mut decorator = Decorator::new(LinkOptions::default());
        decorator.add_target("/api/nodes/a");
        decorator.add_target("/api/nodes/b");
        let target = decorator.link(rel::TARGET).unwrap();
        assert_eq!(target.uris(), vec!["/api/nodes/a", "/api/nodes/b"]);
    }

    #[test]
    fn empty_decorator_serializes_to_nothing() {
        let decorator = Decorator::new(LinkOptions::default());
        assert_eq!(serde_json::to_value(&decorator).unwrap(), serde_json::json!({}));
    }
}
