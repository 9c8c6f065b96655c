//! Canonical URIs for repository items.
//!
//! All functions here are pure string builders. Relative URIs are rooted at
//! [`API_ROOT`]; [`absolute_uri`] prefixes one with the externally visible
//! base URL.
//!
//! | Kind | Shape |
//! |------|-------|
//! | node by id | `/api/nodes/{id}` |
//! | item by path | `/api/byPath/{escaped/path}` |
//! | property | `/api/nodes/{parent id}/properties/{escaped name}` |
//! | node type | `/api/byPath/jcr__system/jcr__nodeTypes/{escaped type path}` |

use crate::names;
use crate::repository::Item;

pub const API_ROOT: &str = "/api";

/// Path segment under which nodes are addressed by identifier.
pub const NODES: &str = "nodes";

/// Path segment under which items are addressed by path.
pub const BY_PATH: &str = "byPath";

/// Repository path holding node-type definitions.
pub const NODE_TYPES_PATH: &str = "/jcr:system/jcr:nodeTypes";

/// URI of a node addressed by identifier.
pub fn id_uri(identifier: &str) -> String {
    format!("{API_ROOT}/{NODES}/{identifier}")
}

/// URI of an item addressed by its already-escaped path.
///
/// The root is `/api/byPath/`; everything else is `/api/byPath` followed by the
/// escaped absolute path.
pub fn path_uri(escaped_path: &str, is_root: bool) -> String {
    if is_root || escaped_path.is_empty() || escaped_path == "/" {
        format!("{API_ROOT}/{BY_PATH}/")
    } else if escaped_path.starts_with('/') {
        format!("{API_ROOT}/{BY_PATH}{escaped_path}")
    } else {
        format!("{API_ROOT}/{BY_PATH}/{escaped_path}")
    }
}

/// URI of a named child below `parent_uri`.
///
/// Property names (and other repository-named elements) are escaped; fixed
/// container names such as `properties` are appended as is.
pub fn child_uri(parent_uri: &str, child_name: &str, is_property: bool) -> String {
    let child = if is_property {
        names::escape(child_name)
    } else {
        child_name.to_string()
    };
    format!("{}/{}", parent_uri.trim_end_matches('/'), child)
}

/// URI of a node type, or of a definition below one, from its escaped path
/// relative to the node-types folder.
pub fn type_uri(escaped_type_path: &str) -> String {
    format!(
        "{}/{}",
        path_uri(&names::escape_path(NODE_TYPES_PATH), false),
        escaped_type_path
    )
}

/// Prefix a relative URI with the externally visible base URL.
pub fn absolute_uri(base_url: &str, relative_uri: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), relative_uri)
}

/// Canonical self URI of an item.
///
/// Nodes are addressed by identifier; a property is addressed through its
/// parent node's identifier, so both are stable across renames of ancestors.
pub fn item_uri(item: &Item<'_>) -> String {
    match item {
        Item::Node(node) => id_uri(&node.identifier),
        Item::Property(property) => child_uri(
            &child_uri(&id_uri(&property.parent_identifier), "properties", false),
            &property.name,
            true,
        ),
    }
}

/// URI of an item addressed by path.
///
/// A property goes through its parent node's `properties` container, the
/// only by-path shape that reaches a property.
pub fn item_path_uri(item: &Item<'_>) -> String {
    match item {
        Item::Node(node) => path_uri(&names::escape_path(&node.path), node.path == "/"),
        Item::Property(property) => {
            let parent = match property.path.rsplit_once('/') {
                Some(("", _)) | None => "/",
                Some((parent, _)) => parent,
            };
            child_uri(
                &child_uri(&path_uri(&names::escape_path(parent), parent == "/"), "properties", false),
                &property.name,
                true,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Node, Property, PropertyType, PropertyValue};

    #[test]
    fn id_and_path_uris() {
        assert_eq!(id_uri("abc"), "/api/nodes/abc");
        assert_eq!(path_uri("/", true), "/api/byPath/");
        assert_eq!(path_uri("/jcr__system", false), "/api/byPath/jcr__system");
        assert_eq!(path_uri("jcr__system", false), "/api/byPath/jcr__system");
    }

    #[test]
    fn child_uri_escapes_only_properties() {
        assert_eq!(child_uri("/api/nodes/abc", "properties", false), "/api/nodes/abc/properties");
        assert_eq!(
            child_uri("/api/nodes/abc/properties", "jcr:primaryType", true),
            "/api/nodes/abc/properties/jcr__primaryType"
        );
        assert_eq!(child_uri("/api/byPath/", "children", false), "/api/byPath/children");
    }

    #[test]
    fn type_uris_live_under_node_types() {
        assert_eq!(
            type_uri("nt__base/jcr__propertyDefinition--2"),
            "/api/byPath/jcr__system/jcr__nodeTypes/nt__base/jcr__propertyDefinition--2"
        );
    }

    #[test]
    fn absolute_uri_trims_trailing_slash() {
        assert_eq!(absolute_uri("http://localhost:8080/", "/api/nodes/x"), "http://localhost:8080/api/nodes/x");
        assert_eq!(absolute_uri("http://h", "/api/nodes/x"), "http://h/api/nodes/x");
    }

    #[test]
    fn item_uris() {
        let node = Node {
            identifier: "n1".into(),
            name: "jcr:content".into(),
            path: "/site/jcr:content".into(),
            primary_type: "nt:unstructured".into(),
            mixin_types: vec![],
        };
        assert_eq!(item_uri(&Item::Node(&node)), "/api/nodes/n1");
        assert_eq!(item_path_uri(&Item::Node(&node)), "/api/byPath/site/jcr__content");

        let property = Property {
            name: "jcr:title".into(),
            path: "/site/jcr:content/jcr:title".into(),
            parent_identifier: "n1".into(),
            property_type: PropertyType::String,
            value: PropertyValue::Single("Home".into()),
        };
        assert_eq!(
            item_uri(&Item::Property(&property)),
            "/api/nodes/n1/properties/jcr__title"
        );
        assert_eq!(
            item_path_uri(&Item::Property(&property)),
            "/api/byPath/site/jcr__content/properties/jcr__title"
        );

        let on_root = Property {
            name: "jcr:primaryType".into(),
            path: "/jcr:primaryType".into(),
            ..property
        };
        assert_eq!(
            item_path_uri(&Item::Property(&on_root)),
            "/api/byPath/properties/jcr__primaryType"
        );
    }
}
