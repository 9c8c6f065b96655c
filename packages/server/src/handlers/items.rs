//! Item handlers: `/api/nodes/{id}[/{kind}[/{name}]]` and `/api/byPath/...`.
//!
//! Both route families address a node and, optionally, one of its
//! sub-element containers or a single element in it. The method selects the
//! operation:
//!
//! | Method | Operation | Success status |
//! |--------|-----------|----------------|
//! | `GET` | read | 200 |
//! | `PUT`, `POST` | create | 201 |
//! | `DELETE` | delete | 200 |
//!
//! A bare node only supports `GET`. Segments are taken from the raw request
//! path so escaped names reach the accessors exactly as they were linked.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use repolink::repository::{Node, Session};
use repolink::{accessor_for, names, NodeRepresentation, OptionOverrides, RepositoryError, SubElementKind};
use serde_json::Value;

use super::{project, AppState};
use crate::error::AppError;

const NODES_PREFIX: &str = "/api/nodes";
const BY_PATH_PREFIX: &str = "/api/byPath";

/// How the request addresses its node.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeRef {
    Id(String),
    /// Unescaped absolute repository path.
    Path(String),
}

impl NodeRef {
    fn resolve(&self, session: &dyn Session) -> Result<Node, RepositoryError> {
        match self {
            NodeRef::Id(id) => session.node_by_identifier(id),
            NodeRef::Path(path) => session.node_by_path(path),
        }
    }
}

/// A node, optionally narrowed to a sub-element container and element name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemRequest {
    node: NodeRef,
    /// Container kind and escaped element name; the name is empty for the
    /// whole container.
    sub_element: Option<(SubElementKind, String)>,
}

fn parse_kind(segment: &str) -> Result<SubElementKind, AppError> {
    segment.parse().map_err(AppError::NotFound)
}

/// `{id}[/{kind}[/{name}]]`
fn parse_nodes_path(raw: &str) -> Result<ItemRequest, AppError> {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    let (id, rest) = segments
        .split_first()
        .ok_or_else(|| AppError::NotFound("a node identifier is required".into()))?;
    let sub_element = match rest {
        [] => None,
        [kind] => Some((parse_kind(kind)?, String::new())),
        [kind, name] => Some((parse_kind(kind)?, name.to_string())),
        _ => return Err(AppError::NotFound(format!("no such resource: {raw}"))),
    };
    Ok(ItemRequest {
        node: NodeRef::Id(id.to_string()),
        sub_element,
    })
}

/// `{escaped path}[/{kind}[/{name}]]`
///
/// A trailing sub-element kind, or a kind followed by one more segment,
/// selects a sub-element; a node whose own name is a kind is therefore only
/// reachable as a container entry or by identifier.
fn parse_by_path(raw: &str) -> ItemRequest {
    let segments: Vec<&str> = raw.split('/').filter(|s| !s.is_empty()).collect();
    let kind_at = |i: usize| segments.get(i).and_then(|s| s.parse::<SubElementKind>().ok());
    let n = segments.len();

    let (node_segments, sub_element) = match (n.checked_sub(1).and_then(kind_at), n.checked_sub(2).and_then(kind_at)) {
        (Some(kind), _) => (&segments[..n - 1], Some((kind, String::new()))),
        (None, Some(kind)) => (&segments[..n - 2], Some((kind, segments[n - 1].to_string()))),
        (None, None) => (&segments[..], None),
    };

    ItemRequest {
        node: NodeRef::Path(names::unescape_path(&node_segments.join("/"))),
        sub_element,
    }
}

fn operation_for(method: &Method) -> Result<&'static str, AppError> {
    match *method {
        Method::GET => Ok("read"),
        Method::PUT | Method::POST => Ok("create"),
        Method::DELETE => Ok("delete"),
        _ => Err(AppError::MethodNotAllowed(format!("{method} is not supported"))),
    }
}

fn parse_body(body: &Bytes) -> Result<Option<Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {e}")))
}

/// `GET|PUT|POST|DELETE /api/nodes/{id}[/{kind}[/{name}]]`
pub async fn nodes(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(overrides): Query<OptionOverrides>,
    body: Bytes,
) -> Result<Response, AppError> {
    let raw = uri.path().strip_prefix(NODES_PREFIX).unwrap_or_default();
    let request = parse_nodes_path(raw)?;
    serve(state, method, request, overrides, body).await
}

/// `GET|PUT|POST|DELETE /api/byPath/{*path}`
pub async fn by_path(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Query(overrides): Query<OptionOverrides>,
    body: Bytes,
) -> Result<Response, AppError> {
    let raw = uri.path().strip_prefix(BY_PATH_PREFIX).unwrap_or_default();
    let request = parse_by_path(raw);
    serve(state, method, request, overrides, body).await
}

async fn serve(
    state: AppState,
    method: Method,
    request: ItemRequest,
    overrides: OptionOverrides,
    body: Bytes,
) -> Result<Response, AppError> {
    let ItemRequest { node, sub_element } = request;

    let Some((kind, name)) = sub_element else {
        if method != Method::GET {
            return Err(AppError::MethodNotAllowed(format!(
                "{method} is not supported on a node; address one of its containers"
            )));
        }
        let representation = project(&state, overrides, move |ctx| {
            let node = node.resolve(ctx.session)?;
            Ok(NodeRepresentation::build(ctx, &node, 1 + ctx.options.child_depth())?)
        })
        .await?;
        return Ok(Json(representation).into_response());
    };

    let operation = operation_for(&method)?;
    let data = parse_body(&body)?;
    let outcome = project(&state, overrides, move |ctx| {
        let node = node.resolve(ctx.session)?;
        accessor_for(kind)
            .perform(ctx, &node, &name, operation, data.as_ref())?
            .ok_or_else(|| AppError::MethodNotAllowed(format!("unsupported operation {operation}")))
    })
    .await?;

    let status = if operation == "create" {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use repolink::repository::memory::{MemoryRepository, MIX_VERSIONABLE, ROOT_IDENTIFIER};
    use repolink::repository::{PropertyType, PropertyValue};
    use repolink::{AllowAll, Repository, SessionGuard};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::config::ServerConfig;
    use crate::router::build_router;

    struct Seeded {
        repo: Arc<MemoryRepository>,
        site_id: String,
        home_id: String,
    }

    fn seed() -> Seeded {
        let repo = Arc::new(MemoryRepository::new());
        let session = SessionGuard::open(repo.as_ref()).unwrap();
        let root = session.root_node().unwrap();
        let site = session.add_node(&root, "site", "nt:unstructured").unwrap();
        let home = session.add_node(&site, "home", "nt:unstructured").unwrap();
        session.add_mixin(&home, MIX_VERSIONABLE).unwrap();
        session
            .set_property(&home, "jcr:title", PropertyType::String, PropertyValue::Single("Home".into()))
            .unwrap();
        session.add_node(&home, "teaser", "nt:unstructured").unwrap();
        session.save().unwrap();
        Seeded {
            site_id: site.identifier,
            home_id: home.identifier,
            repo: Arc::clone(&repo),
        }
    }

    fn build_app(seeded: &Seeded) -> axum::Router {
        let config = ServerConfig {
            base_url: "http://content.test".into(),
            ..ServerConfig::default()
        };
        let repository: Arc<dyn Repository> = seeded.repo.clone();
        build_router(repository, Arc::new(AllowAll), config)
    }

    async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[test]
    fn nodes_paths_parse() {
        assert_eq!(
            parse_nodes_path("/abc").unwrap(),
            ItemRequest {
                node: NodeRef::Id("abc".into()),
                sub_element: None
            }
        );
        assert_eq!(
            parse_nodes_path("/abc/properties/jcr__title").unwrap().sub_element,
            Some((SubElementKind::Properties, "jcr__title".into()))
        );
        assert!(matches!(parse_nodes_path("/abc/props"), Err(AppError::NotFound(_))));
        assert!(matches!(parse_nodes_path("/abc/children/a/b"), Err(AppError::NotFound(_))));
        assert!(matches!(parse_nodes_path("/"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn by_path_selects_trailing_sub_elements() {
        assert_eq!(
            parse_by_path("/"),
            ItemRequest {
                node: NodeRef::Path("/".into()),
                sub_element: None
            }
        );
        assert_eq!(
            parse_by_path("/jcr__system/jcr__nodeTypes/nt__base/jcr__propertyDefinition--2"),
            ItemRequest {
                node: NodeRef::Path("/jcr:system/jcr:nodeTypes/nt:base/jcr:propertyDefinition[2]".into()),
                sub_element: None
            }
        );
        assert_eq!(
            parse_by_path("/site/home/children"),
            ItemRequest {
                node: NodeRef::Path("/site/home".into()),
                sub_element: Some((SubElementKind::Children, String::new()))
            }
        );
        assert_eq!(
            parse_by_path("/site/properties/jcr__title"),
            ItemRequest {
                node: NodeRef::Path("/site".into()),
                sub_element: Some((SubElementKind::Properties, "jcr__title".into()))
            }
        );
        assert_eq!(
            parse_by_path("/mixins"),
            ItemRequest {
                node: NodeRef::Path("/".into()),
                sub_element: Some((SubElementKind::Mixins, String::new()))
            }
        );
    }

    #[tokio::test]
    async fn get_node_by_id_includes_children() {
        let seeded = seed();
        let (status, json) = send(build_app(&seeded), "GET", &format!("/api/nodes/{}", seeded.home_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["path"], json!("/site/home"));
        assert_eq!(json["children"]["teaser"]["path"], json!("/site/home/teaser"));
        assert!(json["children"]["teaser"].get("children").is_none());
        assert_eq!(
            json["_links"]["absolute"]["href"],
            json!(format!("http://content.test/api/nodes/{}", seeded.home_id))
        );
    }

    #[tokio::test]
    async fn full_children_expand_the_node_view() {
        let seeded = seed();
        let (status, json) = send(build_app(&seeded), "GET", "/api/byPath/site?includeFullChildren=true", None).await;
        assert_eq!(status, StatusCode::OK);
        let home = &json["children"]["home"];
        assert_eq!(home["children"]["teaser"]["path"], json!("/site/home/teaser"));
        assert!(home["children"]["teaser"].get("children").is_none());

        let (_, json) = send(build_app(&seeded), "GET", "/api/byPath/site", None).await;
        assert!(json["children"]["home"].get("children").is_none());
    }

    #[tokio::test]
    async fn id_and_path_lookups_agree() {
        let seeded = seed();
        let (_, by_id) = send(build_app(&seeded), "GET", &format!("/api/nodes/{}", seeded.home_id), None).await;
        let (status, by_path) = send(build_app(&seeded), "GET", "/api/byPath/site/home", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_id["_links"]["self"], by_path["_links"]["self"]);
        assert_eq!(by_id["_links"]["parent"], by_path["_links"]["parent"]);
        assert_eq!(
            by_path["_links"]["parent"]["href"],
            json!(format!("/api/nodes/{}", seeded.site_id))
        );
    }

    #[tokio::test]
    async fn root_by_path_links_to_itself() {
        let seeded = seed();
        let (status, json) = send(build_app(&seeded), "GET", "/api/byPath/", None).await;
        assert_eq!(status, StatusCode::OK);
        let self_uri = json!(format!("/api/nodes/{ROOT_IDENTIFIER}"));
        assert_eq!(json["_links"]["self"]["href"], self_uri);
        assert_eq!(json["_links"]["parent"]["href"], self_uri);
    }

    #[tokio::test]
    async fn type_links_resolve() {
        let seeded = seed();
        let (_, home) = send(build_app(&seeded), "GET", "/api/byPath/site/home", None).await;
        let type_uri = home["properties"]["jcr__primaryType"]["_links"]["type"]["href"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(type_uri.ends_with("/nt__base/jcr__propertyDefinition--2"));

        let (status, definition) = send(build_app(&seeded), "GET", &type_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(definition["properties"]["jcr__name"]["value"], json!("jcr:primaryType"));
        assert_eq!(definition["_links"]["path"]["href"], json!(type_uri));
    }

    #[tokio::test]
    async fn property_path_links_resolve() {
        let seeded = seed();
        let (_, home) = send(build_app(&seeded), "GET", "/api/byPath/site/home", None).await;
        let title = &home["properties"]["jcr__title"];
        let path_uri = title["_links"]["path"]["href"].as_str().unwrap().to_string();
        assert_eq!(path_uri, "/api/byPath/site/home/properties/jcr__title");

        let (status, followed) = send(build_app(&seeded), "GET", &path_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(followed["value"], json!("Home"));
        assert_eq!(followed["_links"]["self"], title["_links"]["self"]);

        let (_, root) = send(build_app(&seeded), "GET", "/api/byPath/", None).await;
        let path_uri = root["properties"]["jcr__primaryType"]["_links"]["path"]["href"]
            .as_str()
            .unwrap()
            .to_string();
        let (status, followed) = send(build_app(&seeded), "GET", &path_uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(followed["name"], json!("jcr:primaryType"));
    }

    #[tokio::test]
    async fn children_are_read_back_at_their_create_uri() {
        let seeded = seed();
        let base = format!("/api/nodes/{}/children", seeded.site_id);
        let segment = names::escape("draft--old");

        let (status, created) = send(build_app(&seeded), "PUT", &format!("{base}/{segment}"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["path"], json!("/site/draft--old"));
        let (status, read) = send(build_app(&seeded), "GET", &format!("{base}/{segment}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["path"], json!("/site/draft--old"));

        let (status, _) = send(build_app(&seeded), "PUT", &format!("{base}/news--2"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(build_app(&seeded), "GET", &format!("{base}/news--2"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn sub_element_crud_over_http() {
        let seeded = seed();
        let base = format!("/api/nodes/{}", seeded.site_id);

        let (status, created) = send(
            build_app(&seeded),
            "PUT",
            &format!("{base}/children/news"),
            Some(json!({"properties": {"rank": 1}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["path"], json!("/site/news"));

        let (status, _) = send(build_app(&seeded), "POST", &format!("{base}/children/news"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, container) = send(build_app(&seeded), "GET", &format!("{base}/children"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(container["children"].get("news").is_some());
        assert_eq!(container["_links"]["self"]["href"], json!(format!("{base}/children")));

        let (status, _) = send(build_app(&seeded), "DELETE", &format!("{base}/children/news"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, error) = send(build_app(&seeded), "GET", &format!("{base}/children/news"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(error["code"], json!("not_found"));
    }

    #[tokio::test]
    async fn by_path_sub_elements_and_overrides() {
        let seeded = seed();
        let (status, title) = send(
            build_app(&seeded),
            "GET",
            "/api/byPath/site/home/properties/jcr__title?noLinks=true",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(title["value"], json!("Home"));
        assert!(title.get("_links").is_none());

        let (status, mixin) = send(build_app(&seeded), "PUT", "/api/byPath/site/mixins/mix__title", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(mixin["type"], json!("mix:title"));
    }

    #[tokio::test]
    async fn errors_map_to_statuses() {
        let seeded = seed();
        let home = format!("/api/nodes/{}", seeded.home_id);

        let (status, _) = send(build_app(&seeded), "GET", "/api/nodes/does-not-exist", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(build_app(&seeded), "PUT", &format!("{home}/versions/2.0"), None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        for method in ["PUT", "POST", "DELETE"] {
            let (status, _) = send(build_app(&seeded), method, &format!("{home}/versions"), None).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
        }

        let (status, _) = send(build_app(&seeded), "DELETE", &home, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(build_app(&seeded), "PUT", &format!("{home}/mixins/nt__folder"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(build_app(&seeded), "DELETE", &format!("{home}/properties"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            build_app(&seeded),
            "PUT",
            &format!("{home}/properties/jcr__primaryType"),
            Some(json!("nt:folder")),
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = send(build_app(&seeded), "GET", &format!("{home}/things"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn versions_listed_after_checkin() {
        let seeded = seed();
        seeded.repo.checkin(&seeded.home_id).unwrap();
        seeded.repo.checkin(&seeded.home_id).unwrap();

        let (status, json) = send(
            build_app(&seeded),
            "GET",
            &format!("/api/nodes/{}/versions", seeded.home_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let versions = json["versions"].as_object().unwrap();
        assert_eq!(versions.keys().collect::<Vec<_>>(), vec!["1.0", "1.1"]);
        assert!(json["versions"]["1.0"]["_links"].get("next").is_some());
        assert!(json["versions"]["1.0"]["_links"].get("previous").is_none());
    }

    #[tokio::test]
    async fn version_is_plain_text() {
        let seeded = seed();
        let resp = build_app(&seeded)
            .oneshot(Request::builder().uri("/api/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], env!("CARGO_PKG_VERSION").as_bytes());
    }
}
