//! Assembles the Axum [`Router`] from all handler modules.

use std::sync::Arc;

use axum::{
    routing::{get, MethodRouter},
    Router,
};
use repolink::{PermissionCheck, Repository};
use tower_http::trace::TraceLayer;

use crate::{
    config::ServerConfig,
    handlers::{items, version, AppState},
};

/// Build the complete application router with shared state.
pub fn build_router(
    repository: Arc<dyn Repository>,
    permissions: Arc<dyn PermissionCheck>,
    config: ServerConfig,
) -> Router {
    let state = AppState {
        repository,
        permissions,
        config,
    };

    let nodes = || -> MethodRouter<AppState> {
        get(items::nodes)
            .put(items::nodes)
            .post(items::nodes)
            .delete(items::nodes)
    };
    let by_path = || -> MethodRouter<AppState> {
        get(items::by_path)
            .put(items::by_path)
            .post(items::by_path)
            .delete(items::by_path)
    };

    Router::new()
        .route("/api/version", get(version::version))
        // Items by identifier
        .route("/api/nodes/{id}", nodes())
        .route("/api/nodes/{id}/{kind}", nodes())
        .route("/api/nodes/{id}/{kind}/{name}", nodes())
        // Items by path; the wildcard does not match the empty root path
        .route("/api/byPath", by_path())
        .route("/api/byPath/", by_path())
        .route("/api/byPath/{*path}", by_path())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
