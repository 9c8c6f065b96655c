//! HTTP request handlers.
//!
//! Handlers are async functions that receive Axum extractors and return
//! `Result<impl IntoResponse, AppError>`. Repository work is synchronous, so
//! each request runs its projection on the blocking pool through
//! [`project`], which opens one session per request and releases it on
//! every exit path.

pub mod items;
pub mod version;

use std::sync::Arc;

use repolink::{OptionOverrides, PermissionCheck, Projection, Repository, SessionGuard};

use crate::{config::ServerConfig, error::AppError};

/// Shared application state threaded through all Axum handlers via [`axum::extract::State`].
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub permissions: Arc<dyn PermissionCheck>,
    pub config: ServerConfig,
}

/// Run `work` against a fresh session with the request's effective options.
pub(crate) async fn project<T, F>(
    state: &AppState,
    overrides: OptionOverrides,
    work: F,
) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&Projection<'_>) -> Result<T, AppError> + Send + 'static,
{
    let repository = Arc::clone(&state.repository);
    let permissions = Arc::clone(&state.permissions);
    let options = state.config.link_options.with_overrides(&overrides);
    let base_url = state.config.base_url.clone();

    tokio::task::spawn_blocking(move || {
        let session = SessionGuard::open(repository.as_ref())?;
        let ctx = Projection::new(&*session, permissions.as_ref(), options, &base_url);
        work(&ctx)
    })
    .await
    .map_err(|e| AppError::Internal(format!("request task failed: {e}")))?
}
