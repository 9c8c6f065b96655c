//! `repolink-server`: serves hypermedia representations of an in-memory
//! content repository.
//!
//! # Quick start
//!
//! ```sh
//! # Default port, links on, references not embedded:
//! repolink-server
//!
//! # Behind a proxy, embedding reference targets:
//! REPOLINK_BASE_URL=https://content.example.com REPOLINK_RESOLVE_REFERENCES=true repolink-server
//! ```
//!
//! # Environment variables
//!
//! See [`repolink_server::ServerConfig`] for the full list.

use std::sync::Arc;

use repolink::repository::memory::MemoryRepository;
use repolink::{AllowAll, PermissionCheck, Repository};
use repolink_server::{build_router, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "repolink_server=info,repolink=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = ServerConfig::from_env()?;

    tracing::info!("repository: in-memory (content will not survive restart)");
    let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
    let permissions: Arc<dyn PermissionCheck> = Arc::new(AllowAll);

    tracing::info!(
        output_links = config.link_options.output_links,
        resolve_references = config.link_options.resolve_references,
        include_full_children = config.link_options.include_full_children,
        "projection defaults"
    );

    let bind_addr = config.bind_addr;
    let app = build_router(repository, permissions, config);

    tracing::info!("listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
