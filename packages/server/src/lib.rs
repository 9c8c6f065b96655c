//! Public surface for the `repolink-server` crate.
//!
//! Exposes the router builder and config types so that tests and embedding
//! applications can serve any [`repolink::Repository`] in process.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;

pub use config::{ConfigError, ServerConfig};
pub use error::{AppError, ErrorResponse};
pub use router::build_router;
