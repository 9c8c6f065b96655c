//! `GET /api/version`

/// `GET /api/version`
///
/// Returns the server's crate version as plain text.
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
