//! Per-request projection context.

use crate::config::LinkOptions;
use crate::repository::{PermissionCheck, Session};

/// Everything representation building needs for one request.
///
/// Passed by reference into every construction call; nothing here outlives
/// the request.
#[derive(Clone, Copy)]
pub struct Projection<'a> {
    pub session: &'a dyn Session,
    pub permissions: &'a dyn PermissionCheck,
    pub options: LinkOptions,
    /// Externally visible base URL used for `absolute` links.
    pub base_url: &'a str,
}

impl<'a> Projection<'a> {
    pub fn new(
        session: &'a dyn Session,
        permissions: &'a dyn PermissionCheck,
        options: LinkOptions,
        base_url: &'a str,
    ) -> Self {
        Self {
            session,
            permissions,
            options,
            base_url,
        }
    }

    /// The same context with different options.
    pub fn with_options(&self, options: LinkOptions) -> Self {
        Self { options, ..*self }
    }
}
