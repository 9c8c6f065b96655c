//! Projection options.
//!
//! A single [`LinkOptions`] value is built once at startup and passed, by
//! value, into every construction call. Requests may narrow or widen it with
//! [`OptionOverrides`]; the process-wide value itself never changes.

use serde::Deserialize;

/// Flags controlling what a representation contains.
///
/// | Flag | Default | Effect |
/// |------|---------|--------|
/// | `output_links` | `true` | emit the `_links` block |
/// | `resolve_references` | `false` | embed the targets of reference properties |
/// | `include_full_children` | `false` | expand grandchildren in children listings |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    pub output_links: bool,
    pub resolve_references: bool,
    pub include_full_children: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            output_links: true,
            resolve_references: false,
            include_full_children: false,
        }
    }
}

/// Per-request overrides, typically parsed from the query string.
///
/// Absent fields keep the process-wide value.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OptionOverrides {
    /// `noLinks=true` suppresses the link block.
    pub no_links: Option<bool>,
    pub resolve_references: Option<bool>,
    pub include_full_children: Option<bool>,
}

impl LinkOptions {
    /// Apply request overrides on top of these options.
    pub fn with_overrides(self, overrides: &OptionOverrides) -> Self {
        Self {
            output_links: overrides.no_links.map_or(self.output_links, |no| !no),
            resolve_references: overrides
                .resolve_references
                .unwrap_or(self.resolve_references),
            include_full_children: overrides
                .include_full_children
                .unwrap_or(self.include_full_children),
        }
    }

    /// The options used for nodes embedded as reference targets: one hop only.
    pub fn for_embedded(self) -> Self {
        Self {
            resolve_references: false,
            ..self
        }
    }

    /// Depth at which child nodes are built inside a children listing.
    pub fn child_depth(&self) -> u32 {
        if self.include_full_children {
            1
        } else {
            0
        }
    }
}
