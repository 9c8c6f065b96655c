//! Escaping of repository names into URI path segments.
//!
//! Repository names are qualified (`prefix:local`) and may contain characters
//! that are not safe in a URI segment. The escaped form:
//!
//! - turns the namespace separator `:` into `__`;
//! - percent-encodes everything outside `[A-Za-z0-9.~-]`;
//! - always percent-encodes `_`, so `__` can only ever come from `:`;
//! - percent-encodes a `-` that is followed by another `-` or ends the name,
//!   so an escaped name never contains `--`. That sequence is reserved for the
//!   same-name index suffix produced by [`escape_indexed`].
//!
//! ```text
//! jcr:primaryType            → jcr__primaryType
//! jcr:propertyDefinition, 2  → jcr__propertyDefinition--2
//! my_name                    → my%5Fname
//! ```
//!
//! Path segments may carry a repository same-name index (`name[2]`); the
//! segment functions translate it to and from the `--2` suffix.
//!
//! Escaping is injective and [`unescape`] reverses it. Names that only use
//! letters, digits, `.`, `~` and single inner `-` are left untouched, so
//! escaping such a name twice yields the same segment.

use std::borrow::Cow;

/// Separator between an escaped name and its same-name index.
const INDEX_SEPARATOR: &str = "--";

/// Escaped replacement for the namespace separator.
const NAMESPACE_SEPARATOR: &str = "__";

/// Escape a repository name into a URI segment.
pub fn escape(name: &str) -> String {
    name.split(':')
        .map(escape_part)
        .collect::<Vec<_>>()
        .join(NAMESPACE_SEPARATOR)
}

/// Escape a name and append `--{index}` when `index` is greater than 1.
pub fn escape_indexed(name: &str, index: usize) -> String {
    let escaped = escape(name);
    if index > 1 {
        format!("{escaped}{INDEX_SEPARATOR}{index}")
    } else {
        escaped
    }
}

/// Reverse [`escape`].
///
/// Invalid UTF-8 produced by percent-decoding is replaced lossily rather than
/// rejected; such a segment cannot match any repository name anyway.
pub fn unescape(segment: &str) -> String {
    segment
        .split(NAMESPACE_SEPARATOR)
        .map(|part| {
            let bytes = urlencoding::decode_binary(part.as_bytes());
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Split an escaped segment into its name part and its same-name index.
///
/// Segments without a numeric `--N` suffix have index 1.
pub fn split_index(segment: &str) -> (&str, usize) {
    match segment.rsplit_once(INDEX_SEPARATOR) {
        Some((base, index))
            if !base.is_empty()
                && !index.is_empty()
                && index.bytes().all(|b| b.is_ascii_digit()) =>
        {
            match index.parse() {
                Ok(n) => (base, n),
                Err(_) => (segment, 1),
            }
        }
        _ => (segment, 1),
    }
}

/// Escape one repository path segment, mapping `name[N]` to `name--N`.
pub fn escape_segment(segment: &str) -> String {
    let indexed = segment
        .strip_suffix(']')
        .and_then(|rest| rest.rsplit_once('['))
        .and_then(|(name, index)| index.parse::<usize>().ok().map(|i| (name, i)));
    match indexed {
        Some((name, index)) => escape_indexed(name, index),
        None => escape(segment),
    }
}

/// Reverse [`escape_segment`].
pub fn unescape_segment(segment: &str) -> String {
    let (name, index) = split_index(segment);
    let name = unescape(name);
    if index > 1 {
        format!("{name}[{index}]")
    } else {
        name
    }
}

/// Escaped last segment of a path: the key of a child node within its parent.
pub fn escape_leaf(path: &str) -> String {
    escape_segment(path.rsplit('/').next().unwrap_or(path))
}

/// Escape every segment of an absolute repository path, keeping the `/`s.
pub fn escape_path(path: &str) -> String {
    if path == "/" {
        return path.to_string();
    }
    path.split('/').map(escape_segment).collect::<Vec<_>>().join("/")
}

/// Reverse [`escape_path`].
pub fn unescape_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }
    let unescaped = path
        .split('/')
        .map(unescape_segment)
        .collect::<Vec<_>>()
        .join("/");
    if unescaped.starts_with('/') {
        unescaped
    } else {
        format!("/{unescaped}")
    }
}

fn escape_part(part: &str) -> String {
    let encoded: Cow<'_, str> = urlencoding::encode(part);
    let chars: Vec<char> = encoded.chars().collect();
    let mut out = String::with_capacity(encoded.len());
    for (i, c) in chars.iter().enumerate() {
        match c {
            '_' => out.push_str("%5F"),
            '-' if chars.get(i + 1).map_or(true, |next| *next == '-') => out.push_str("%2D"),
            other => out.push(*other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_separator_becomes_double_underscore() {
        assert_eq!(escape("jcr:primaryType"), "jcr__primaryType");
        assert_eq!(escape("rep:root"), "rep__root");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn index_suffix_only_above_one() {
        assert_eq!(
            escape_indexed("jcr:propertyDefinition", 1),
            "jcr__propertyDefinition"
        );
        assert_eq!(
            escape_indexed("jcr:propertyDefinition", 2),
            "jcr__propertyDefinition--2"
        );
        assert_eq!(split_index("jcr__propertyDefinition--2"), ("jcr__propertyDefinition", 2));
        assert_eq!(split_index("jcr__propertyDefinition"), ("jcr__propertyDefinition", 1));
    }

    #[test]
    fn underscores_and_dashes_do_not_collide() {
        let names = ["a:b", "a__b", "a_b", "a--2", "a-", "a", "a b", "a/b", "a%5Fb"];
        let escaped: Vec<String> = names.iter().map(|n| escape(n)).collect();
        for (i, a) in escaped.iter().enumerate() {
            for b in escaped.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert!(escaped.iter().all(|e| !e.contains("--")));
        assert_ne!(escape_indexed("a", 2), escape("a--2"));
        assert_ne!(escape_indexed("a-", 2), escape_indexed("a", 2));
    }

    #[test]
    fn unescape_reverses_escape() {
        for name in ["jcr:primaryType", "my_name", "a::b", "x-y", "a--b-", "sp ace", "ü:ñ", ""] {
            assert_eq!(unescape(&escape(name)), name, "round trip of {name:?}");
        }
    }

    #[test]
    fn plain_names_are_a_fixed_point() {
        for name in ["content", "page-1", "v1.0", "a~b"] {
            assert_eq!(escape(name), name);
            assert_eq!(escape(&escape(name)), escape(name));
        }
    }

    #[test]
    fn paths_escape_segment_wise() {
        assert_eq!(escape_path("/"), "/");
        assert_eq!(escape_path("/jcr:system/jcr:nodeTypes"), "/jcr__system/jcr__nodeTypes");
        assert_eq!(unescape_path("/jcr__system/jcr__nodeTypes"), "/jcr:system/jcr:nodeTypes");
        assert_eq!(unescape_path("jcr__system"), "/jcr:system");
        assert_eq!(unescape_path(""), "/");
    }

    #[test]
    fn same_name_index_maps_between_brackets_and_suffix() {
        assert_eq!(escape_segment("jcr:propertyDefinition[2]"), "jcr__propertyDefinition--2");
        assert_eq!(escape_segment("jcr:propertyDefinition[1]"), "jcr__propertyDefinition");
        assert_eq!(unescape_segment("jcr__propertyDefinition--2"), "jcr:propertyDefinition[2]");
        assert_eq!(unescape_segment("jcr__propertyDefinition"), "jcr:propertyDefinition");
        assert_eq!(
            escape_path("/jcr:system/jcr:nodeTypes/nt:base/jcr:propertyDefinition[2]"),
            "/jcr__system/jcr__nodeTypes/nt__base/jcr__propertyDefinition--2"
        );
        assert_eq!(
            unescape_path("/jcr__system/jcr__nodeTypes/nt__base/jcr__propertyDefinition--2"),
            "/jcr:system/jcr:nodeTypes/nt:base/jcr:propertyDefinition[2]"
        );
    }
}
