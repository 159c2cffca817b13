//! Channel path canonicalization.
//!
//! A channel is named after the resource whose changes it carries. Clients may
//! refer to it by a full URL, a path with a trailing slash, or the websocket
//! endpoint path (`.../ws`); all of these collapse to one canonical form: the
//! URL path component with no trailing slash and no trailing `/ws`.

use std::fmt;

use serde::Serialize;

/// First path segment every subscribable resource lives under.
pub const API_PREFIX: &str = "api";

/// Suffix of websocket endpoint paths, stripped during canonicalization.
pub const WEBSOCKET_SUFFIX: &str = "/ws";

/// A canonical, non-empty channel path such as `/api/salads/123`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ChannelPath(String);

impl ChannelPath {
    /// Canonicalize `raw`, returning `None` when nothing is left of it.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = canonicalize(raw);
        if canonical.is_empty() {
            None
        } else {
            Some(Self(canonical))
        }
    }

    /// The canonical path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the path lives under the reserved API prefix.
    pub fn has_api_prefix(&self) -> bool {
        has_api_prefix(&self.0)
    }

    /// Consume the path, returning the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ChannelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Return only the path component of a URL or path reference.
///
/// Scheme and authority (`http://host:port`, or a scheme-relative `//host`)
/// are dropped, as are the query string and fragment.
pub fn url_path(raw: &str) -> &str {
    let rest = match strip_scheme(raw) {
        Some(after_scheme) => after_scheme,
        None => raw,
    };

    let rest = match rest.strip_prefix("//") {
        Some(authority_and_path) => {
            let end = authority_and_path
                .find(['/', '?', '#'])
                .unwrap_or(authority_and_path.len());
            &authority_and_path[end..]
        }
        None => rest,
    };

    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    &rest[..end]
}

/// Strip a leading `scheme:` when followed by an authority.
fn strip_scheme(raw: &str) -> Option<&str> {
    let colon = raw.find("://")?;
    let scheme = &raw[..colon];
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        Some(&raw[colon + 1..])
    } else {
        None
    }
}

/// Canonicalize a raw channel reference.
///
/// Returns an empty string when the reference has no path left, e.g. `/ws`.
/// Non-empty results always start with a single `/`.
pub fn canonicalize(raw: &str) -> String {
    let mut path = url_path(raw).trim_end_matches('/');
    if let Some(stripped) = path.strip_suffix(WEBSOCKET_SUFFIX) {
        path = stripped.trim_end_matches('/');
    }

    if path.is_empty() {
        String::new()
    } else if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Whether `path`, with leading slashes stripped, begins with [`API_PREFIX`].
pub fn has_api_prefix(path: &str) -> bool {
    path.trim_start_matches('/').starts_with(API_PREFIX)
}
