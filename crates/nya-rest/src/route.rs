//! Route keys
//!
//! Calls that share a route key share one rate-limit bucket.

use reqwest::Method;
use std::fmt;

/// Rate-limit grouping for a request: `METHOD:` plus the first three `/`-separated
/// segments of the path
///
/// The leading empty segment counts, so `/channels/123/messages` and
/// `/channels/123/typing` both become `GET:/channels/123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey(String);

impl RouteKey {
    pub fn new(method: &Method, path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let prefix = path.split('/').take(3).collect::<Vec<_>>().join("/");
        Self(format!("{method}:{prefix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
