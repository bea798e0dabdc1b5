//! Session affinity cookie.

use reqwest::header::{HeaderMap, SET_COOKIE};
use std::fmt;

/// A `name=value` cookie pinned to the session by a load balancer.
///
/// Attributes (`Path`, `HttpOnly`, ...) are dropped; only the pair is replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    name: String,
    value: String,
}

impl SessionCookie {
    /// Parses the pair from a `Set-Cookie` value. Returns `None` when there
    /// is no `=` or the name is empty.
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let pair = set_cookie.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            value: value.trim().to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Value for the request `Cookie` header.
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    /// Reads the first `Set-Cookie` value of a response, if it parses.
    pub fn from_response_headers(headers: &HeaderMap) -> Option<Self> {
        let raw = headers.get(SET_COOKIE)?.to_str().ok()?;
        Self::parse(raw)
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}
