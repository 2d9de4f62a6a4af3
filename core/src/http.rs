//! Request and response values exchanged with the transport.
//!
//! # Design
//! These types describe one HTTP exchange as plain data. `RequestConfig` is
//! built by the caller and cloned into every request that uses it, so a
//! single descriptor can drive many jobs. `Response` is produced exactly once
//! per request and moved to whoever observes the outcome: the caller of a
//! blocking call, or the completion callback of a scheduled one.
//!
//! All fields use owned types (`String`, `Vec`) so values can cross the
//! worker-pool boundary without lifetime concerns.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Headers every `RequestConfig::default()` starts with.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[("Content-Type", "application/json")];

/// Returns true if `status` is in the 2xx range.
pub fn status_ok(status: u16) -> bool {
    (200..=299).contains(&status)
}

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Whether a request with this method carries `RequestConfig::body`.
    ///
    /// Only POST, PUT and PATCH send a body, and only when it is non-empty.
    pub fn sends_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put | Method::Patch)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes one HTTP call: method, headers, body and whether to use TLS.
///
/// Builder methods consume and return `self`, so a finished descriptor is
/// never mutated in place. Clone it to reuse it across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfig {
    pub method: Method,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
}

fn default_use_tls() -> bool {
    true
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method: Method::Get,
            headers: DEFAULT_HEADERS
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: Vec::new(),
            use_tls: default_use_tls(),
        }
    }
}

impl RequestConfig {
    /// A descriptor for `method` with the default headers, no body and TLS on.
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    pub fn post(body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::Post).body(body)
    }

    pub fn put(body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::Put).body(body)
    }

    pub fn patch(body: impl Into<Vec<u8>>) -> Self {
        Self::new(Method::Patch).body(body)
    }

    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    /// A descriptor whose body is `value` serialized as JSON.
    pub fn json<T: Serialize>(method: Method, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self::new(method).body(body))
    }

    /// Append a header. Earlier pairs with the same name are kept.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Drop every header, including the defaults.
    pub fn clear_headers(mut self) -> Self {
        self.headers.clear();
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// The body that goes on the wire, if any.
    pub fn outgoing_body(&self) -> Option<&[u8]> {
        if self.method.sends_body() && !self.body.is_empty() {
            Some(&self.body)
        } else {
            None
        }
    }
}

/// The outcome of one completed HTTP round trip.
///
/// 4xx and 5xx statuses are ordinary responses. A status of 0 only appears in
/// the sentinel returned by `Client::perform_lossy` when the request never
/// completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    /// Canonical reason phrase for `status` (`"Not Found"` for 404), not the
    /// phrase on the server's status line, which `ureq` does not expose.
    /// `None` for codes without a registered phrase.
    pub status_text: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// The sentinel for a request that failed below the HTTP layer.
    pub fn failed() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        status_ok(self.status)
    }

    /// First header value whose name matches `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
