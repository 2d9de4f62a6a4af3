//! Blocking HTTP round trips over `ureq`.
//!
//! # Design
//! `Transport` is the seam between request dispatch and the network. The
//! scheduler only ever sees `Arc<dyn Transport>`, so tests can swap in a fake
//! that never opens a socket. `Client` is the real implementation: it owns a
//! `ureq::Agent` configured to return every HTTP status as data, and converts
//! each `RequestConfig` into exactly one `ureq` call.

use ureq::http::uri::Uri;
use ureq::typestate::WithBody;
use ureq::{Agent, RequestBuilder};

use crate::config::ClientConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::http::{Method, RequestConfig, Response};

/// Performs one HTTP exchange and reads the whole response.
pub trait Transport: Send + Sync {
    /// Run `config` against `url` on the calling thread.
    ///
    /// Any status the server sends back is `Ok`. `Err` means the exchange
    /// never completed.
    fn perform(&self, url: &str, config: &RequestConfig) -> Result<Response, TransportError>;

    /// Like `perform`, but folds transport failures into `Response::failed()`.
    fn perform_lossy(&self, url: &str, config: &RequestConfig) -> Response {
        self.perform(url, config).unwrap_or_else(|err| {
            log::warn!("{} {url} did not complete: {err}", config.method);
            Response::failed()
        })
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn perform(&self, url: &str, config: &RequestConfig) -> Result<Response, TransportError> {
        (**self).perform(url, config)
    }
}

/// `Transport` backed by a `ureq::Agent`.
///
/// Cloning is cheap and clones share the agent's connection pool.
#[derive(Clone)]
pub struct Client {
    agent: Agent,
    max_body_size: u64,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(&ClientConfig::default())
    }
}

impl Client {
    pub fn new(config: &ClientConfig) -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout)
            .max_redirects(config.max_redirects)
            .build()
            .new_agent();
        Self {
            agent,
            max_body_size: config.max_body_size.unwrap_or(u64::MAX),
        }
    }
}

impl Transport for Client {
    fn perform(&self, url: &str, config: &RequestConfig) -> Result<Response, TransportError> {
        let target = session_uri(url, config.use_tls)?.to_string();
        log::debug!("{} {target}", config.method);

        let headers = &config.headers;
        let mut response = match config.method {
            Method::Get => with_headers(self.agent.get(&target), headers).call(),
            Method::Head => with_headers(self.agent.head(&target), headers).call(),
            Method::Options => with_headers(self.agent.options(&target), headers).call(),
            Method::Delete => with_headers(self.agent.delete(&target), headers).call(),
            Method::Post => send(with_headers(self.agent.post(&target), headers), config),
            Method::Put => send(with_headers(self.agent.put(&target), headers), config),
            Method::Patch => send(with_headers(self.agent.patch(&target), headers), config),
        }?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .with_config()
            .limit(self.max_body_size)
            .read_to_vec()?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().map(str::to_string),
            headers,
            body,
        })
    }
}

fn with_headers<B>(mut request: RequestBuilder<B>, headers: &[(String, String)]) -> RequestBuilder<B> {
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

fn send(
    request: RequestBuilder<WithBody>,
    config: &RequestConfig,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match config.outgoing_body() {
        Some(body) => request.send(body),
        None => request.send_empty(),
    }
}

/// Resolve `url` to the URI of the session `use_tls` asks for.
///
/// The scheme follows the flag, not the URL. When the URL has no explicit
/// port, the port of its own scheme is kept, so `http://host` with TLS on
/// becomes `https://host:80`.
pub(crate) fn session_uri(url: &str, use_tls: bool) -> Result<Uri, TransportError> {
    let invalid = |msg: String| TransportError::new(TransportErrorKind::InvalidRequest, msg);

    let uri: Uri = url.parse().map_err(|e| invalid(format!("{url}: {e}")))?;
    let scheme = uri
        .scheme_str()
        .ok_or_else(|| invalid(format!("{url}: not an absolute URL")))?;
    let authority = uri
        .authority()
        .ok_or_else(|| invalid(format!("{url}: missing host")))?;
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        other => return Err(invalid(format!("{url}: unsupported scheme {other}"))),
    };

    let wanted = if use_tls { "https" } else { "http" };
    if scheme == wanted {
        return Ok(uri);
    }

    let port = authority.port_u16().unwrap_or(default_port);
    let path = match uri.query() {
        Some(query) => format!("{}?{query}", uri.path()),
        None => uri.path().to_string(),
    };
    Uri::builder()
        .scheme(wanted)
        .authority(format!("{}:{port}", authority.host()))
        .path_and_query(path.as_str())
        .build()
        .map_err(|e| invalid(format!("{url}: {e}")))
}
