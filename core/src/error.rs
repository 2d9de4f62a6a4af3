//! Error types for blocking and scheduled requests.
//!
//! # Design
//! `TransportError` covers everything that stops a request before an HTTP
//! status arrives. Its `kind` keeps the failure class that the sentinel
//! status-0 response throws away. Any status the server returns, including
//! 4xx and 5xx, is a `Response`, never an error.
//!
//! `Error` is what scheduled jobs and batches hand to callbacks. Pool-level
//! failures and cancellation get their own variants so a callback always runs,
//! even when no request was made.

use std::io;

/// Broad class of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The URL or a header could not be put on the wire.
    InvalidRequest,
    /// The host name did not resolve.
    Dns,
    /// The TCP connection could not be established.
    Connect,
    /// The TLS session failed.
    Tls,
    Timeout,
    /// The peer spoke something that is not valid HTTP.
    Protocol,
    Io,
    Other,
}

/// A request that did not complete at the transport level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?} transport error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        let kind = match &err {
            ureq::Error::BadUri(_) | ureq::Error::Http(_) => TransportErrorKind::InvalidRequest,
            ureq::Error::HostNotFound => TransportErrorKind::Dns,
            ureq::Error::ConnectionFailed => TransportErrorKind::Connect,
            ureq::Error::Io(io) => match io.kind() {
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
                io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
                _ => TransportErrorKind::Io,
            },
            ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
            ureq::Error::Tls(_) | ureq::Error::Rustls(_) => TransportErrorKind::Tls,
            ureq::Error::Protocol(_) => TransportErrorKind::Protocol,
            _ => TransportErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// Errors delivered by the scheduler and the batch driver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The call was rejected before any request was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The worker pool reported the job itself as failed.
    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("job cancelled")]
    Cancelled,

    /// The worker pool could not be started.
    #[error("worker pool unavailable: {0}")]
    Pool(#[source] io::Error),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),
}
