//! Blocking and pooled HTTP requests over `ureq`.
//!
//! # Overview
//! A request is described by a `RequestConfig` and run against a URL in one
//! of three ways:
//! - inline on the calling thread with `Client::perform`;
//! - on a worker thread with `Scheduler::submit`, the callback firing when
//!   the caller drives `Scheduler::run`;
//! - as a batch with `perform_batch`, which blocks until every request in the
//!   list has finished.
//!
//! # Design
//! - The scheduler is an explicit, caller-owned value. There is no global
//!   loop, so tests run isolated schedulers side by side.
//! - Transport failures are `TransportError` values tagged with a kind;
//!   `perform_lossy` is there for callers that want the status-0 sentinel.
//! - Every scheduled job calls back exactly once, including on worker panic
//!   and cancellation.

pub mod batch;
pub mod config;
pub mod error;
pub mod http;
pub mod scheduler;
pub mod transport;

pub use batch::{perform_batch, perform_batch_with};
pub use config::{ClientConfig, SchedulerConfig};
pub use error::{Error, TransportError, TransportErrorKind};
pub use http::{status_ok, Method, RequestConfig, Response, DEFAULT_HEADERS};
pub use scheduler::{JobHandle, JobId, Scheduler};
pub use transport::{Client, Transport};
