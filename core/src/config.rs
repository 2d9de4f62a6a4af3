//! Client and scheduler settings.

use std::time::Duration;

/// Environment variable holding the worker pool size.
pub const POOL_SIZE_ENV: &str = "AOI_THREADPOOL_SIZE";

pub const DEFAULT_POOL_SIZE: usize = 4;

/// Upper bound on the worker pool size.
pub const MAX_POOL_SIZE: usize = 1024;

/// Settings for the `ureq` agent behind `Client`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bound on the whole request, connect to last body byte. `None` waits
    /// indefinitely.
    pub timeout: Option<Duration>,
    /// Redirects to follow before giving up.
    pub max_redirects: u32,
    /// Largest response body accepted, in bytes. `None` reads bodies of any
    /// size.
    pub max_body_size: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            max_redirects: 10,
            max_body_size: None,
        }
    }
}

/// Settings for a `Scheduler`'s worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of requests running at once.
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: DEFAULT_POOL_SIZE,
        }
    }
}

impl SchedulerConfig {
    /// Read the pool size from `AOI_THREADPOOL_SIZE`, falling back to the
    /// default when it is unset or unusable.
    pub fn from_env() -> Self {
        let raw = std::env::var(POOL_SIZE_ENV).ok();
        Self {
            worker_threads: parse_pool_size(raw.as_deref()),
        }
    }
}

/// Interpret a pool size setting, clamping it to `1..=MAX_POOL_SIZE`.
pub fn parse_pool_size(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_POOL_SIZE;
    };
    match raw.trim().parse::<usize>() {
        Ok(size) => size.clamp(1, MAX_POOL_SIZE),
        Err(e) => {
            log::warn!("ignoring {POOL_SIZE_ENV}={raw:?}: {e}");
            DEFAULT_POOL_SIZE
        }
    }
}
