//! Value fetcher interface
//!
//! The fetcher is the source of truth behind the caches - an HTTP service
//! in production. It owns its own timeouts and concurrency bound; the
//! transformer treats a slow fetcher as a throughput problem, not a bug.

use std::collections::HashMap;

use thiserror::Error;

/// Why a fetch produced no value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The fetcher is rate limited or over quota. Skip without caching.
    #[error("too many fetch requests")]
    TooManyRequests,

    /// The response did not contain an extractable value - most likely an
    /// invalid lookup key. Safe to cache negatively.
    #[error("unable to extract value from response")]
    ExtractingValue,

    /// Transport-level failure. Never cached.
    #[error("fetch failed: {0}")]
    Transport(String),
}

/// Fetches an integer value keyed by a set of named arguments.
pub trait ValueFetcher: Send + Sync {
    fn fetch_i64(&self, args: &HashMap<String, String>) -> Result<i64, FetchError>;
}
