//! String cache interface for the mapping formatters
//!
//! Two instances back the login→id mapping: a local in-process cache and a
//! shared remote one (memcached-style). Both must tolerate concurrent
//! get/set from every transformer worker.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

/// A cache write failed.
///
/// Reads never fail - a backend problem on read is indistinguishable from a
/// miss and is treated as one.
#[derive(Debug, Error)]
#[error("cache set failed: {0}")]
pub struct CacheError(pub String);

/// Thread-safe string-to-string cache.
pub trait StringCache: Send + Sync {
    /// Look up a key. `None` is a miss (or an unreachable backend).
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value. The empty string is a valid value (negative caching).
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Unbounded in-memory cache.
///
/// The production local cache wraps an LRU; this one backs tests and the
/// stdin pipeline where the key space is small.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl StringCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
