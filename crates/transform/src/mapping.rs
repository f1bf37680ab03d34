//! Login-to-id mapping formatter
//!
//! Resolves a user id from two inbound columns: an alleged integer id and a
//! login string. Lookup order is local cache, remote cache, then the
//! fetcher, with write-back on the way out.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::cache::StringCache;
use crate::error::Outcome;
use crate::formatters::{guard_arity, parse_i64, ColumnFormatter};
use crate::lookup::{FetchError, ValueFetcher};
use hopper_protocol::StatsLogger;

/// Dependencies for the mapping formatters, bound at table-build time.
#[derive(Clone)]
pub struct MappingConfig {
    /// Source of truth for the mapping
    pub fetcher: Arc<dyn ValueFetcher>,

    /// In-process cache consulted first
    pub local_cache: Arc<dyn StringCache>,

    /// Shared external cache consulted second
    pub remote_cache: Arc<dyn StringCache>,

    /// Sink for cache-health counters
    pub stats: Arc<dyn StatsLogger>,
}

impl MappingConfig {
    fn record_cache_op(&self, operation: &str, ok: bool) {
        let result = if ok { "success" } else { "error" };
        self.stats.incr(&format!(
            "transformer.login_to_id.cache_error.{operation}.{result}"
        ));
    }
}

/// Look up a mapping formatter by identifier.
pub fn mapping_formatter(id: &str, config: &MappingConfig) -> Option<ColumnFormatter> {
    match id {
        "userIDWithMapping" => Some(login_to_id_formatter(config.clone())),
        _ => None,
    }
}

/// Build the `userIDWithMapping` formatter.
///
/// We try to parse the first argument as a valid integer id and fetch on
/// any kind of failure, not just null or empty. A side effect is that the
/// formatter proactively repairs invalid ids.
pub fn login_to_id_formatter(config: MappingConfig) -> ColumnFormatter {
    guard_arity(
        move |args| {
            if let Ok(id) = parse_i64(args[0]) {
                return (id.to_string(), Outcome::IdSet);
            }

            // The second argument is the login string we key the fetch on.
            let login = match args[1] {
                Some(Value::String(s)) => s.trim(),
                _ => return (String::new(), Outcome::BadLookupValue),
            };
            if login.is_empty() {
                return (String::new(), Outcome::EmptyLookupValue);
            }

            if let Some(id) = config.local_cache.get(login) {
                config.record_cache_op("local_get", true);
                return (id, Outcome::LocalCacheHit);
            }

            if let Some(id) = config.remote_cache.get(login) {
                config.record_cache_op("remote_get", true);
                let _ = config.local_cache.set(login, &id);
                return (id, Outcome::RemoteCacheHit);
            }

            // Cache misses all around; fetch, remembering to write back.
            // Failures to save the fetched value are reported together with
            // the value so dashboards can tell cache health from fetch
            // health while the pipeline keeps moving.
            let mut fetch_args = HashMap::new();
            fetch_args.insert("login".to_string(), login.to_string());

            match config.fetcher.fetch_i64(&fetch_args) {
                Ok(fetched) => {
                    let id = fetched.to_string();
                    let _ = config.local_cache.set(login, &id);
                    let remote_set = config.remote_cache.set(login, &id);
                    config.record_cache_op("remote_set", remote_set.is_ok());
                    match remote_set {
                        Ok(()) => (id, Outcome::FetchSuccess),
                        Err(_) => (id, Outcome::CacheSetFailure),
                    }
                }
                Err(FetchError::TooManyRequests) => {
                    (String::new(), Outcome::TooManyFetchRequests)
                }
                Err(FetchError::ExtractingValue) => {
                    // Most likely an invalid login; negatively cache so we
                    // don't keep fetching it.
                    let _ = config.local_cache.set(login, "");
                    let remote_set = config.remote_cache.set(login, "");
                    config.record_cache_op("remote_set", remote_set.is_ok());
                    (String::new(), Outcome::FetchFailure)
                }
                Err(FetchError::Transport(_)) => (String::new(), Outcome::FetchFailure),
            }
        },
        2,
    )
}
