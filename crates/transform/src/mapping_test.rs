//! Tests for the login-to-id mapping formatter

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use hopper_protocol::NoopStats;

use crate::cache::{CacheError, MemoryCache, StringCache};
use crate::error::Outcome;
use crate::lookup::{FetchError, ValueFetcher};
use crate::mapping::{login_to_id_formatter, MappingConfig};

/// Fetcher that resolves a fixed table and counts its calls.
struct TableFetcher {
    table: HashMap<String, Result<i64, FetchError>>,
    calls: AtomicUsize,
}

impl TableFetcher {
    fn new(table: HashMap<String, Result<i64, FetchError>>) -> Self {
        Self {
            table,
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ValueFetcher for TableFetcher {
    fn fetch_i64(&self, args: &HashMap<String, String>) -> Result<i64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let login = args.get("login").cloned().unwrap_or_default();
        self.table
            .get(&login)
            .cloned()
            .unwrap_or(Err(FetchError::ExtractingValue))
    }
}

/// Cache whose writes always fail.
struct BrokenCache;

impl StringCache for BrokenCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), CacheError> {
        Err(CacheError("backend unreachable".to_string()))
    }
}

struct Fixture {
    fetcher: Arc<TableFetcher>,
    local: Arc<MemoryCache>,
    remote: Arc<MemoryCache>,
    config: MappingConfig,
}

fn fixture(table: HashMap<String, Result<i64, FetchError>>) -> Fixture {
    let fetcher = Arc::new(TableFetcher::new(table));
    let local = Arc::new(MemoryCache::new());
    let remote = Arc::new(MemoryCache::new());
    let config = MappingConfig {
        fetcher: fetcher.clone(),
        local_cache: local.clone(),
        remote_cache: remote.clone(),
        stats: Arc::new(NoopStats),
    };
    Fixture {
        fetcher,
        local,
        remote,
        config,
    }
}

fn format(config: &MappingConfig, id: Value, login: Value) -> (String, Outcome) {
    login_to_id_formatter(config.clone())(&[Some(&id), Some(&login)])
}

#[test]
fn test_valid_id_short_circuits() {
    let fx = fixture(HashMap::new());
    let (out, outcome) = format(&fx.config, json!(12345), json!("someone"));

    assert_eq!(out, "12345");
    assert_eq!(outcome, Outcome::IdSet);
    assert_eq!(fx.fetcher.call_count(), 0);
}

#[test]
fn test_string_id_short_circuits() {
    let fx = fixture(HashMap::new());
    let (out, outcome) = format(&fx.config, json!("777"), json!("someone"));

    assert_eq!(out, "777");
    assert_eq!(outcome, Outcome::IdSet);
}

#[test]
fn test_non_string_login_is_bad_lookup() {
    let fx = fixture(HashMap::new());
    let (out, outcome) = format(&fx.config, json!("nope"), json!(5));

    assert_eq!(out, "");
    assert_eq!(outcome, Outcome::BadLookupValue);
}

#[test]
fn test_missing_login_is_bad_lookup() {
    let fx = fixture(HashMap::new());
    let id = json!("nope");
    let (out, outcome) = login_to_id_formatter(fx.config.clone())(&[Some(&id), None]);

    assert_eq!(out, "");
    assert_eq!(outcome, Outcome::BadLookupValue);
}

#[test]
fn test_whitespace_login_is_empty_lookup() {
    let fx = fixture(HashMap::new());
    let (out, outcome) = format(&fx.config, json!("nope"), json!("   "));

    assert_eq!(out, "");
    assert_eq!(outcome, Outcome::EmptyLookupValue);
    assert_eq!(fx.fetcher.call_count(), 0);
}

#[test]
fn test_local_cache_hit() {
    let fx = fixture(HashMap::new());
    fx.local.set("someone", "42").unwrap();

    let (out, outcome) = format(&fx.config, json!("nope"), json!("someone"));
    assert_eq!(out, "42");
    assert_eq!(outcome, Outcome::LocalCacheHit);
    assert_eq!(fx.fetcher.call_count(), 0);
}

#[test]
fn test_remote_cache_hit_populates_local() {
    let fx = fixture(HashMap::new());
    fx.remote.set("someone", "42").unwrap();

    let (out, outcome) = format(&fx.config, json!("nope"), json!("someone"));
    assert_eq!(out, "42");
    assert_eq!(outcome, Outcome::RemoteCacheHit);
    assert_eq!(fx.local.get("someone").as_deref(), Some("42"));
}

#[test]
fn test_login_is_trimmed_before_lookup() {
    let fx = fixture(HashMap::new());
    fx.local.set("someone", "42").unwrap();

    let (out, outcome) = format(&fx.config, json!("nope"), json!("  someone  "));
    assert_eq!(out, "42");
    assert_eq!(outcome, Outcome::LocalCacheHit);
}

#[test]
fn test_fetch_success_caches_both() {
    let mut table = HashMap::new();
    table.insert("someone".to_string(), Ok(9000));
    let fx = fixture(table);

    let (out, outcome) = format(&fx.config, json!("nope"), json!("someone"));
    assert_eq!(out, "9000");
    assert_eq!(outcome, Outcome::FetchSuccess);
    assert_eq!(fx.local.get("someone").as_deref(), Some("9000"));
    assert_eq!(fx.remote.get("someone").as_deref(), Some("9000"));
}

#[test]
fn test_invalid_login_is_negatively_cached() {
    let mut table = HashMap::new();
    table.insert("bogus".to_string(), Err(FetchError::ExtractingValue));
    let fx = fixture(table);

    let (out, outcome) = format(&fx.config, json!("nope"), json!("bogus"));
    assert_eq!(out, "");
    assert_eq!(outcome, Outcome::FetchFailure);
    assert_eq!(fx.local.get("bogus").as_deref(), Some(""));
    assert_eq!(fx.remote.get("bogus").as_deref(), Some(""));

    // The negative entry now serves from the local cache, still empty but
    // no longer a fetch.
    let (out, outcome) = format(&fx.config, json!("nope"), json!("bogus"));
    assert_eq!(out, "");
    assert_eq!(outcome, Outcome::LocalCacheHit);
    assert_eq!(fx.fetcher.call_count(), 1);
}

#[test]
fn test_transport_errors_are_not_cached() {
    let mut table = HashMap::new();
    table.insert(
        "someone".to_string(),
        Err(FetchError::Transport("503".to_string())),
    );
    let fx = fixture(table);

    let (out, outcome) = format(&fx.config, json!("nope"), json!("someone"));
    assert_eq!(out, "");
    assert_eq!(outcome, Outcome::FetchFailure);
    assert!(fx.local.get("someone").is_none());
    assert!(fx.remote.get("someone").is_none());
}

#[test]
fn test_rate_limited_fetch_is_not_cached() {
    let mut table = HashMap::new();
    table.insert("someone".to_string(), Err(FetchError::TooManyRequests));
    let fx = fixture(table);

    let (out, outcome) = format(&fx.config, json!("nope"), json!("someone"));
    assert_eq!(out, "");
    assert_eq!(outcome, Outcome::TooManyFetchRequests);
    assert!(fx.local.get("someone").is_none());
    assert!(fx.remote.get("someone").is_none());
}

#[test]
fn test_remote_set_failure_still_emits_value() {
    let mut table = HashMap::new();
    table.insert("someone".to_string(), Ok(9000));
    let fetcher = Arc::new(TableFetcher::new(table));
    let config = MappingConfig {
        fetcher: fetcher.clone(),
        local_cache: Arc::new(MemoryCache::new()),
        remote_cache: Arc::new(BrokenCache),
        stats: Arc::new(NoopStats),
    };

    let (out, outcome) = format(&config, json!("nope"), json!("someone"));
    assert_eq!(out, "9000");
    assert_eq!(outcome, Outcome::CacheSetFailure);
}
