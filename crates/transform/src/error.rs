//! Transform error types and per-column outcomes

use thiserror::Error;

/// Errors that abort the transformation of a whole event.
///
/// Column-level problems are never errors; they surface as [`Outcome`]s.
#[derive(Debug, Error)]
pub enum TransformError {
    /// No schema is configured for this event
    #[error("event {0} is not tracked")]
    NotTracked(String),

    /// The event had no name
    #[error("empty event name")]
    EmptyRequest,

    /// The event's properties are not a JSON object
    #[error("failed to decode properties: {0}")]
    Decode(#[from] serde_json::Error),

    /// A schema references a formatter identifier nobody registered
    #[error("unknown formatter {0}")]
    UnknownFormatter(String),
}

/// Errors from the event metadata loader.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The event has no metadata of the requested type
    #[error("no metadata for event {0}")]
    NotFound(String),

    /// The metadata type string is not one we track
    #[error("invalid metadata type {0}")]
    InvalidMetadataType(String),
}

/// The per-column classification returned by every formatter.
///
/// Successful annotations (cache hits, id-set) still emit a value; skipped
/// outcomes leave an empty cell and flip the event's aggregated failure to
/// `SkippedColumn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Plain success
    Success,

    /// The alleged id parsed directly, no lookup was needed
    IdSet,

    /// The mapping was served from the in-process cache
    LocalCacheHit,

    /// The mapping was served from the shared remote cache
    RemoteCacheHit,

    /// The mapping was fetched from the source of truth
    FetchSuccess,

    /// The value was fetched but could not be written back to the remote
    /// cache; the value is still emitted
    CacheSetFailure,

    /// The fetcher is over quota; skipped without caching
    TooManyFetchRequests,

    /// The fetched document did not contain a usable value
    InvalidMapping,

    /// The lookup key is not a string
    BadLookupValue,

    /// The lookup key is empty after trimming
    EmptyLookupValue,

    /// The fetch failed outright
    FetchFailure,

    /// Generic formatting failure (bad type, out of range, missing property)
    Failed(String),
}

impl Outcome {
    /// Whether this outcome leaves the column empty and marks the event as
    /// partially failed.
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            Self::TooManyFetchRequests
                | Self::InvalidMapping
                | Self::BadLookupValue
                | Self::EmptyLookupValue
                | Self::FetchFailure
                | Self::Failed(_)
        )
    }

    /// The per-event counter recorded for this outcome, if any.
    pub fn stat(&self) -> Option<&'static str> {
        match self {
            Self::Success | Self::Failed(_) => None,
            Self::IdSet => Some("cache.id_set"),
            Self::LocalCacheHit => Some("cache.local_cache_hit"),
            Self::RemoteCacheHit => Some("cache.remote_cache_hit"),
            Self::FetchSuccess => Some("cache.fetch_success"),
            Self::CacheSetFailure => Some("cache.set_failure"),
            Self::TooManyFetchRequests => Some("tooManyFetchRequests"),
            Self::InvalidMapping => Some("invalidMapping"),
            Self::BadLookupValue => Some("cache.bad_lookup_value"),
            Self::EmptyLookupValue => Some("cache.empty_lookup_value"),
            Self::FetchFailure => Some("cache.fetch_failure"),
        }
    }

    /// Shorthand for a generic failure with a context message.
    pub fn failed(offender: impl std::fmt::Display, wanted: &str) -> Self {
        Self::Failed(format!("failed to parse {offender} as a {wanted}"))
    }
}
