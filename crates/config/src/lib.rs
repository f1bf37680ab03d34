//! Hopper Config - dynamic schema and event-metadata loading
//!
//! Both loaders fetch a JSON document through the [`ConfigFetcher`]
//! abstraction, parse and build it off the hot path, and publish the result
//! as an atomic snapshot. Readers load the current snapshot per operation
//! and never hold a lock.
//!
//! Refresh runs on a jittered interval in a background task; a failed
//! refresh keeps the previous snapshot and counts a `config.error` timing.
//! Only the initial load is fatal.

mod fetcher;
mod metadata;
mod refresh;
mod schema;

use thiserror::Error;

pub use fetcher::{ConfigFetcher, FileFetcher, StaticFetcher};
pub use metadata::DynamicMetadataLoader;
pub use refresh::LoaderConfig;
pub use schema::DynamicSchemaLoader;

/// Errors from config fetching and building.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The fetcher could not produce a document
    #[error("config fetch failed: {0}")]
    Fetch(String),

    /// The document is not valid JSON of the expected shape
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    /// A schema references an unknown formatter
    #[error("config build failed: {0}")]
    Build(#[from] hopper_transform::TransformError),

    /// I/O error from a file-backed fetcher
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for config operations
pub type Result<T> = std::result::Result<T, ConfigError>;
