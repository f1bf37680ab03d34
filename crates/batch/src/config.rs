//! Aggregator configuration

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Invalid aggregator configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MaxSize must be a positive value")]
    NonPositiveMaxSize,

    #[error("MaxAge must be a positive value")]
    NonPositiveMaxAge,

    #[error("BufferLength must be a positive value")]
    NonPositiveBufferLength,
}

/// Configuration shared by [`crate::Batcher`] and [`crate::Globber`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchConfig {
    /// Max combined byte size of the aggregate
    pub max_size: usize,

    /// Max age of the oldest entry before the aggregate is closed
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// Length of the incoming entry queue. Shrinking it causes stalls
    /// sooner; growing it lengthens shutdown.
    pub buffer_length: usize,

    /// Max number of entries per batch; 0 means unbounded. Ignored by the
    /// globber.
    #[serde(default)]
    pub max_entries: usize,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::NonPositiveMaxSize);
        }
        if self.max_age.is_zero() {
            return Err(ConfigError::NonPositiveMaxAge);
        }
        if self.buffer_length == 0 {
            return Err(ConfigError::NonPositiveBufferLength);
        }
        Ok(())
    }
}
