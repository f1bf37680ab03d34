//! Streaming writer configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use hopper_batch::BatchConfig;

use crate::filters::FilterRegistry;
use crate::WriterError;

/// Which kind of record stream the writer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// Per-record stream (kinesis-style)
    Stream,
    /// Delivery stream (firehose-style)
    Firehose,
}

/// Per-event delivery configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EventConfig {
    /// Whitelist of record fields to emit; missing fields emit as empty
    pub fields: Vec<String>,

    /// Pass every record field through instead of whitelisting
    pub all_fields: bool,

    /// Outbound key remapping
    pub field_renames: HashMap<String, String>,

    /// Named filter from the registry; empty means none
    pub filter: String,

    /// Bypass the writer-wide default filter for this event
    pub skip_default_filter: bool,
}

/// Configuration for one [`crate::StreamWriter`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamWriterConfig {
    pub stream_name: String,
    pub stream_type: StreamType,

    /// Route records through the compressing globber instead of the batcher
    #[serde(default)]
    pub compress: bool,

    /// Strings are sanitized for the warehouse's COPY (NUL bytes stripped)
    #[serde(default)]
    pub firehose_redshift_stream: bool,

    /// Inject the event name into each record under this key; empty
    /// disables injection
    #[serde(default)]
    pub event_name_target_field: String,

    /// Drop empty-string values from emitted records
    #[serde(default)]
    pub exclude_empty_fields: bool,

    /// Events this writer delivers, keyed by event name
    pub events: HashMap<String, EventConfig>,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Per-record retry budget
    pub max_attempts_per_record: u32,

    /// Backoff base between per-record retries
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    pub globber: BatchConfig,
    pub batcher: BatchConfig,

    /// Retry rate limiter: immediate tasks allowed before refill kicks in
    #[serde(default = "default_limiter_burst")]
    pub limiter_initial_burst: u64,

    /// Retry rate limiter: seconds per refilled task; 0 disables limiting
    #[serde(default)]
    pub limiter_refill_period_secs: u64,
}

fn default_buffer_size() -> usize {
    1024
}

fn default_limiter_burst() -> u64 {
    100
}

impl StreamWriterConfig {
    /// Reject configurations that cannot work before any worker spawns.
    pub fn validate(&self, filters: &FilterRegistry) -> Result<(), WriterError> {
        self.globber.validate()?;
        self.batcher.validate()?;

        if self.firehose_redshift_stream && self.compress {
            return Err(WriterError::Config(
                "FirehoseRedshiftStream cannot be used with Compress".to_string(),
            ));
        }
        if self.firehose_redshift_stream && self.stream_type != StreamType::Firehose {
            return Err(WriterError::Config(
                "FirehoseRedshiftStream can only be used with the firehose stream type"
                    .to_string(),
            ));
        }

        for (event, config) in &self.events {
            if !config.filter.is_empty() && !filters.contains(&config.filter) {
                tracing::error!(event = %event, filter = %config.filter, "unknown filter in config");
                return Err(WriterError::UnknownFilter(config.filter.clone()));
            }
        }

        Ok(())
    }
}
