//! Hopper Writer - sink fan-out and batched streaming delivery
//!
//! Everything downstream of the transformer speaks the [`Sink`] capability
//! set: write a request, rotate, close. [`Multee`] fans each request out to
//! a dynamic set of sinks; [`StreamWriter`] batches per-event records for a
//! kinesis-style record stream behind a retrying, rate-limited sender.
//!
//! ```text
//! [Transformer] --Arc<WriteRequest>--> [Multee] --+--> StreamWriter --> Globber/Batcher --> BatchSender
//!                                                 +--> StdoutSink
//!                                                 +--> ...
//! ```

mod filters;
mod multee;
mod rate_limiter;
mod stdout;
mod stream;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use hopper_protocol::WriteRequest;

pub use filters::{in_set_filter, noop_filter, EventFilter, FilterRegistry};
pub use multee::Multee;
pub use rate_limiter::TaskRateLimiter;
pub use stdout::StdoutSink;
pub use stream::{
    BatchSender, EventConfig, RecordStatus, RecordTransport, StreamType, StreamWriter,
    StreamWriterConfig,
};

/// Errors from sink configuration and delivery.
#[derive(Debug, Error)]
pub enum WriterError {
    /// Invalid writer configuration
    #[error("invalid writer config: {0}")]
    Config(String),

    /// Configuration references a filter nobody registered
    #[error("unknown filter {0}")]
    UnknownFilter(String),

    /// Invalid aggregator configuration
    #[error(transparent)]
    Batch(#[from] hopper_batch::ConfigError),

    /// I/O error from a file-backed sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record transport failed wholesale
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type for writer operations
pub type Result<T> = std::result::Result<T, WriterError>;

/// The capability set every downstream writer implements.
///
/// Requests arrive behind an `Arc` and are treated as read-only; a sink
/// never mutates or re-orders what it is handed.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one request. Delivery problems are the sink's to log and
    /// count; they never propagate back into the pipeline.
    async fn write(&self, request: Arc<WriteRequest>);

    /// Ask the sink to rotate whatever it is accumulating. Returns whether
    /// the sink considers itself fully rotated.
    async fn rotate(&self) -> Result<bool>;

    /// Flush and release resources. Called exactly once.
    async fn close(&self) -> Result<()>;
}
