//! Hopper Protocol - Core types for the hopper event pipeline
//!
//! This crate provides the foundational types that flow through the pipeline:
//! - `RawRecord` - One raw record as read from the stream or stdin
//! - `ParsedEvent` - A decoded event with envelope metadata attached
//! - `WriteRequest` - The transformed, sink-ready result for one event
//! - `FailureKind` - Terminal classification of what (if anything) went wrong
//! - `EventSchema` / `ColumnSpec` - The per-event column layout
//! - `EventMetadataConfig` - Out-of-band per-event metadata (edge type, comment)
//!
//! # Design Principles
//!
//! - **Immutable after creation**: a `ParsedEvent` is owned by exactly one
//!   transformer worker; a `WriteRequest` is shared read-only via `Arc` when
//!   fanned out to sinks
//! - **Zero-copy payloads**: raw property bytes use `bytes::Bytes` so the
//!   original payload rides along with every request without copies

mod decode;
mod error;
mod event;
mod request;
mod schema;
mod stats;

pub use decode::{JsonLineParser, Parser};
pub use error::ProtocolError;
pub use event::{EdgeType, ParsedEvent, RawRecord};
pub use request::{FailureKind, WriteRequest};
pub use schema::{
    ColumnSpec, EventMetadataConfig, EventMetadataRow, EventSchema, MetadataType,
};
pub use stats::{NoopStats, RecordingStats, StatsLogger};

// Re-export bytes for convenience
pub use bytes::Bytes;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod decode_test;
