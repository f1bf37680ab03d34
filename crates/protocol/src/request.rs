//! Write requests - the terminal result of processing one event

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Terminal classification of what (if anything) went wrong with an event.
///
/// Every parsed event produces exactly one [`WriteRequest`] carrying one of
/// these. Partial success (`SkippedColumn`) still produces a full TSV line
/// with empty cells for the failed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureKind {
    /// Full success
    #[default]
    None,

    /// At least one column failed to format; the rest of the line is intact
    SkippedColumn,

    /// No schema is configured for this event
    NonTrackingEvent,

    /// The event had no name, or its properties could not be decoded
    EmptyRequest,

    /// The parser returned an error for the raw record
    UnableToParseData,

    /// A worker panicked while parsing or transforming
    PanickedInProcessing,
}

impl FailureKind {
    /// Whether the request represents a usable line (success or partial).
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::None | Self::SkippedColumn)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::SkippedColumn => "skipped_column",
            Self::NonTrackingEvent => "non_tracking_event",
            Self::EmptyRequest => "empty_request",
            Self::UnableToParseData => "unable_to_parse_data",
            Self::PanickedInProcessing => "panicked_in_processing",
        };
        f.write_str(s)
    }
}

/// The transformed, sink-ready result for one event.
///
/// Created by the transformer, treated as read-only by every sink. Sinks
/// receive it behind an `Arc` so fan-out never copies the payload.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Event name, or `Unknown` when it could not be determined
    pub category: String,

    /// Schema version the line was formatted under
    pub version: i32,

    /// The TSV line (or a JSON dump for non-tracking events)
    pub line: String,

    /// Outbound column name to value, empty values omitted.
    ///
    /// A `BTreeMap` so serialized records have a stable key order.
    pub record: BTreeMap<String, String>,

    /// Uuid of the originating event
    pub uuid: String,

    /// The original raw property bytes
    pub source: Bytes,

    /// What went wrong, if anything
    pub failure: FailureKind,

    /// When processing of the originating record started
    pub start: DateTime<Utc>,
}

impl WriteRequest {
    /// A request recording a failure, with no line content.
    pub fn failed(
        category: impl Into<String>,
        version: i32,
        uuid: impl Into<String>,
        source: Bytes,
        failure: FailureKind,
        start: DateTime<Utc>,
    ) -> Self {
        Self {
            category: category.into(),
            version,
            line: String::new(),
            record: BTreeMap::new(),
            uuid: uuid.into(),
            source,
            failure,
            start,
        }
    }
}
