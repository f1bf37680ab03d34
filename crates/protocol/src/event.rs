//! Parsed events and the raw records they come from

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::request::FailureKind;

/// One raw record as read from the stream or standard input.
///
/// Produced by a result pipe, consumed exactly once by a converter worker.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// The raw bytes of the record (one line in stdin mode)
    pub data: Bytes,

    /// When processing of this record started
    pub start: DateTime<Utc>,
}

impl RawRecord {
    pub fn new(data: impl Into<Bytes>, start: DateTime<Utc>) -> Self {
        Self {
            data: data.into(),
            start,
        }
    }
}

/// Origin classifier for an event.
///
/// Mismatches against the configured expected edge type are counted but do
/// not fail the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeType {
    Internal,
    External,
    #[default]
    Unknown,
}

impl EdgeType {
    /// Parse the envelope's `edgeType` field. Anything unrecognized is
    /// `Unknown`, never an error.
    pub fn parse(s: &str) -> Self {
        match s {
            "internal" => Self::Internal,
            "external" => Self::External,
            _ => Self::Unknown,
        }
    }

    /// The wire spelling, as it appears in envelopes and metadata values.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded event, immutable after parse.
///
/// A single [`RawRecord`] may expand to several `ParsedEvent`s; the expanded
/// events share the record's uuid with a `-N` suffix appended.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    /// Event name ("category" on the outbound side)
    pub event: String,

    /// Raw bytes of the event's JSON properties object
    pub properties: Bytes,

    /// Record uuid, unique within a single record expansion
    pub uuid: String,

    /// Client IP as reported by the edge
    pub client_ip: String,

    /// Client user agent, may be empty
    pub user_agent: String,

    /// Server receipt time, epoch seconds
    pub event_time: i64,

    /// Which edge the event entered through
    pub edge_type: EdgeType,

    /// When processing of the enclosing record started
    pub start: DateTime<Utc>,

    /// Failure recorded during parse, `FailureKind::None` on success
    pub failure: FailureKind,
}

impl ParsedEvent {
    /// An event representing a record that could not be parsed.
    ///
    /// The uuid is whatever could be recovered from the envelope (may be
    /// empty). Downstream the transformer short-circuits on the failure and
    /// the request surfaces with category `Unknown`.
    pub fn unparseable(uuid: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            event: "Unknown".to_string(),
            properties: Bytes::new(),
            uuid: uuid.into(),
            client_ip: String::new(),
            user_agent: String::new(),
            event_time: 0,
            edge_type: EdgeType::Unknown,
            start,
            failure: FailureKind::UnableToParseData,
        }
    }

    /// An event representing a worker panic while handling a record.
    ///
    /// `source` carries the original raw bytes when the parse side panicked,
    /// or nothing when the transform side did.
    pub fn panicked(source: Bytes, start: DateTime<Utc>) -> Self {
        Self {
            event: "Unknown".to_string(),
            properties: source,
            uuid: "error".to_string(),
            client_ip: String::new(),
            user_agent: String::new(),
            event_time: 0,
            edge_type: EdgeType::Unknown,
            start,
            failure: FailureKind::PanickedInProcessing,
        }
    }
}
