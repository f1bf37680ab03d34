//! Protocol error types
//!
//! Errors that can occur while decoding inbound records.

use thiserror::Error;

/// Errors that can occur during protocol operations
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The outer record envelope is not valid JSON
    #[error("invalid record envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    /// The `data` field is not valid base64
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// The decoded payload is not a valid event object or array
    #[error("invalid event payload for uuid {uuid}: {source}")]
    InvalidPayload {
        uuid: String,
        #[source]
        source: serde_json::Error,
    },

    /// The `receivedAt` field is not a valid RFC 3339 timestamp
    #[error("invalid receivedAt timestamp for uuid {uuid}: {source}")]
    InvalidTimestamp {
        uuid: String,
        #[source]
        source: chrono::ParseError,
    },

    /// The upstream reader handed us an error instead of data
    #[error("stream read error: {0}")]
    StreamRead(String),
}

impl ProtocolError {
    /// The uuid recovered from the envelope, when the envelope itself parsed.
    ///
    /// Error records keep their uuid so the failure can be traced back to the
    /// original submission; envelope-level failures have nothing to recover.
    pub fn uuid(&self) -> &str {
        match self {
            Self::InvalidPayload { uuid, .. } | Self::InvalidTimestamp { uuid, .. } => uuid,
            _ => "",
        }
    }
}
