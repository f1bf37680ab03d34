//! Inbound record decoding
//!
//! In stdin mode each raw record is one JSON envelope per line:
//!
//! ```text
//! {"receivedAt": ISO8601, "clientIp": ..., "data": base64(JSON),
//!  "uuid": ..., "recordversion": N, "edgeType": "internal"|"external"}
//! ```
//!
//! The inner `data` decodes to `{"event": ..., "properties": {...}}`, or to
//! an array of such objects for multi-event records. Expanded events share
//! the envelope uuid with a `-N` suffix.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::ProtocolError;
use crate::event::{EdgeType, ParsedEvent, RawRecord};
use crate::Result;

/// Decodes one raw record into zero or more parsed events.
///
/// Implementations must be total with respect to their own state: a bad
/// record is an `Err`, never a panic, though the processor pool contains
/// panics from misbehaving implementations anyway.
pub trait Parser: Send + Sync {
    fn parse(&self, raw: &RawRecord) -> Result<Vec<ParsedEvent>>;
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "receivedAt", default)]
    received_at: String,
    #[serde(rename = "clientIp", default)]
    client_ip: String,
    data: String,
    #[serde(default)]
    uuid: String,
    #[serde(rename = "edgeType", default)]
    edge_type: String,
    #[serde(rename = "userAgent", default)]
    user_agent: String,
}

#[derive(Deserialize)]
struct InnerEvent<'a> {
    #[serde(default)]
    event: String,
    #[serde(borrow)]
    properties: Option<&'a RawValue>,
}

/// The standard one-JSON-object-per-line parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLineParser;

impl JsonLineParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for JsonLineParser {
    fn parse(&self, raw: &RawRecord) -> Result<Vec<ParsedEvent>> {
        let envelope: Envelope =
            serde_json::from_slice(&raw.data).map_err(ProtocolError::InvalidEnvelope)?;

        let payload = BASE64.decode(envelope.data.as_bytes())?;

        let event_time = DateTime::parse_from_rfc3339(&envelope.received_at)
            .map_err(|source| ProtocolError::InvalidTimestamp {
                uuid: envelope.uuid.clone(),
                source,
            })?
            .timestamp();

        // Multi-event records are an array of the same inner object shape.
        let is_array = payload
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'[');

        let inner: Vec<InnerEvent> = if is_array {
            serde_json::from_slice(&payload)
        } else {
            serde_json::from_slice::<InnerEvent>(&payload).map(|e| vec![e])
        }
        .map_err(|source| ProtocolError::InvalidPayload {
            uuid: envelope.uuid.clone(),
            source,
        })?;

        let multi = inner.len() > 1;
        let edge_type = EdgeType::parse(&envelope.edge_type);

        Ok(inner
            .into_iter()
            .enumerate()
            .map(|(n, e)| {
                let uuid = if multi {
                    format!("{}-{}", envelope.uuid, n)
                } else {
                    envelope.uuid.clone()
                };
                let properties = match e.properties {
                    Some(raw) => Bytes::copy_from_slice(raw.get().as_bytes()),
                    None => Bytes::from_static(b"{}"),
                };
                ParsedEvent {
                    event: e.event,
                    properties,
                    uuid,
                    client_ip: envelope.client_ip.clone(),
                    user_agent: envelope.user_agent.clone(),
                    event_time,
                    edge_type,
                    start: raw.start,
                    failure: crate::FailureKind::None,
                }
            })
            .collect())
    }
}
