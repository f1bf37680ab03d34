//! The schema-driven transformer
//!
//! Consumes one parsed event, formats every schema column, and emits
//! exactly one write request. Total by construction: any failure mode maps
//! to a request with the matching failure kind, never to an error or panic
//! escaping this module.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::value::RawValue;
use serde_json::Value;

use hopper_protocol::{EdgeType, FailureKind, ParsedEvent, StatsLogger, WriteRequest};

use crate::error::TransformError;
use crate::loaders::{EventMetadataLoader, SchemaLoader};

/// Turns parsed events into write requests.
pub trait Transformer: Send + Sync {
    fn consume(&self, event: &ParsedEvent) -> WriteRequest;
}

/// Transformer driven by per-event column schemas.
pub struct SchemaTransformer {
    schemas: Arc<dyn SchemaLoader>,
    metadata: Arc<dyn EventMetadataLoader>,
    stats: Arc<dyn StatsLogger>,
}

#[derive(serde::Serialize)]
struct NontrackedEvent<'a> {
    event: &'a str,
    properties: &'a RawValue,
}

impl SchemaTransformer {
    pub fn new(
        schemas: Arc<dyn SchemaLoader>,
        metadata: Arc<dyn EventMetadataLoader>,
        stats: Arc<dyn StatsLogger>,
    ) -> Self {
        Self {
            schemas,
            metadata,
            stats,
        }
    }

    /// Preserve an untracked event as a JSON dump for offline triage.
    fn nontracked_dump(&self, event: &ParsedEvent) -> String {
        serde_json::from_slice::<&RawValue>(&event.properties)
            .ok()
            .and_then(|properties| {
                serde_json::to_string(&NontrackedEvent {
                    event: &event.event,
                    properties,
                })
                .ok()
            })
            .unwrap_or_default()
    }

    fn transform(
        &self,
        event: &ParsedEvent,
    ) -> Result<(String, BTreeMap<String, String>, bool), TransformError> {
        if event.event.is_empty() {
            return Err(TransformError::EmptyRequest);
        }

        let columns = self.schemas.columns_for_event(&event.event)?;

        let mut properties: serde_json::Map<String, Value> =
            serde_json::from_slice(&event.properties)?;

        match event.edge_type {
            EdgeType::Internal | EdgeType::External => {
                self.stats
                    .incr(&format!("edge-type.{}.{}", event.event, event.edge_type));
            }
            EdgeType::Unknown => {
                tracing::error!(event = %event.event, uuid = %event.uuid, "invalid edge type");
            }
        }

        // Both typed lookup failures mean "no metadata"; skip the counter.
        if let Ok(expected) = self.metadata.metadata_value(&event.event, "edge_type") {
            if !expected.is_empty() && expected != event.edge_type.as_str() {
                self.stats.incr(&format!(
                    "edge-type-mismatch.{}.{}.{}",
                    event.event, event.edge_type, expected
                ));
            }
        }

        // Always replace the timestamp with server time.
        if let Some(client_time) = properties.get("time").cloned() {
            properties.insert("client_time".to_string(), client_time);
        }
        properties.insert("time".to_string(), Value::from(event.event_time));

        // Still allow clients to override the ip address.
        if !properties.contains_key("ip") {
            properties.insert("ip".to_string(), Value::from(event.client_ip.clone()));
        }

        // Still allow clients to override the user agent.
        if !properties.contains_key("user_agent") && !event.user_agent.is_empty() {
            properties.insert(
                "user_agent".to_string(),
                Value::from(event.user_agent.clone()),
            );
        }

        let mut line = String::with_capacity(columns.len() * 16);
        let mut record = BTreeMap::new();
        let mut results: BTreeMap<&'static str, i64> = BTreeMap::new();
        let mut skipped = false;

        for (n, column) in columns.iter().enumerate() {
            let (value, outcome) = column.format(&properties);

            if outcome.is_skipped() {
                skipped = true;
                *results.entry("skippedColumn").or_insert(0) += 1;
                tracing::debug!(
                    event = %event.event,
                    column = %column.outbound,
                    outcome = ?outcome,
                    "column skipped"
                );
            } else {
                *results.entry("success").or_insert(0) += 1;
            }
            if let Some(stat) = outcome.stat() {
                *results.entry(stat).or_insert(0) += 1;
            }

            if n != 0 {
                line.push('\t');
            }
            quote_into(&mut line, &value);
            if !value.is_empty() {
                record.insert(column.outbound.clone(), value);
            }
        }

        for (stat, count) in results {
            self.stats
                .incr_by(&format!("transformer.{}.{}", event.event, stat), count);
        }

        Ok((line, record, skipped))
    }
}

impl Transformer for SchemaTransformer {
    fn consume(&self, event: &ParsedEvent) -> WriteRequest {
        let version = self.schemas.version_for_event(&event.event);

        if event.failure != FailureKind::None {
            return WriteRequest::failed(
                event.event.clone(),
                version,
                event.uuid.clone(),
                event.properties.clone(),
                event.failure,
                event.start,
            );
        }

        let t0 = Instant::now();
        let result = self.transform(event);
        self.stats
            .timing(&format!("transformer.{}", event.event), t0.elapsed());

        match result {
            Ok((line, record, skipped)) => WriteRequest {
                category: event.event.clone(),
                version,
                line,
                record,
                uuid: event.uuid.clone(),
                source: event.properties.clone(),
                failure: if skipped {
                    FailureKind::SkippedColumn
                } else {
                    FailureKind::None
                },
                start: event.start,
            },
            Err(TransformError::NotTracked(_)) => {
                let mut request = WriteRequest::failed(
                    event.event.clone(),
                    version,
                    event.uuid.clone(),
                    event.properties.clone(),
                    FailureKind::NonTrackingEvent,
                    event.start,
                );
                request.line = self.nontracked_dump(event);
                request
            }
            Err(_) => WriteRequest::failed(
                "Unknown",
                version,
                event.uuid.clone(),
                event.properties.clone(),
                FailureKind::EmptyRequest,
                event.start,
            ),
        }
    }
}

/// Append `s` as a double-quoted field, inner quotes and control characters
/// escaped per JSON string rules.
fn quote_into(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
