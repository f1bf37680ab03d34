//! StreamWriter - batched delivery of per-event records to a record stream
//!
//! Consumes write requests from the fan-out, projects each event's record
//! per its configuration, and routes the result through a compressing
//! [`Globber`] (bulk delivery) or a [`Batcher`] (per-record delivery). A
//! background dispatch task hands completed aggregates to the
//! [`BatchSender`].

mod config;
mod sender;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use hopper_batch::{Batcher, Globber};
use hopper_protocol::{StatsLogger, WriteRequest};

pub use config::{EventConfig, StreamType, StreamWriterConfig};
pub use sender::{BatchSender, RecordStatus, RecordTransport};

use crate::filters::{noop_filter, EventFilter, FilterRegistry};
use crate::rate_limiter::TaskRateLimiter;
use crate::{Result, Sink, WriterError};

/// Wire shape for compressed (globbed) records.
#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Fields")]
    fields: &'a BTreeMap<String, String>,
}

enum Payload {
    Glob(Bytes),
    Batch(Vec<Bytes>),
}

struct ResolvedEvent {
    config: EventConfig,
    filter: Option<EventFilter>,
}

struct Aggregates {
    globber: Globber,
    batcher: Batcher,
    dispatch_tx: mpsc::UnboundedSender<Payload>,
    dispatch: JoinHandle<()>,
}

/// Batched streaming writer for a kinesis-style stream.
pub struct StreamWriter {
    config: Arc<StreamWriterConfig>,
    events: std::collections::HashMap<String, ResolvedEvent>,
    default_filter: EventFilter,
    pass_all: EventFilter,
    aggregates: RwLock<Option<Aggregates>>,
}

impl StreamWriter {
    /// Build the writer, validate its config, and spawn the aggregation
    /// workers and dispatch task.
    pub fn new(
        config: StreamWriterConfig,
        filters: &FilterRegistry,
        default_filter: EventFilter,
        transport: Arc<dyn RecordTransport>,
        stats: Arc<dyn StatsLogger>,
    ) -> Result<Self> {
        config.validate(filters)?;
        let config = Arc::new(config);

        let limiter = Arc::new(TaskRateLimiter::new(
            config.limiter_initial_burst,
            config.limiter_refill_period_secs,
        ));
        let sender = BatchSender::new(transport, Arc::clone(&config), stats, limiter);

        let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<Payload>();
        let dispatch = tokio::spawn(async move {
            while let Some(payload) = dispatch_rx.recv().await {
                match payload {
                    Payload::Glob(glob) => sender.send_batch(vec![glob]).await,
                    Payload::Batch(batch) => sender.send_batch(batch).await,
                }
            }
        });

        let glob_tx = dispatch_tx.clone();
        let globber = Globber::new(
            config.globber.clone(),
            Box::new(move |glob| {
                let _ = glob_tx.send(Payload::Glob(glob));
            }),
        )?;

        let batch_tx = dispatch_tx.clone();
        let batcher = Batcher::new(
            config.batcher.clone(),
            Box::new(move |batch| {
                let _ = batch_tx.send(Payload::Batch(batch));
            }),
        )?;

        let events = config
            .events
            .iter()
            .map(|(name, event_config)| {
                let filter = if event_config.filter.is_empty() {
                    None
                } else {
                    filters.get(&event_config.filter)
                };
                (
                    name.clone(),
                    ResolvedEvent {
                        config: event_config.clone(),
                        filter,
                    },
                )
            })
            .collect();

        Ok(Self {
            config,
            events,
            default_filter,
            pass_all: noop_filter(),
            aggregates: RwLock::new(Some(Aggregates {
                globber,
                batcher,
                dispatch_tx,
                dispatch,
            })),
        })
    }

    /// Project, filter, and enqueue one record.
    pub async fn submit(&self, category: &str, record: &BTreeMap<String, String>) {
        let Some(event) = self.events.get(category) else {
            return;
        };

        // The applicable filter: the event's own, or the writer-wide
        // default unless this event opts out.
        let filter = match (&event.filter, event.config.skip_default_filter) {
            (Some(f), _) => f,
            (None, true) => &self.pass_all,
            (None, false) => &self.default_filter,
        };

        let projected = self.project(category, &event.config, record);
        if !filter(&projected) {
            return;
        }

        let aggregates = self.aggregates.read().await;
        let Some(aggregates) = aggregates.as_ref() else {
            tracing::warn!(category = %category, "submit after close; dropping record");
            return;
        };

        if self.config.compress {
            let entry = JsonRecord {
                name: category,
                fields: &projected,
            };
            match serde_json::to_vec(&entry) {
                Ok(bytes) => aggregates.globber.submit(Bytes::from(bytes)).await,
                Err(e) => tracing::error!(error = %e, "failed to marshal globbed record"),
            }
        } else {
            match serde_json::to_vec(&projected) {
                Ok(bytes) => aggregates.batcher.submit(Bytes::from(bytes)).await,
                Err(e) => tracing::error!(error = %e, "failed to marshal batched record"),
            }
        }
    }

    fn project(
        &self,
        category: &str,
        event: &EventConfig,
        record: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let rename = |field: &str| -> String {
            event
                .field_renames
                .get(field)
                .cloned()
                .unwrap_or_else(|| field.to_string())
        };

        let mut out = BTreeMap::new();
        if event.all_fields {
            for (field, value) in record {
                out.insert(rename(field), value.clone());
            }
        } else {
            for field in &event.fields {
                let value = record.get(field).cloned().unwrap_or_default();
                out.insert(rename(field), value);
            }
        }

        if self.config.exclude_empty_fields {
            out.retain(|_, value| !value.is_empty());
        }

        if !self.config.event_name_target_field.is_empty() {
            out.insert(
                self.config.event_name_target_field.clone(),
                category.to_string(),
            );
        }

        out
    }
}

#[async_trait]
impl Sink for StreamWriter {
    async fn write(&self, request: Arc<WriteRequest>) {
        if !request.failure.is_writable() {
            return;
        }
        self.submit(&request.category, &request.record).await;
    }

    /// Aggregates are age-bounded; rotation has nothing extra to flush.
    async fn rotate(&self) -> Result<bool> {
        Ok(true)
    }

    /// Flush both aggregators and wait for the dispatch task to drain.
    async fn close(&self) -> Result<()> {
        let Some(aggregates) = self.aggregates.write().await.take() else {
            return Ok(());
        };

        aggregates.globber.close().await;
        aggregates.batcher.close().await;
        drop(aggregates.dispatch_tx);
        aggregates
            .dispatch
            .await
            .map_err(|e| WriterError::Transport(format!("dispatch task failed: {e}")))?;
        Ok(())
    }
}

// Test module - only compiled during testing
#[cfg(test)]
#[path = "stream_test.rs"]
mod stream_test;
