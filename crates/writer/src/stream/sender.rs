//! Batch sender - retrying, rate-limited delivery to the record stream
//!
//! The actual cloud SDK lives behind [`RecordTransport`]; this module owns
//! the per-record retry policy and the partial-failure accounting.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use hopper_protocol::StatsLogger;

use crate::rate_limiter::TaskRateLimiter;
use crate::stream::config::StreamWriterConfig;
use crate::WriterError;

/// Per-record result from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    Ok,
    Failed { code: String, message: String },
}

/// The record stream endpoint (PutRecords-shaped). Out of scope here; the
/// production implementation wraps the cloud SDK.
#[async_trait]
pub trait RecordTransport: Send + Sync {
    /// Put a batch; the result has one entry per record, in order.
    async fn put_records(
        &self,
        stream: &str,
        records: &[Bytes],
    ) -> Result<Vec<RecordStatus>, WriterError>;
}

/// Sends batches through the transport with per-record retries.
pub struct BatchSender {
    transport: Arc<dyn RecordTransport>,
    config: Arc<StreamWriterConfig>,
    stats: Arc<dyn StatsLogger>,
    limiter: Arc<TaskRateLimiter>,
}

impl BatchSender {
    pub fn new(
        transport: Arc<dyn RecordTransport>,
        config: Arc<StreamWriterConfig>,
        stats: Arc<dyn StatsLogger>,
        limiter: Arc<TaskRateLimiter>,
    ) -> Self {
        Self {
            transport,
            config,
            stats,
            limiter,
        }
    }

    fn stat(&self, name: &str) -> String {
        format!("streamwriter.{}.{}", self.config.stream_name, name)
    }

    /// Deliver one batch, retrying failed records up to
    /// `max_attempts_per_record` with linear backoff. Retries are gated by
    /// the rate limiter; a token-less retry drops the records instead of
    /// queueing.
    pub async fn send_batch(&self, batch: Vec<Bytes>) {
        let mut records = if self.config.firehose_redshift_stream {
            batch.into_iter().map(sanitize_for_redshift).collect()
        } else {
            batch
        };

        let mut attempt = 1u32;
        loop {
            self.stats.incr(&self.stat("putrecords.attempted"));
            self.stats
                .incr_by(&self.stat("putrecords.length"), records.len() as i64);

            let failed = match self
                .transport
                .put_records(&self.config.stream_name, &records)
                .await
            {
                Ok(results) => self.collect_failures(records, results),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        stream = %self.config.stream_name,
                        "putrecords call failed"
                    );
                    records
                }
            };

            if failed.is_empty() {
                return;
            }

            if attempt >= self.config.max_attempts_per_record {
                self.stats
                    .incr_by(&self.stat("records_dropped"), failed.len() as i64);
                tracing::warn!(
                    dropped = failed.len(),
                    stream = %self.config.stream_name,
                    attempts = attempt,
                    "dropping records after final attempt"
                );
                return;
            }

            tokio::time::sleep(self.config.retry_delay * attempt).await;
            attempt += 1;

            if !self.limiter.allow() {
                self.stats
                    .incr_by(&self.stat("records_dropped"), failed.len() as i64);
                tracing::warn!(
                    dropped = failed.len(),
                    stream = %self.config.stream_name,
                    "retry throttled; dropping records"
                );
                return;
            }
            records = failed;
        }
    }

    /// Count per-record failures and keep the failed payloads for retry.
    fn collect_failures(&self, records: Vec<Bytes>, results: Vec<RecordStatus>) -> Vec<Bytes> {
        let mut failed = Vec::new();
        for (record, status) in records.into_iter().zip(results) {
            match status {
                RecordStatus::Ok => {}
                RecordStatus::Failed { code, message } => {
                    let bucket = if code == "InternalFailure" {
                        "records_failed.internal_error"
                    } else {
                        "records_failed.unknown_reason"
                    };
                    self.stats.incr(&self.stat(bucket));
                    tracing::debug!(code = %code, message = %message, "record failed");
                    failed.push(record);
                }
            }
        }
        failed
    }
}

/// The warehouse's COPY rejects NUL bytes; strip them from every string
/// value before delivery.
fn sanitize_for_redshift(record: Bytes) -> Bytes {
    let Ok(mut fields) = serde_json::from_slice::<BTreeMap<String, String>>(&record) else {
        return record;
    };
    let mut changed = false;
    for value in fields.values_mut() {
        if value.contains('\0') {
            *value = value.replace('\0', "");
            changed = true;
        }
    }
    if !changed {
        return record;
    }
    match serde_json::to_vec(&fields) {
        Ok(bytes) => Bytes::from(bytes),
        Err(_) => record,
    }
}

// Test module - only compiled during testing
#[cfg(test)]
#[path = "sender_test.rs"]
mod sender_test;
