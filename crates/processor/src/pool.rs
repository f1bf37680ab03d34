//! The processor pool

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossfire::{MAsyncRx, MAsyncTx};
use thiserror::Error;
use tokio::task::JoinHandle;

use hopper_protocol::{ParsedEvent, Parser, RawRecord, StatsLogger, WriteRequest};
use hopper_transform::Transformer;
use hopper_writer::Sink;

/// Errors from pool operations.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The pool is closed and accepts no more records
    #[error("processor pool is closed")]
    Closed,
}

/// Sizing for the pool's fleets and queues.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Parse workers draining the raw queue
    pub converters: usize,

    /// Format workers draining the event queue
    pub transformers: usize,

    /// Bound of both queues; full queues apply backpressure to `submit`
    pub queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            converters: 4,
            transformers: 8,
            queue_size: 48,
        }
    }
}

/// The worker pool. Create with [`ProcessorPool::new`], call
/// [`start`](Self::start), feed it with [`submit`](Self::submit), and shut
/// down with [`close`](Self::close).
pub struct ProcessorPool {
    config: PoolConfig,
    parser: Arc<dyn Parser>,
    transformer: Arc<dyn Transformer>,
    writer: Arc<dyn Sink>,
    stats: Arc<dyn StatsLogger>,

    raw_tx: MAsyncTx<RawRecord>,
    raw_rx: MAsyncRx<RawRecord>,
    event_tx: Option<MAsyncTx<ParsedEvent>>,
    event_rx: MAsyncRx<ParsedEvent>,

    converters: Vec<JoinHandle<()>>,
    transformers: Vec<JoinHandle<()>>,
}

impl ProcessorPool {
    pub fn new(
        config: PoolConfig,
        parser: Arc<dyn Parser>,
        transformer: Arc<dyn Transformer>,
        writer: Arc<dyn Sink>,
        stats: Arc<dyn StatsLogger>,
    ) -> Self {
        let (raw_tx, raw_rx) = crossfire::mpmc::bounded_async(config.queue_size);
        let (event_tx, event_rx) = crossfire::mpmc::bounded_async(config.queue_size);

        Self {
            config,
            parser,
            transformer,
            writer,
            stats,
            raw_tx,
            raw_rx,
            event_tx: Some(event_tx),
            event_rx,
            converters: Vec::new(),
            transformers: Vec::new(),
        }
    }

    /// Spawn the converter and transformer fleets.
    pub fn start(&mut self) {
        let Some(event_tx) = self.event_tx.as_ref() else {
            return;
        };

        for _ in 0..self.config.converters {
            let worker = Converter {
                parser: Arc::clone(&self.parser),
                incoming: self.raw_rx.clone(),
                outgoing: event_tx.clone(),
                stats: Arc::clone(&self.stats),
            };
            self.converters.push(tokio::spawn(worker.run()));
        }

        for _ in 0..self.config.transformers {
            let worker = TransformWorker {
                transformer: Arc::clone(&self.transformer),
                incoming: self.event_rx.clone(),
                writer: Arc::clone(&self.writer),
                stats: Arc::clone(&self.stats),
            };
            self.transformers.push(tokio::spawn(worker.run()));
        }

        tracing::info!(
            converters = self.config.converters,
            transformers = self.config.transformers,
            queue_size = self.config.queue_size,
            "processor pool started"
        );
    }

    /// Submit one raw record. Suspends when the raw queue is full.
    pub async fn submit(&self, record: RawRecord) -> Result<(), ProcessorError> {
        self.raw_tx
            .send(record)
            .await
            .map_err(|_| ProcessorError::Closed)
    }

    /// Shut down in stage order: drain converters, then transformers, then
    /// close the writer. Pending records flush before this returns.
    pub async fn close(mut self) {
        // Dropping the only raw sender ends the converter fleet once the
        // queue drains.
        drop(self.raw_tx);
        for handle in self.converters.drain(..) {
            let _ = handle.await;
        }

        // Converters hold event senders; with them gone this drop closes
        // the event queue and ends the transformer fleet.
        self.event_tx = None;
        for handle in self.transformers.drain(..) {
            let _ = handle.await;
        }

        if let Err(e) = self.writer.close().await {
            tracing::error!(error = %e, "failed to close pool writer");
        }

        tracing::info!("processor pool closed");
    }
}

struct Converter {
    parser: Arc<dyn Parser>,
    incoming: MAsyncRx<RawRecord>,
    outgoing: MAsyncTx<ParsedEvent>,
    stats: Arc<dyn StatsLogger>,
}

impl Converter {
    async fn run(self) {
        while let Ok(record) = self.incoming.recv().await {
            // Guarded region: a panicking parser costs one failure event,
            // not the worker.
            let parsed = catch_unwind(AssertUnwindSafe(|| self.parser.parse(&record)));

            let events = match parsed {
                Ok(Ok(events)) => {
                    self.stats.incr_by("processor.events_parsed", events.len() as i64);
                    events
                }
                Ok(Err(e)) => {
                    self.stats.incr("processor.parse_errors");
                    tracing::warn!(error = %e, "failed to parse record");
                    vec![ParsedEvent::unparseable(e.uuid(), record.start)]
                }
                Err(_) => {
                    self.stats.incr("processor.parse_panics");
                    tracing::error!("parser panicked; emitting failure event");
                    vec![ParsedEvent::panicked(record.data.clone(), record.start)]
                }
            };

            for event in events {
                if self.outgoing.send(event).await.is_err() {
                    return;
                }
            }
        }
    }
}

struct TransformWorker {
    transformer: Arc<dyn Transformer>,
    incoming: MAsyncRx<ParsedEvent>,
    writer: Arc<dyn Sink>,
    stats: Arc<dyn StatsLogger>,
}

impl TransformWorker {
    async fn run(self) {
        while let Ok(event) = self.incoming.recv().await {
            let request = catch_unwind(AssertUnwindSafe(|| self.transformer.consume(&event)));

            let request = match request {
                Ok(request) => request,
                Err(_) => {
                    self.stats.incr("processor.transform_panics");
                    tracing::error!(
                        event = %event.event,
                        "transformer panicked; emitting failure request"
                    );
                    WriteRequest::failed(
                        "Unknown",
                        0,
                        "error",
                        bytes::Bytes::new(),
                        hopper_protocol::FailureKind::PanickedInProcessing,
                        event.start,
                    )
                }
            };

            self.writer.write(Arc::new(request)).await;
        }
    }
}
