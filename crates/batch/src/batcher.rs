//! Batcher - size- and age-bounded lists of opaque entries

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{BatchConfig, ConfigError};

/// Called by the batcher worker for every completed batch, in submission
/// order.
pub type BatchComplete = Box<dyn FnMut(Vec<Bytes>) + Send>;

/// Batches byte entries based on size, count, and age criteria.
///
/// Entries submitted while the completion callback runs queue up in the
/// input channel; once it fills, `submit` blocks the caller.
pub struct Batcher {
    incoming: mpsc::Sender<Bytes>,
    worker: JoinHandle<()>,
}

impl Batcher {
    pub fn new(config: BatchConfig, completor: BatchComplete) -> Result<Self, ConfigError> {
        config.validate()?;

        let (incoming, rx) = mpsc::channel(config.buffer_length);
        let worker = Worker {
            config,
            completor,
            pending: Vec::new(),
            pending_size: 0,
            deadline: None,
        };

        Ok(Self {
            incoming,
            worker: tokio::spawn(worker.run(rx)),
        })
    }

    /// Submit an entry. Blocks when the input queue is full.
    pub async fn submit(&self, entry: Bytes) {
        // A send failure means the worker is gone; entries submitted after
        // close are dropped by design.
        let _ = self.incoming.send(entry).await;
    }

    /// Drain the queue, flush the pending batch, and wait for the last
    /// completion callback to return.
    pub async fn close(self) {
        drop(self.incoming);
        let _ = self.worker.await;
    }
}

struct Worker {
    config: BatchConfig,
    completor: BatchComplete,
    pending: Vec<Bytes>,
    pending_size: usize,
    deadline: Option<Instant>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Bytes>) {
        loop {
            tokio::select! {
                entry = rx.recv() => match entry {
                    Some(entry) => self.add(entry),
                    None => break,
                },
                () = age_expired(self.deadline), if self.deadline.is_some() => {
                    self.complete();
                }
            }
        }
        self.complete();
    }

    fn add(&mut self, entry: Bytes) {
        if self.pending_size + entry.len() > self.config.max_size && !self.pending.is_empty() {
            self.complete();
        }

        if self.pending.is_empty() {
            self.deadline = Some(Instant::now() + self.config.max_age);
        }

        self.pending_size += entry.len();
        self.pending.push(entry);

        if self.config.max_entries > 0 && self.pending.len() >= self.config.max_entries {
            self.complete();
        }
    }

    fn complete(&mut self) {
        self.deadline = None;
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        self.pending_size = 0;
        (self.completor)(batch);
    }
}

async fn age_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        // Guarded by the `if` in select!; never polled without a deadline.
        None => std::future::pending().await,
    }
}
