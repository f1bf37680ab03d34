//! Globber - compressed JSON-array aggregation
//!
//! Entries accumulate in a growing `[e1,e2,...` buffer; on close the array
//! is terminated, deflate-compressed at fastest speed, and prefixed with a
//! single version byte.

use bytes::Bytes;
use flate2::{Compress, Compression, FlushCompress, Status};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{BatchConfig, ConfigError};

/// Version byte prefixed to every emitted glob.
pub const GLOB_VERSION: u8 = 1;

/// Called by the globber worker for every completed glob.
pub type GlobComplete = Box<dyn FnMut(Bytes) + Send>;

/// Combines JSON-marshalled entries into compressed JSON arrays.
pub struct Globber {
    incoming: mpsc::Sender<Bytes>,
    worker: JoinHandle<()>,
}

impl Globber {
    pub fn new(config: BatchConfig, completor: GlobComplete) -> Result<Self, ConfigError> {
        config.validate()?;

        let (incoming, rx) = mpsc::channel(config.buffer_length);
        let worker = Worker {
            config,
            completor,
            pending: Vec::new(),
            // Raw deflate, no zlib header: decoders expect a bare stream
            // after the version byte.
            compressor: Compress::new(Compression::fast(), false),
            deadline: None,
        };

        Ok(Self {
            incoming,
            worker: tokio::spawn(worker.run(rx)),
        })
    }

    /// Submit an entry. Blocks when the input queue is full.
    pub async fn submit(&self, entry: Bytes) {
        let _ = self.incoming.send(entry).await;
    }

    /// Drain the queue, flush the pending glob, and wait for the last
    /// completion callback to return.
    pub async fn close(self) {
        drop(self.incoming);
        let _ = self.worker.await;
    }
}

struct Worker {
    config: BatchConfig,
    completor: GlobComplete,
    pending: Vec<u8>,
    compressor: Compress,
    deadline: Option<Instant>,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Bytes>) {
        loop {
            tokio::select! {
                entry = rx.recv() => match entry {
                    Some(entry) => self.add(&entry),
                    None => break,
                },
                () = age_expired(self.deadline), if self.deadline.is_some() => {
                    self.complete();
                }
            }
        }
        self.complete();
    }

    fn add(&mut self, entry: &[u8]) {
        if self.pending.len() + entry.len() > self.config.max_size && !self.pending.is_empty() {
            self.complete();
        }

        if self.pending.is_empty() {
            self.deadline = Some(Instant::now() + self.config.max_age);
            self.pending.push(b'[');
        } else {
            self.pending.push(b',');
        }
        self.pending.extend_from_slice(entry);
    }

    fn complete(&mut self) {
        self.deadline = None;
        if self.pending.is_empty() {
            return;
        }
        self.pending.push(b']');

        match self.compress() {
            Ok(glob) => (self.completor)(glob),
            // The glob is dropped but the worker keeps running.
            Err(e) => tracing::error!(error = %e, "failed to complete glob"),
        }
        self.pending.clear();
    }

    /// Compress the pending buffer behind the version byte. The compressor
    /// is reused across globs and reset here to avoid reallocation.
    fn compress(&mut self) -> Result<Bytes, flate2::CompressError> {
        self.compressor.reset();

        let mut out = Vec::with_capacity(self.pending.len() / 2 + 64);
        out.push(GLOB_VERSION);

        let mut consumed = 0;
        loop {
            let before = self.compressor.total_in();
            let status = self.compressor.compress_vec(
                &self.pending[consumed..],
                &mut out,
                FlushCompress::Finish,
            )?;
            consumed += (self.compressor.total_in() - before) as usize;
            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => out.reserve(self.pending.len() / 2 + 64),
            }
        }

        Ok(Bytes::from(out))
    }
}

async fn age_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
