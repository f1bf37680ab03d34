//! Stdout sink - TSV lines to standard output
//!
//! Debug and stdin-mode sink; not meant for production throughput.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufWriter, Stdout};
use tokio::sync::Mutex;

use hopper_protocol::WriteRequest;

use crate::{Result, Sink};

/// Writes each successful request as `category<TAB>line` to stdout.
/// Failed requests are logged, not printed.
pub struct StdoutSink {
    out: Mutex<BufWriter<Stdout>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(BufWriter::new(tokio::io::stdout())),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn write(&self, request: Arc<WriteRequest>) {
        if !request.failure.is_writable() {
            tracing::debug!(
                category = %request.category,
                uuid = %request.uuid,
                failure = %request.failure,
                "skipping unwritable request"
            );
            return;
        }

        let mut out = self.out.lock().await;
        let line = format!("{}\t{}\n", request.category, request.line);
        if let Err(e) = out.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "failed to write to stdout");
        }
    }

    async fn rotate(&self) -> Result<bool> {
        self.out.lock().await.flush().await?;
        Ok(true)
    }

    async fn close(&self) -> Result<()> {
        self.out.lock().await.flush().await?;
        Ok(())
    }
}
