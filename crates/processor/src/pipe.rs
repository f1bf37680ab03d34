//! Result pipes - where raw records come from
//!
//! A [`ResultPipe`] yields raw bytes (or a read error) from somewhere: the
//! record stream in production, standard input for replay and testing. The
//! stream-backed pipe lives with the stream consumer; this module carries
//! the interface and the stdin implementation.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The next record (or read error) from an input.
#[derive(Debug)]
pub struct StreamResult {
    pub data: Bytes,
    pub error: Option<String>,
}

/// Source of raw records.
#[async_trait]
pub trait ResultPipe: Send {
    /// The next result; `None` at end of stream.
    async fn next(&mut self) -> Option<StreamResult>;

    /// Release any resources associated with the pipe.
    fn close(&mut self) {}
}

/// Reads one plaintext record per line from standard input.
pub struct StdinPipe {
    receiver: mpsc::Receiver<StreamResult>,
    reader: Option<JoinHandle<()>>,
}

impl StdinPipe {
    pub fn new() -> Self {
        let (tx, receiver) = mpsc::channel(16);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx
                            .send(StreamResult {
                                data: Bytes::from(line),
                                error: None,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx
                            .send(StreamResult {
                                data: Bytes::new(),
                                error: Some(e.to_string()),
                            })
                            .await;
                        return;
                    }
                }
            }
        });

        Self {
            receiver,
            reader: Some(reader),
        }
    }
}

impl Default for StdinPipe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultPipe for StdinPipe {
    async fn next(&mut self) -> Option<StreamResult> {
        self.receiver.recv().await
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
