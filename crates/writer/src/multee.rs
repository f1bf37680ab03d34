//! Multee - dynamic fan-out over a keyed set of sinks
//!
//! Forwards every write to all registered targets. Targets can be added,
//! dropped, and replaced at runtime; mutation takes the exclusive lock, so
//! writers always observe a consistent target set.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use hopper_protocol::WriteRequest;

use crate::{Result, Sink};

/// Fan-out writer over a keyed map of targets.
#[derive(Default)]
pub struct Multee {
    targets: RwLock<HashMap<String, Arc<dyn Sink>>>,
}

impl Multee {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new target. Key collisions are rejected, not overwritten.
    pub async fn add(&self, key: impl Into<String>, writer: Arc<dyn Sink>) {
        let key = key.into();
        let mut targets = self.targets.write().await;
        if targets.contains_key(&key) {
            tracing::error!(key = %key, "could not add writer due to key collision");
            return;
        }
        targets.insert(key, writer);
    }

    /// Drop an existing target. Its close runs in the background so a slow
    /// sink cannot stall reconfiguration.
    pub async fn drop_writer(&self, key: &str) {
        let mut targets = self.targets.write().await;
        let Some(writer) = targets.remove(key) else {
            tracing::error!(key = %key, "could not drop writer due to nonexistent key");
            return;
        };
        let key = key.to_string();
        let spawn_key = key.clone();
        tokio::spawn(async move {
            if let Err(e) = writer.close().await {
                tracing::error!(error = %e, writer_key = %spawn_key, "failed to close writer on drop");
            }
        });
        tracing::info!(key = %key, "dropped writer");
    }

    /// Atomically swap a target for a new one. The old writer's close runs
    /// in the background.
    pub async fn replace(&self, key: &str, new_writer: Arc<dyn Sink>) {
        let mut targets = self.targets.write().await;
        let Some(old) = targets.remove(key) else {
            tracing::error!(key = %key, "could not replace writer due to nonexistent key");
            return;
        };
        let closing_key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = old.close().await {
                tracing::error!(error = %e, writer_key = %closing_key, "failed to close writer on replace");
            }
        });
        targets.insert(key.to_string(), new_writer);
        tracing::info!(key = %key, "replaced writer");
    }

    /// Number of current targets.
    pub async fn len(&self) -> usize {
        self.targets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.targets.read().await.is_empty()
    }
}

#[async_trait]
impl Sink for Multee {
    /// Forward the request to every target present under the shared lock.
    async fn write(&self, request: Arc<WriteRequest>) {
        let targets = self.targets.read().await;
        for writer in targets.values() {
            writer.write(Arc::clone(&request)).await;
        }
    }

    /// Forward rotation to every target. Individual failures are logged and
    /// do not prevent siblings from rotating.
    async fn rotate(&self) -> Result<bool> {
        let targets = self.targets.read().await;
        let mut all_done = true;
        for (key, writer) in targets.iter() {
            match writer.rotate().await {
                Ok(done) => all_done = all_done && done,
                Err(e) => {
                    tracing::error!(error = %e, writer_key = %key, "failed to forward rotation request");
                    all_done = false;
                }
            }
        }
        Ok(all_done)
    }

    /// Close all targets concurrently and wait for every close to return.
    /// Never fails; individual errors are logged.
    async fn close(&self) -> Result<()> {
        let targets = self.targets.write().await;
        let mut closing = JoinSet::new();
        for (key, writer) in targets.iter() {
            let key = key.clone();
            let writer = Arc::clone(writer);
            closing.spawn(async move {
                if let Err(e) = writer.close().await {
                    tracing::error!(error = %e, writer_key = %key, "failed to close writer");
                }
            });
        }
        while closing.join_next().await.is_some() {}
        Ok(())
    }
}

// Test module - only compiled during testing
#[cfg(test)]
#[path = "multee_test.rs"]
mod multee_test;
