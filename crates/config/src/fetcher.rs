//! Config fetcher abstraction
//!
//! The production fetcher does an HTTP GET against the config service; that
//! transport lives outside this crate. Here: the trait, a file-backed
//! fetcher for local runs, and a fixed-bytes fetcher for tests.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{ConfigError, Result};

/// Produces the raw bytes of a config document.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Bytes>;
}

/// Reads the document from a local file on every fetch.
pub struct FileFetcher {
    path: PathBuf,
}

impl FileFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigFetcher for FileFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ConfigError::Fetch(format!("{}: {e}", self.path.display())))?;
        Ok(Bytes::from(bytes))
    }
}

/// Serves a fixed document. Used by tests and static deployments.
pub struct StaticFetcher {
    document: Bytes,
}

impl StaticFetcher {
    pub fn new(document: impl Into<Bytes>) -> Self {
        Self {
            document: document.into(),
        }
    }
}

#[async_trait]
impl ConfigFetcher for StaticFetcher {
    async fn fetch(&self) -> Result<Bytes> {
        Ok(self.document.clone())
    }
}
