//! Dynamic event-metadata loader
//!
//! Fetches the metadata document
//! `{ <eventName>: { <metadataType>: { "MetadataValue": ... } } }` and
//! serves it as an atomic snapshot behind [`EventMetadataLoader`].

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use hopper_protocol::{EventMetadataConfig, MetadataType, StatsLogger};
use hopper_transform::{EventMetadataLoader, MetadataError};

use crate::fetcher::ConfigFetcher;
use crate::refresh::{refresh_loop, retry_pull, LoaderConfig};
use crate::Result;

/// Periodically refreshed metadata loader.
pub struct DynamicMetadataLoader {
    snapshot: Arc<ArcSwap<EventMetadataConfig>>,
    cancel: CancellationToken,
}

impl DynamicMetadataLoader {
    /// Fetch the initial snapshot (fatal after five failed attempts) and
    /// start the refresh task.
    pub async fn new(
        fetcher: Arc<dyn ConfigFetcher>,
        config: LoaderConfig,
        stats: Arc<dyn StatsLogger>,
    ) -> Result<Self> {
        let pull = {
            let fetcher = Arc::clone(&fetcher);
            move || {
                let fetcher = Arc::clone(&fetcher);
                async move { pull_snapshot(&*fetcher).await }
            }
        };

        let initial = retry_pull(config.retry_delay, &pull).await?;
        let snapshot = Arc::new(ArcSwap::from_pointee(initial));
        let cancel = CancellationToken::new();

        let published = Arc::clone(&snapshot);
        tokio::spawn(refresh_loop(
            config,
            stats,
            cancel.clone(),
            pull,
            move |next| {
                published.store(Arc::new(next));
            },
        ));

        Ok(Self { snapshot, cancel })
    }

    /// Stop the refresh task. Readers keep the last snapshot.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for DynamicMetadataLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl EventMetadataLoader for DynamicMetadataLoader {
    fn metadata_value(
        &self,
        event: &str,
        metadata_type: &str,
    ) -> std::result::Result<String, MetadataError> {
        let parsed = MetadataType::parse(metadata_type)
            .ok_or_else(|| MetadataError::InvalidMetadataType(metadata_type.to_string()))?;

        self.snapshot
            .load()
            .value(event, parsed)
            .map(str::to_string)
            .ok_or_else(|| MetadataError::NotFound(event.to_string()))
    }
}

async fn pull_snapshot(fetcher: &dyn ConfigFetcher) -> Result<EventMetadataConfig> {
    let document = fetcher.fetch().await?;
    Ok(serde_json::from_slice(&document)?)
}
