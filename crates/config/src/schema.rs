//! Dynamic schema loader
//!
//! Fetches the schema document (a JSON array of event schemas), binds every
//! column to its formatter, and serves the result as an atomic snapshot
//! behind the [`SchemaLoader`] trait.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use hopper_protocol::{EventSchema, StatsLogger};
use hopper_transform::{
    GeoLookup, MappingConfig, SchemaLoader, TransformError, TypedColumn,
};

use crate::fetcher::ConfigFetcher;
use crate::refresh::{refresh_loop, retry_pull, LoaderConfig};
use crate::Result;

struct Snapshot {
    columns: HashMap<String, Arc<Vec<TypedColumn>>>,
    versions: HashMap<String, i32>,
}

/// Periodically refreshed schema loader.
pub struct DynamicSchemaLoader {
    snapshot: Arc<ArcSwap<Snapshot>>,
    cancel: CancellationToken,
}

impl DynamicSchemaLoader {
    /// Fetch the initial snapshot (fatal after five failed attempts) and
    /// start the refresh task.
    pub async fn new(
        fetcher: Arc<dyn ConfigFetcher>,
        config: LoaderConfig,
        geo: Arc<dyn GeoLookup>,
        mapping: Option<MappingConfig>,
        stats: Arc<dyn StatsLogger>,
    ) -> Result<Self> {
        let pull = {
            let fetcher = Arc::clone(&fetcher);
            let geo = Arc::clone(&geo);
            let mapping = mapping.clone();
            move || {
                let fetcher = Arc::clone(&fetcher);
                let geo = Arc::clone(&geo);
                let mapping = mapping.clone();
                async move { pull_snapshot(&*fetcher, &geo, mapping.as_ref()).await }
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

    /// Events present in the current snapshot (diagnostics).
    pub fn event_count(&self) -> usize {
        self.snapshot.load().columns.len()
    }
}

impl Drop for DynamicSchemaLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl SchemaLoader for DynamicSchemaLoader {
    fn columns_for_event(&self, event: &str) -> std::result::Result<Arc<Vec<TypedColumn>>, TransformError> {
        self.snapshot
            .load()
            .columns
            .get(event)
            .cloned()
            .ok_or_else(|| TransformError::NotTracked(event.to_string()))
    }

    fn version_for_event(&self, event: &str) -> i32 {
        self.snapshot
            .load()
            .versions
            .get(event)
            .copied()
            .unwrap_or(0)
    }
}

async fn pull_snapshot(
    fetcher: &dyn ConfigFetcher,
    geo: &Arc<dyn GeoLookup>,
    mapping: Option<&MappingConfig>,
) -> Result<Snapshot> {
    let document = fetcher.fetch().await?;
    let schemas: Vec<EventSchema> = serde_json::from_slice(&document)?;

    let mut columns = HashMap::with_capacity(schemas.len());
    let mut versions = HashMap::with_capacity(schemas.len());
    for schema in schemas {
        let built: std::result::Result<Vec<_>, _> = schema
            .columns
            .iter()
            .map(|spec| hopper_transform::build_column(spec, geo, mapping))
            .collect();
        columns.insert(schema.event_name.clone(), Arc::new(built?));
        versions.insert(schema.event_name, schema.version);
    }

    Ok(Snapshot { columns, versions })
}
