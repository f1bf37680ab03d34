//! Schema and metadata access traits, with static implementations
//!
//! The transformer reads column specs and event metadata through these
//! traits. Static loaders serve fixed tables (tests, file-driven runs);
//! the dynamic, periodically refreshed loaders live in `hopper-config`.

use std::collections::HashMap;
use std::sync::Arc;

use hopper_protocol::{ColumnSpec, EventMetadataConfig, MetadataType};

use crate::error::{MetadataError, TransformError};
use crate::formatters::TypedColumn;
use crate::geoip::GeoLookup;
use crate::mapping::MappingConfig;

/// Read-only access to per-event column layouts.
pub trait SchemaLoader: Send + Sync {
    /// The bound columns for an event, in schema order.
    fn columns_for_event(&self, event: &str) -> Result<Arc<Vec<TypedColumn>>, TransformError>;

    /// The schema version for an event; 0 when the event is unknown.
    fn version_for_event(&self, event: &str) -> i32;
}

/// Read-only access to per-event metadata.
pub trait EventMetadataLoader: Send + Sync {
    /// The metadata value for (event, type).
    ///
    /// Unknown events get a typed `NotFound`; metadata type strings we do
    /// not track get a typed `InvalidMetadataType`. Callers treat both as
    /// "no metadata present".
    fn metadata_value(&self, event: &str, metadata_type: &str) -> Result<String, MetadataError>;
}

/// Schema loader over a fixed table of events.
pub struct StaticLoader {
    columns: HashMap<String, Arc<Vec<TypedColumn>>>,
    versions: HashMap<String, i32>,
}

impl StaticLoader {
    /// Build the table, binding every column spec to its formatter.
    ///
    /// Fails on the first column whose formatter identifier is unknown -
    /// a half-built schema would silently drop columns.
    pub fn new(
        schemas: HashMap<String, Vec<ColumnSpec>>,
        versions: HashMap<String, i32>,
        geo: &Arc<dyn GeoLookup>,
        mapping: Option<&MappingConfig>,
    ) -> Result<Self, TransformError> {
        let mut columns = HashMap::with_capacity(schemas.len());
        for (event, specs) in schemas {
            let built: Result<Vec<_>, _> = specs
                .iter()
                .map(|spec| crate::formatters::build_column(spec, geo, mapping))
                .collect();
            columns.insert(event, Arc::new(built?));
        }
        Ok(Self { columns, versions })
    }

    /// A loader with prebuilt columns (used by tests that construct
    /// formatters directly).
    pub fn from_columns(
        columns: HashMap<String, Vec<TypedColumn>>,
        versions: HashMap<String, i32>,
    ) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(k, v)| (k, Arc::new(v)))
                .collect(),
            versions,
        }
    }
}

impl SchemaLoader for StaticLoader {
    fn columns_for_event(&self, event: &str) -> Result<Arc<Vec<TypedColumn>>, TransformError> {
        self.columns
            .get(event)
            .cloned()
            .ok_or_else(|| TransformError::NotTracked(event.to_string()))
    }

    fn version_for_event(&self, event: &str) -> i32 {
        self.versions.get(event).copied().unwrap_or(0)
    }
}

/// Metadata loader over a fixed snapshot.
#[derive(Default)]
pub struct StaticMetadataLoader {
    config: EventMetadataConfig,
}

impl StaticMetadataLoader {
    pub fn new(config: EventMetadataConfig) -> Self {
        Self { config }
    }
}

impl EventMetadataLoader for StaticMetadataLoader {
    fn metadata_value(&self, event: &str, metadata_type: &str) -> Result<String, MetadataError> {
        let parsed = MetadataType::parse(metadata_type)
            .ok_or_else(|| MetadataError::InvalidMetadataType(metadata_type.to_string()))?;

        self.config
            .value(event, parsed)
            .map(str::to_string)
            .ok_or_else(|| MetadataError::NotFound(event.to_string()))
    }
}
