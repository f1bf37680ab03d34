//! Hopper Transform - Schema-driven event transformation
//!
//! Turns parsed events into sink-ready write requests by formatting each
//! inbound property into a typed output column under the event's schema.
//!
//! # Design
//!
//! - **Formatters as values**: each column formatter is a boxed closure
//!   `(&[Option<&Value>]) -> (String, Outcome)` built from an identifier
//!   string at schema-load time. Time, geoip and mapping formatters are
//!   closures produced by generator functions that bind their parameters
//!   (format string, geoip resolver, cache handles) when the table is built.
//! - **Errors never abort an event**: a failing column records an outcome,
//!   leaves an empty cell, and processing continues with the next column.
//! - **Read-only schema access**: the transformer reads column specs through
//!   the [`SchemaLoader`] trait; dynamic reloading lives elsewhere.

mod cache;
mod error;
mod formatters;
mod geoip;
mod loaders;
mod lookup;
mod mapping;
mod transformer;

pub use cache::{CacheError, MemoryCache, StringCache};
pub use error::{MetadataError, Outcome, TransformError};
pub use formatters::{
    ColumnFormatter, FormatterArgs, TypedColumn, build_column, single_value_formatter,
};
pub use geoip::{GeoLookup, NoopGeo};
pub use loaders::{EventMetadataLoader, SchemaLoader, StaticLoader, StaticMetadataLoader};
pub use lookup::{FetchError, ValueFetcher};
pub use mapping::{MappingConfig, login_to_id_formatter, mapping_formatter};
pub use transformer::{SchemaTransformer, Transformer};

#[cfg(test)]
mod mapping_test;
#[cfg(test)]
mod transformer_test;
