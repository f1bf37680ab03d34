//! Event schemas and per-event metadata
//!
//! An [`EventSchema`] is the ordered column layout the transformer formats an
//! event against. Column ordering determines TSV column order; reordering
//! columns is a new version.

use std::collections::HashMap;

use serde::Deserialize;

/// One column in an event schema.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnSpec {
    /// Property name on the inbound event
    #[serde(rename = "InboundName")]
    pub inbound_name: String,

    /// Column name on the outbound line
    #[serde(rename = "OutboundName")]
    pub outbound_name: String,

    /// Formatter identifier, e.g. `varchar` or `f@timestamp@unix`
    #[serde(rename = "Transformer")]
    pub formatter: String,

    /// Extra inbound properties handed to the formatter after the inbound
    /// value (used by mapping formatters)
    #[serde(rename = "SupportingColumns", default)]
    pub supporting_columns: Vec<String>,
}

impl ColumnSpec {
    /// A single-input column with matching inbound and outbound names.
    pub fn simple(name: impl Into<String>, formatter: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inbound_name: name.clone(),
            outbound_name: name,
            formatter: formatter.into(),
            supporting_columns: Vec::new(),
        }
    }
}

/// The ordered column layout for one event, plus its version.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSchema {
    #[serde(rename = "EventName")]
    pub event_name: String,

    #[serde(rename = "Columns")]
    pub columns: Vec<ColumnSpec>,

    /// Monotonic version; bumped whenever columns change or reorder
    #[serde(rename = "Version", default)]
    pub version: i32,
}

/// Kinds of per-event metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataType {
    Comment,
    EdgeType,
}

impl MetadataType {
    /// Parse the wire spelling used by the metadata document.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comment" => Some(Self::Comment),
            "edge_type" => Some(Self::EdgeType),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::EdgeType => "edge_type",
        }
    }
}

impl std::fmt::Display for MetadataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One metadata value for an (event, type) pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMetadataRow {
    #[serde(rename = "MetadataValue")]
    pub metadata_value: String,
}

/// A whole metadata snapshot, replaced atomically on refresh.
///
/// Wire shape: `{ <eventName>: { <metadataType>: { "MetadataValue": ... } } }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct EventMetadataConfig {
    pub metadata: HashMap<String, HashMap<String, EventMetadataRow>>,
}

impl EventMetadataConfig {
    /// Look up a value; `None` when the event or type is absent.
    pub fn value(&self, event: &str, metadata_type: MetadataType) -> Option<&str> {
        self.metadata
            .get(event)?
            .get(metadata_type.as_str())
            .map(|row| row.metadata_value.as_str())
    }
}
