//! Tests for the schema transformer

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use hopper_protocol::{
    ColumnSpec, EdgeType, EventMetadataConfig, FailureKind, NoopStats, ParsedEvent,
    RecordingStats, StatsLogger,
};

use crate::geoip::{GeoLookup, NoopGeo};
use crate::loaders::{SchemaLoader, StaticLoader, StaticMetadataLoader};
use crate::transformer::{SchemaTransformer, Transformer};

fn login_schema() -> HashMap<String, Vec<ColumnSpec>> {
    let mut schemas = HashMap::new();
    schemas.insert(
        "login".to_string(),
        vec![
            ColumnSpec::simple("sampling_factor", "float"),
            ColumnSpec::simple("distinct_id", "varchar"),
            ColumnSpec::simple("time", "f@timestamp@unix"),
            ColumnSpec::simple("client_time", "f@timestamp@unix"),
        ],
    );
    schemas
}

fn loader() -> Arc<dyn SchemaLoader> {
    let geo: Arc<dyn GeoLookup> = Arc::new(NoopGeo);
    let mut versions = HashMap::new();
    versions.insert("login".to_string(), 42);
    Arc::new(StaticLoader::new(login_schema(), versions, &geo, None).unwrap())
}

fn transformer_with_stats(stats: Arc<dyn StatsLogger>) -> SchemaTransformer {
    let mut metadata = EventMetadataConfig::default();
    metadata.metadata.insert("login".to_string(), HashMap::new());
    SchemaTransformer::new(
        loader(),
        Arc::new(StaticMetadataLoader::new(metadata)),
        stats,
    )
}

fn transformer() -> SchemaTransformer {
    transformer_with_stats(Arc::new(NoopStats))
}

fn event(name: &str, properties: &str) -> ParsedEvent {
    ParsedEvent {
        event: name.to_string(),
        properties: Bytes::copy_from_slice(properties.as_bytes()),
        uuid: "uuid1".to_string(),
        client_ip: "10.1.40.26".to_string(),
        user_agent: String::new(),
        event_time: 1382033155,
        edge_type: EdgeType::Internal,
        start: Utc::now(),
        failure: FailureKind::None,
    }
}

#[test]
fn test_happy_path_line() {
    let e = event(
        "login",
        r#"{"sampling_factor":0.15,"distinct_id":"FFFF8047-0398-40FF-FF89-5B3FFFFFF0E7","time":1380585602,"client_time":1381993555}"#,
    );
    let request = transformer().consume(&e);

    assert_eq!(request.category, "login");
    assert_eq!(request.version, 42);
    assert_eq!(request.failure, FailureKind::None);
    assert_eq!(
        request.line,
        "\"0.15\"\t\"FFFF8047-0398-40FF-FF89-5B3FFFFFF0E7\"\t\"2013-10-17 11:05:55\"\t\"2013-09-30 17:00:02\""
    );
    assert_eq!(request.record.get("sampling_factor").unwrap(), "0.15");
    assert_eq!(request.record.get("time").unwrap(), "2013-10-17 11:05:55");
    assert_eq!(request.uuid, "uuid1");
    assert_eq!(request.source, e.properties);
}

#[test]
fn test_empty_properties_skips_columns_but_injects_time() {
    let request = transformer().consume(&event("login", "{}"));

    assert_eq!(request.category, "login");
    assert_eq!(request.version, 42);
    assert_eq!(request.failure, FailureKind::SkippedColumn);
    assert_eq!(request.line, "\"\"\t\"\"\t\"2013-10-17 11:05:55\"\t\"\"");
    // Empty cells stay in the line but are omitted from the record.
    assert_eq!(request.record.len(), 1);
    assert_eq!(request.record.get("time").unwrap(), "2013-10-17 11:05:55");
}

#[test]
fn test_client_time_preserves_original_time() {
    let request = transformer().consume(&event("login", r#"{"time":1380585602}"#));

    // The client's time lands in client_time; the server's in time.
    assert_eq!(
        request.line,
        "\"\"\t\"\"\t\"2013-10-17 11:05:55\"\t\"2013-09-30 17:00:02\""
    );
}

#[test]
fn test_nontracking_event_dumps_json() {
    let request = transformer().consume(&event("foo", r#"{"a": 1}"#));

    assert_eq!(request.category, "foo");
    assert_eq!(request.version, 0);
    assert_eq!(request.failure, FailureKind::NonTrackingEvent);
    assert_eq!(request.line, r#"{"event":"foo","properties":{"a": 1}}"#);
}

#[test]
fn test_empty_event_name() {
    let request = transformer().consume(&event("", "{}"));

    assert_eq!(request.category, "Unknown");
    assert_eq!(request.failure, FailureKind::EmptyRequest);
    assert_eq!(request.line, "");
}

#[test]
fn test_undecodable_properties() {
    let request = transformer().consume(&event("login", "not json"));

    assert_eq!(request.category, "Unknown");
    assert_eq!(request.failure, FailureKind::EmptyRequest);
}

#[test]
fn test_parse_failure_short_circuits() {
    let mut e = event("login", "{}");
    e.failure = FailureKind::UnableToParseData;

    let request = transformer().consume(&e);
    assert_eq!(request.category, "login");
    assert_eq!(request.failure, FailureKind::UnableToParseData);
    assert_eq!(request.line, "");
}

#[test]
fn test_ip_injection_respects_client_override() {
    let request = transformer().consume(&event("login", r#"{"distinct_id":"abc"}"#));
    // No ip column in the schema; the injected value must not leak into the
    // record map.
    assert!(!request.record.contains_key("ip"));

    // With an ip column the injected client address surfaces.
    let geo: Arc<dyn GeoLookup> = Arc::new(NoopGeo);
    let mut schemas = login_schema();
    schemas
        .get_mut("login")
        .unwrap()
        .push(ColumnSpec::simple("ip", "varchar"));
    let loader = StaticLoader::new(schemas, HashMap::new(), &geo, None).unwrap();
    let t = SchemaTransformer::new(
        Arc::new(loader),
        Arc::new(StaticMetadataLoader::default()),
        Arc::new(NoopStats),
    );

    let request = t.consume(&event("login", r#"{"distinct_id":"abc"}"#));
    assert_eq!(request.record.get("ip").unwrap(), "10.1.40.26");

    let request = t.consume(&event("login", r#"{"ip":"1.2.3.4"}"#));
    assert_eq!(request.record.get("ip").unwrap(), "1.2.3.4");
}

#[test]
fn test_edge_type_counters() {
    let stats = Arc::new(RecordingStats::new());
    let t = transformer_with_stats(stats.clone());

    t.consume(&event("login", "{}"));
    assert_eq!(stats.counter("edge-type.login.internal"), 1);
    // No expected edge type configured, so no mismatch counter.
    assert_eq!(stats.counter("edge-type-mismatch.login.internal.external"), 0);
}

#[test]
fn test_edge_type_mismatch_counter() {
    let mut metadata = EventMetadataConfig::default();
    let mut rows = HashMap::new();
    rows.insert(
        "edge_type".to_string(),
        hopper_protocol::EventMetadataRow {
            metadata_value: "external".to_string(),
        },
    );
    metadata.metadata.insert("login".to_string(), rows);

    let stats = Arc::new(RecordingStats::new());
    let t = SchemaTransformer::new(
        loader(),
        Arc::new(StaticMetadataLoader::new(metadata)),
        stats.clone(),
    );

    t.consume(&event("login", "{}"));
    assert_eq!(stats.counter("edge-type-mismatch.login.internal.external"), 1);
}

#[test]
fn test_outcome_counters() {
    let stats = Arc::new(RecordingStats::new());
    let t = transformer_with_stats(stats.clone());

    t.consume(&event("login", r#"{"sampling_factor":0.15}"#));
    // sampling_factor and the injected time succeed; distinct_id and
    // client_time are missing.
    assert_eq!(stats.counter("transformer.login.success"), 2);
    assert_eq!(stats.counter("transformer.login.skippedColumn"), 2);
    assert_eq!(stats.timing_count("transformer.login"), 1);
}

#[test]
fn test_quotes_are_escaped() {
    let request = transformer().consume(&event(
        "login",
        r#"{"distinct_id":"he said \"hi\""}"#,
    ));
    assert!(request.line.contains("\"he said \\\"hi\\\"\""));
}
