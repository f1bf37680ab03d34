//! Tests for the stream writer

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;

use hopper_batch::GLOB_VERSION;
use hopper_protocol::{FailureKind, NoopStats, WriteRequest};

use crate::filters::{in_set_filter, noop_filter, FilterRegistry};
use crate::stream::sender::{RecordStatus, RecordTransport};
use crate::stream::{StreamWriter, StreamWriterConfig};
use crate::{Sink, WriterError};

const TEST_CONFIG: &str = r#"
    {
        "StreamName": "processed-events-test",
        "StreamType": "firehose",
        "Compress": false,
        "FirehoseRedshiftStream": true,
        "Events": {
            "minute-watched": {
                "Fields": [
                    "country",
                    "device_id"
                ]
            },
            "remapped": {
                "Fields": [
                    "unremapped",
                    "remap"
                ],
                "FieldRenames": {
                    "remap": "remapped_name"
                }
            },
            "video-play": {
                "Fields": [
                    "country",
                    "device_id",
                    "game"
                ]
            },
            "all-fields": {
                "AllFields": true
            }
        },
        "BufferSize": 1024,
        "MaxAttemptsPerRecord": 1,
        "RetryDelay": "1s",
        "Globber": {
            "MaxSize": 990000,
            "MaxAge": "1s",
            "BufferLength": 1024
        },
        "Batcher": {
            "MaxSize": 990000,
            "MaxEntries": 500,
            "MaxAge": "1s",
            "BufferLength": 1024
        }
    }
"#;

fn test_config() -> StreamWriterConfig {
    serde_json::from_str(TEST_CONFIG).expect("test config should parse")
}

#[derive(Default)]
struct CapturingTransport {
    batches: Mutex<Vec<Vec<Bytes>>>,
}

impl CapturingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every record delivered, in order.
    fn records(&self) -> Vec<Bytes> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl RecordTransport for CapturingTransport {
    async fn put_records(
        &self,
        _stream: &str,
        records: &[Bytes],
    ) -> Result<Vec<RecordStatus>, WriterError> {
        self.batches.lock().push(records.to_vec());
        Ok(vec![RecordStatus::Ok; records.len()])
    }
}

fn writer(config: StreamWriterConfig) -> (StreamWriter, Arc<CapturingTransport>) {
    writer_with_filters(config, &FilterRegistry::new())
}

fn writer_with_filters(
    config: StreamWriterConfig,
    filters: &FilterRegistry,
) -> (StreamWriter, Arc<CapturingTransport>) {
    let transport = CapturingTransport::new();
    let writer = StreamWriter::new(
        config,
        filters,
        noop_filter(),
        transport.clone(),
        Arc::new(NoopStats),
    )
    .expect("writer should build");
    (writer, transport)
}

fn record(fields: &[(&str, &str)]) -> BTreeMap<String, String> {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn delivered(transport: &CapturingTransport) -> Vec<String> {
    transport
        .records()
        .iter()
        .map(|r| String::from_utf8(r.to_vec()).unwrap())
        .collect()
}

// ============================================================================
// Config validation
// ============================================================================

#[test]
fn test_config_parses_and_validates() {
    let config = test_config();
    assert!(config.validate(&FilterRegistry::new()).is_ok());
}

#[test]
fn test_redshift_stream_rejects_compress() {
    let mut config = test_config();
    config.compress = true;
    assert!(config.validate(&FilterRegistry::new()).is_err());
}

#[test]
fn test_redshift_stream_requires_firehose() {
    let mut config = test_config();
    config.stream_type = super::StreamType::Stream;
    assert!(config.validate(&FilterRegistry::new()).is_err());
}

#[test]
fn test_unknown_filter_rejected() {
    let mut config = test_config();
    config.events.get_mut("video-play").unwrap().filter = "NoSuchFilter".to_string();
    assert!(matches!(
        config.validate(&FilterRegistry::new()),
        Err(WriterError::UnknownFilter(_))
    ));
}

// ============================================================================
// Projection and routing
// ============================================================================

#[tokio::test]
async fn test_submit_uncompressed_projects_fields() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    let (writer, transport) = writer(config);

    writer
        .submit("minute-watched", &record(&[("country", "US"), ("something", "xx")]))
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"country":"US","device_id":""}"#.to_string()]
    );
}

#[tokio::test]
async fn test_submit_compressed_goes_through_globber() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    config.compress = true;
    let (writer, transport) = writer(config);

    writer
        .submit("minute-watched", &record(&[("country", "US"), ("something", "xx")]))
        .await;
    writer.close().await.unwrap();

    let records = transport.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0][0], GLOB_VERSION);

    let mut inflated = Vec::new();
    flate2::read::DeflateDecoder::new(&records[0][1..])
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(
        String::from_utf8(inflated).unwrap(),
        r#"[{"Name":"minute-watched","Fields":{"country":"US","device_id":""}}]"#
    );
}

#[tokio::test]
async fn test_submit_injects_event_name() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    config.event_name_target_field = "event".to_string();
    let (writer, transport) = writer(config);

    writer
        .submit("minute-watched", &record(&[("country", "US"), ("something", "xx")]))
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"country":"US","device_id":"","event":"minute-watched"}"#.to_string()]
    );
}

#[tokio::test]
async fn test_submit_excludes_empty_fields() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    config.exclude_empty_fields = true;
    let (writer, transport) = writer(config);

    writer
        .submit(
            "video-play",
            &record(&[("country", "US"), ("device_id", ""), ("something", "xx")]),
        )
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"country":"US"}"#.to_string()]
    );
}

#[tokio::test]
async fn test_submit_renames_fields() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    let (writer, transport) = writer(config);

    writer
        .submit("remapped", &record(&[("unremapped", "US"), ("remap", "xx")]))
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"remapped_name":"xx","unremapped":"US"}"#.to_string()]
    );
}

#[tokio::test]
async fn test_submit_all_fields_passes_everything() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    let (writer, transport) = writer(config);

    writer.submit("all-fields", &record(&[("somefield", "US")])).await;
    writer
        .submit("all-fields", &record(&[("someotherfield", "1")]))
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![
            r#"{"somefield":"US"}"#.to_string(),
            r#"{"someotherfield":"1"}"#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unconfigured_event_is_dropped() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    let (writer, transport) = writer(config);

    writer.submit("unheard-of", &record(&[("a", "b")])).await;
    writer.close().await.unwrap();

    assert!(transport.records().is_empty());
}

// ============================================================================
// Filters
// ============================================================================

#[tokio::test]
async fn test_event_filter_gates_records() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    config.events.get_mut("video-play").unwrap().filter = "USFilter".to_string();

    let mut filters = FilterRegistry::new();
    filters.register("USFilter", in_set_filter("country", vec!["US".to_string()]));

    let (writer, transport) = writer_with_filters(config, &filters);
    writer
        .submit("video-play", &record(&[("country", "CA"), ("game", "OK")]))
        .await;
    writer
        .submit("video-play", &record(&[("country", "US"), ("game", "OK")]))
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"country":"US","device_id":"","game":"OK"}"#.to_string()]
    );
}

#[tokio::test]
async fn test_default_filter_applies_without_event_filter() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;

    let transport = CapturingTransport::new();
    let writer = StreamWriter::new(
        config,
        &FilterRegistry::new(),
        in_set_filter("country", vec!["US".to_string()]),
        transport.clone(),
        Arc::new(NoopStats),
    )
    .unwrap();

    writer
        .submit("video-play", &record(&[("country", "CA"), ("game", "OK")]))
        .await;
    writer
        .submit("video-play", &record(&[("country", "US"), ("game", "OK")]))
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"country":"US","device_id":"","game":"OK"}"#.to_string()]
    );
}

#[tokio::test]
async fn test_skip_default_filter() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    config
        .events
        .get_mut("video-play")
        .unwrap()
        .skip_default_filter = true;

    let transport = CapturingTransport::new();
    let writer = StreamWriter::new(
        config,
        &FilterRegistry::new(),
        in_set_filter("country", vec!["US".to_string()]),
        transport.clone(),
        Arc::new(NoopStats),
    )
    .unwrap();

    writer
        .submit("video-play", &record(&[("country", "CA"), ("game", "OK")]))
        .await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"country":"CA","device_id":"","game":"OK"}"#.to_string()]
    );
}

// ============================================================================
// Sink integration
// ============================================================================

#[tokio::test]
async fn test_write_skips_failed_requests() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    let (writer, transport) = writer(config);

    let mut request = WriteRequest::failed(
        "minute-watched",
        0,
        "uuid1",
        Bytes::new(),
        FailureKind::NonTrackingEvent,
        Utc::now(),
    );
    request.record = record(&[("country", "US")]);
    writer.write(Arc::new(request)).await;
    writer.close().await.unwrap();

    assert!(transport.records().is_empty());
}

#[tokio::test]
async fn test_write_delivers_writable_requests() {
    let mut config = test_config();
    config.firehose_redshift_stream = false;
    let (writer, transport) = writer(config);

    let request = WriteRequest {
        category: "minute-watched".to_string(),
        version: 1,
        line: String::new(),
        record: record(&[("country", "US"), ("device_id", "abc")]),
        uuid: "uuid1".to_string(),
        source: Bytes::new(),
        failure: FailureKind::None,
        start: Utc::now(),
    };
    writer.write(Arc::new(request)).await;
    writer.close().await.unwrap();

    assert_eq!(
        delivered(&transport),
        vec![r#"{"country":"US","device_id":"abc"}"#.to_string()]
    );
}
