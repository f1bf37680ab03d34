//! Tests for the JSON line parser

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::Utc;

use crate::decode::{JsonLineParser, Parser};
use crate::{EdgeType, FailureKind, ProtocolError, RawRecord};

fn envelope(data: &str) -> RawRecord {
    let line = format!(
        r#"{{"receivedAt": "2013-10-17T18:05:55.338Z", "clientIp": "10.1.40.26", "data": "{}", "uuid": "uuid1", "recordversion": 3, "edgeType": "internal"}}"#,
        BASE64.encode(data)
    );
    RawRecord::new(Bytes::from(line), Utc::now())
}

#[test]
fn test_parse_single_event() {
    let raw = envelope(r#"{"event":"login","properties":{"distinct_id":"abc","time":1380585602}}"#);
    let events = JsonLineParser::new().parse(&raw).unwrap();

    assert_eq!(events.len(), 1);
    let e = &events[0];
    assert_eq!(e.event, "login");
    assert_eq!(e.uuid, "uuid1");
    assert_eq!(e.client_ip, "10.1.40.26");
    assert_eq!(e.edge_type, EdgeType::Internal);
    assert_eq!(e.event_time, 1382033155);
    assert_eq!(e.failure, FailureKind::None);
    assert_eq!(
        e.properties.as_ref(),
        br#"{"distinct_id":"abc","time":1380585602}"#
    );
}

#[test]
fn test_parse_multi_event_suffixes_uuids() {
    let raw = envelope(
        r#"[{"event":"login","properties":{}},{"event":"login","properties":{}},{"event":"logout","properties":{}}]"#,
    );
    let events = JsonLineParser::new().parse(&raw).unwrap();

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].uuid, "uuid1-0");
    assert_eq!(events[1].uuid, "uuid1-1");
    assert_eq!(events[2].uuid, "uuid1-2");
    assert_eq!(events[2].event, "logout");
}

#[test]
fn test_parse_missing_properties_defaults_to_empty_object() {
    let raw = envelope(r#"{"event":"login"}"#);
    let events = JsonLineParser::new().parse(&raw).unwrap();

    assert_eq!(events[0].properties.as_ref(), b"{}");
}

#[test]
fn test_parse_bad_envelope() {
    let raw = RawRecord::new(Bytes::from_static(b"this is not json"), Utc::now());
    let err = JsonLineParser::new().parse(&raw).unwrap_err();

    assert!(matches!(err, ProtocolError::InvalidEnvelope(_)));
    assert_eq!(err.uuid(), "");
}

#[test]
fn test_parse_bad_payload_keeps_uuid() {
    let line = format!(
        r#"{{"receivedAt": "2013-10-17T18:05:55.338Z", "data": "{}", "uuid": "uuid1"}}"#,
        BASE64.encode("not json either")
    );
    let raw = RawRecord::new(Bytes::from(line), Utc::now());
    let err = JsonLineParser::new().parse(&raw).unwrap_err();

    assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
    assert_eq!(err.uuid(), "uuid1");
}

#[test]
fn test_parse_bad_timestamp_keeps_uuid() {
    let line = format!(
        r#"{{"receivedAt": "yesterday", "data": "{}", "uuid": "uuid1"}}"#,
        BASE64.encode(r#"{"event":"login"}"#)
    );
    let raw = RawRecord::new(Bytes::from(line), Utc::now());
    let err = JsonLineParser::new().parse(&raw).unwrap_err();

    assert!(matches!(err, ProtocolError::InvalidTimestamp { .. }));
    assert_eq!(err.uuid(), "uuid1");
}

#[test]
fn test_parse_unknown_edge_type() {
    let line = format!(
        r#"{{"receivedAt": "2013-10-17T18:05:55.338Z", "data": "{}", "uuid": "u", "edgeType": "sideways"}}"#,
        BASE64.encode(r#"{"event":"login","properties":{}}"#)
    );
    let raw = RawRecord::new(Bytes::from(line), Utc::now());
    let events = JsonLineParser::new().parse(&raw).unwrap();

    assert_eq!(events[0].edge_type, EdgeType::Unknown);
}
