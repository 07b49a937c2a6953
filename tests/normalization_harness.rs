#![allow(unused)]
//! Normalization harness.
//!
//! # What this covers
//!
//! - Remote entries: severity names, local timestamps, payload hoisting with
//!   exactly one payload key, `receiveTimestamp` removal.
//! - Lines from files and stdin: JSON objects are kept and completed, other
//!   lines are wrapped as text.
//! - Property: normalization never fails, whatever the input.
//!
//! # Running
//!
//! ```sh
//! cargo test --test normalization_harness
//! ```

mod common;
use common::*;

use chrono::{DateTime, Local, TimeZone, Utc};
use logtap_core::types::local_rfc3339;
use logtap_core::{normalize_entry, normalize_line, RawEntry};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use serde_json::{json, Value};

fn normalize(value: Value) -> logtap_core::Record {
    normalize_entry(&RawEntry::from_value(value)).record
}

// ---------------------------------------------------------------------------
// Remote entries
// ---------------------------------------------------------------------------

#[test]
fn text_entry_becomes_canonical_record() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap();
    let record = normalize(text_entry(ts, "WARNING", "disk at 91%"));
    assert_remote_canonical(&record);

    let map = fields(&record);
    assert_eq!(map["severity"], json!("WARNING"));
    assert_eq!(map["textPayload"], json!("disk at 91%"));
    assert_eq!(map["timestamp"], json!(local_rfc3339(ts)));
    assert_eq!(map["logName"], json!("projects/acme/logs/app"));
}

#[test]
fn structured_entry_hoists_json_payload() {
    let ts = Utc::now();
    let record = normalize(json_entry(ts, "ERROR", json!({"message": "boom", "attempt": 3})));
    assert_remote_canonical(&record);
    assert_eq!(fields(&record)["jsonPayload"], json!({"message": "boom", "attempt": 3}));
}

#[rstest]
#[case(json!(0), "DEFAULT")]
#[case(json!(100), "DEBUG")]
#[case(json!(200), "INFO")]
#[case(json!(300), "NOTICE")]
#[case(json!(400), "WARNING")]
#[case(json!(500), "ERROR")]
#[case(json!(600), "CRITICAL")]
#[case(json!(700), "ALERT")]
#[case(json!(800), "EMERGENCY")]
#[case(json!("error"), "ERROR")]
#[case(json!("bogus"), "DEFAULT")]
fn severity_is_rendered_by_name(#[case] severity: Value, #[case] expected: &str) {
    let record = normalize(json!({"severity": severity, "textPayload": "x"}));
    assert_eq!(fields(&record)["severity"], json!(expected));
}

#[test]
fn entry_without_timestamp_falls_back_to_receive_time() {
    let received = Utc.with_ymd_and_hms(2024, 3, 1, 8, 15, 0).unwrap();
    let out = normalize_entry(&RawEntry::from_value(json!({
        "receiveTimestamp": rfc3339(received),
        "textPayload": "late"
    })));
    assert_eq!(fields(&out.record)["timestamp"], json!(local_rfc3339(received)));
    assert!(out.entry_time.is_some());
}

#[test]
fn entry_without_any_time_is_stamped_at_ingest() {
    let before = Utc::now();
    let out = normalize_entry(&RawEntry::from_value(json!({"textPayload": "no clock"})));
    assert_remote_canonical(&out.record);
    assert_eq!(out.entry_time, None);

    let stamped = fields(&out.record)["timestamp"].as_str().unwrap().to_string();
    let stamped = DateTime::parse_from_rfc3339(&stamped).unwrap();
    assert!(stamped.with_timezone(&Utc) >= before - chrono::Duration::seconds(1));
}

#[test]
fn proto_payload_counts_as_structured() {
    let record = normalize(json!({
        "severity": "NOTICE",
        "timestamp": "2024-03-01T08:15:00Z",
        "protoPayload": {"@type": "type.googleapis.com/google.cloud.audit.AuditLog", "methodName": "SetIamPolicy"}
    }));
    assert_remote_canonical(&record);
    assert_eq!(fields(&record)["jsonPayload"]["methodName"], json!("SetIamPolicy"));
    assert!(!fields(&record).contains_key("protoPayload"));
}

#[test]
fn entry_without_payload_gets_empty_text() {
    let record = normalize(json!({"severity": "INFO", "timestamp": "2024-03-01T08:15:00Z"}));
    assert_remote_canonical(&record);
    assert_eq!(text_of(&record), "");
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

#[test]
fn json_lines_keep_their_fields() {
    let now = Utc::now();
    for line in CORPUS_JSON {
        let record = normalize_line(line, now);
        assert_canonical(&record);
        let original: Value = serde_json::from_str(line).unwrap();
        let map = fields(&record);
        for (key, value) in original.as_object().unwrap() {
            assert_eq!(&map[key], value, "field {key} changed in {line}");
        }
    }
}

#[rstest]
#[case(r#"{"level":"warn","m":1}"#, "WARNING")]
#[case(r#"{"lvl":"fatal"}"#, "CRITICAL")]
#[case(r#"{"log.level":"debug"}"#, "DEBUG")]
#[case(r#"{"m":1}"#, "DEFAULT")]
#[case(r#"{"severity":"custom","level":"error"}"#, "custom")]
fn json_line_severity_is_derived_when_missing(#[case] line: &str, #[case] expected: &str) {
    let record = normalize_line(line, Utc::now());
    assert_eq!(fields(&record)["severity"], json!(expected));
}

#[test]
fn existing_line_timestamp_is_not_overwritten() {
    let record = normalize_line(CORPUS_JSON[0], Utc::now());
    assert_eq!(fields(&record)["timestamp"], json!("2024-01-15T10:00:01Z"));
}

#[test]
fn text_lines_are_wrapped_verbatim() {
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    for line in CORPUS_TEXT {
        let record = normalize_line(&format!("{line}\r\n"), now);
        assert_canonical(&record);
        assert_eq!(text_of(&record), *line);
        assert_eq!(fields(&record)["severity"], json!("DEFAULT"));
        assert_eq!(fields(&record)["timestamp"], json!(local_rfc3339(now)));
    }
}

proptest! {
    #[test]
    fn any_line_normalizes_to_canonical_record(line in ".{0,200}") {
        let record = normalize_line(&line, Utc::now());
        assert_canonical(&record);
    }

    #[test]
    fn any_entry_shape_normalizes(
        severity in prop_oneof![Just(json!(null)), any::<i64>().prop_map(Value::from), "[a-zA-Z]{0,10}".prop_map(Value::from)],
        timestamp in prop_oneof![Just(json!(null)), "[0-9TZ:.-]{0,30}".prop_map(Value::from)],
        text in ".{0,50}",
        structured in any::<bool>(),
    ) {
        let mut entry = json!({"severity": severity, "timestamp": timestamp});
        if structured {
            entry["jsonPayload"] = json!({"text": text});
        } else {
            entry["textPayload"] = json!(text);
        }
        let record = normalize(entry);
        assert_remote_canonical(&record);
    }
}
