//! Record-shape assertions and channel helpers for logtap harnesses.

use logtap_core::Record;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;

/// Default wait for anything asynchronous in the harnesses.
pub const WAIT: Duration = Duration::from_secs(5);

/// Parse a record into its JSON object, panicking with the raw text otherwise.
pub fn fields(record: &Record) -> Map<String, Value> {
    match record.to_value() {
        Ok(Value::Object(map)) => map,
        other => panic!("record is not a JSON object: {:?} ({})", other, record.as_str()),
    }
}

/// Assert the invariants every emitted record must satisfy.
pub fn assert_canonical(record: &Record) {
    let map = fields(record);
    assert!(
        map.get("severity").and_then(Value::as_str).is_some(),
        "record has no string severity: {}",
        record.as_str()
    );
    let ts = map
        .get("timestamp")
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("record has no timestamp: {}", record.as_str()));
    assert!(
        chrono::DateTime::parse_from_rfc3339(ts).is_ok(),
        "timestamp {ts:?} is not RFC3339"
    );
    assert!(
        !map.contains_key("receiveTimestamp"),
        "receiveTimestamp leaked: {}",
        record.as_str()
    );
}

/// Like [`assert_canonical`], plus exactly one payload key for remote records.
pub fn assert_remote_canonical(record: &Record) {
    assert_canonical(record);
    let map = fields(record);
    let payloads = ["jsonPayload", "textPayload"]
        .iter()
        .filter(|k| map.contains_key(**k))
        .count();
    assert_eq!(payloads, 1, "expected exactly one payload: {}", record.as_str());
}

/// The `textPayload` of a record, or the empty string.
pub fn text_of(record: &Record) -> String {
    fields(record)
        .get("textPayload")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Receive one record, failing the test after [`WAIT`].
pub async fn recv_record(rx: &mut mpsc::Receiver<Record>) -> Record {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a record")
        .expect("channel closed while waiting for a record")
}

/// Receive `n` records.
pub async fn recv_n(rx: &mut mpsc::Receiver<Record>, n: usize) -> Vec<Record> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(recv_record(rx).await);
    }
    out
}

/// Collect records until the channel closes.
pub async fn recv_to_end(rx: &mut mpsc::Receiver<Record>) -> Vec<Record> {
    let mut out = Vec::new();
    loop {
        match tokio::time::timeout(WAIT, rx.recv()).await {
            Ok(Some(record)) => out.push(record),
            Ok(None) => return out,
            Err(_) => panic!("channel did not close; got {} records so far", out.len()),
        }
    }
}

/// Assert nothing arrives within `quiet`.
pub async fn assert_quiet(rx: &mut mpsc::Receiver<Record>, quiet: Duration) {
    if let Ok(Some(record)) = tokio::time::timeout(quiet, rx.recv()).await {
        panic!("unexpected record: {}", record.as_str());
    }
}
