//! Log corpora and entry builders used across harnesses.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

/// JSON lines as an application would write them to a file.
pub const CORPUS_JSON: &[&str] = &[
    r#"{"timestamp":"2024-01-15T10:00:01Z","severity":"ERROR","msg":"Connection refused","host":"db.internal","port":5432}"#,
    r#"{"level":"warn","message":"Slow query","duration_ms":4200}"#,
    r#"{"log.level":"debug","message":"Cache miss","key":"user:42"}"#,
    r#"{"lvl":"fatal","msg":"Out of memory","rss_mb":16384}"#,
];

/// Lines that are not JSON objects and get wrapped as text payloads.
pub const CORPUS_TEXT: &[&str] = &[
    "2024-01-15 10:00:00 INFO  Starting application version 2.4.1",
    "Jan 15 10:00:02 myhost sshd[12345]: Failed password for invalid user admin",
    "GET /api/v1/users 200 47ms",
    "[1, 2, 3]",
    "",
];

pub fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// A Cloud Logging entry with a text payload.
pub fn text_entry(ts: DateTime<Utc>, severity: &str, text: &str) -> Value {
    json!({
        "logName": "projects/acme/logs/app",
        "insertId": format!("{:x}", ts.timestamp_nanos_opt().unwrap_or_default()),
        "resource": {"type": "global", "labels": {"project_id": "acme"}},
        "severity": severity,
        "timestamp": rfc3339(ts),
        "receiveTimestamp": rfc3339(ts + Duration::milliseconds(250)),
        "textPayload": text,
    })
}

/// A Cloud Logging entry with a structured payload.
pub fn json_entry(ts: DateTime<Utc>, severity: &str, payload: Value) -> Value {
    json!({
        "logName": "projects/acme/logs/app",
        "resource": {"type": "k8s_container"},
        "severity": severity,
        "timestamp": rfc3339(ts),
        "receiveTimestamp": rfc3339(ts + Duration::milliseconds(250)),
        "jsonPayload": payload,
    })
}

/// `count` text entries spaced one second apart, oldest first.
pub fn entry_series(start: DateTime<Utc>, count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| text_entry(start + Duration::seconds(i as i64), "INFO", &format!("line {i}")))
        .collect()
}
