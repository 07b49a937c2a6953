//! Normalizer: turns backend entries and plain lines into canonical [`Record`]s.
//!
//! Remote entries are first decoded into a [`RawEntry`], a small tagged shape
//! (`severity`, `timestamp`, [`Payload`], remaining metadata), and then
//! rendered as one JSON object:
//!
//! - `severity` becomes its upper-case name,
//! - `timestamp` becomes local-time RFC3339,
//! - a structured payload is hoisted to `jsonPayload`, free text to `textPayload`
//!   (exactly one of the two is present),
//! - `receiveTimestamp` is dropped.
//!
//! Both steps are total: missing or malformed fields degrade to defaults and
//! never reject the entry.

use crate::types::{local_rfc3339, to_local, Record, Severity};
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Map, Value};

const SEVERITY: &str = "severity";
const TIMESTAMP: &str = "timestamp";
const RECEIVE_TIMESTAMP: &str = "receiveTimestamp";
const JSON_PAYLOAD: &str = "jsonPayload";
const TEXT_PAYLOAD: &str = "textPayload";
const PROTO_PAYLOAD: &str = "protoPayload";

/// Keys consulted, in order, for the level of a JSON line without `severity`.
const LEVEL_KEYS: &[&str] = &["level", "lvl", "log.level"];

/// The body of a log entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Structured(Map<String, Value>),
    Text(String),
}

/// A backend entry decoded into the fields the normalizer cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub severity: Severity,
    /// Event time; falls back to the receive time when the entry has none.
    pub timestamp: Option<DateTime<Utc>>,
    pub payload: Payload,
    /// Every other top-level field (`logName`, `resource`, `labels`, ...).
    pub metadata: Map<String, Value>,
}

impl RawEntry {
    /// Decode a Cloud Logging `LogEntry` JSON value. Never fails.
    pub fn from_value(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(map) => map,
            Value::String(text) => return Self::text(text),
            other => return Self::text(other.to_string()),
        };

        let severity = fields
            .remove(SEVERITY)
            .map(|v| Severity::from_json(&v))
            .unwrap_or_default();
        let received = fields.remove(RECEIVE_TIMESTAMP).and_then(|v| parse_time(&v));
        let timestamp = fields
            .remove(TIMESTAMP)
            .and_then(|v| parse_time(&v))
            .or(received);

        let json = fields.remove(JSON_PAYLOAD);
        let proto = fields.remove(PROTO_PAYLOAD);
        let text = fields.remove(TEXT_PAYLOAD);
        let payload = match (json.or(proto), text) {
            (Some(Value::Object(map)), _) => Payload::Structured(map),
            (Some(other), _) if !other.is_null() => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Payload::Structured(map)
            }
            (_, Some(Value::String(text))) => Payload::Text(text),
            (_, Some(other)) if !other.is_null() => Payload::Text(other.to_string()),
            _ => Payload::Text(String::new()),
        };

        Self {
            severity,
            timestamp,
            payload,
            metadata: fields,
        }
    }

    fn text(text: String) -> Self {
        Self {
            severity: Severity::Default,
            timestamp: None,
            payload: Payload::Text(text),
            metadata: Map::new(),
        }
    }
}

/// A normalised remote entry and the event time it carried, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub record: Record,
    /// The entry's own time in local offset; `None` when the entry had none
    /// and the record was stamped with the ingest time instead.
    pub entry_time: Option<DateTime<FixedOffset>>,
}

/// Render a [`RawEntry`] as a canonical record.
pub fn normalize_entry(entry: &RawEntry) -> Normalized {
    let mut out = entry.metadata.clone();
    out.insert(SEVERITY.to_string(), Value::from(entry.severity.name()));
    let ts = entry.timestamp.unwrap_or_else(Utc::now);
    out.insert(TIMESTAMP.to_string(), Value::from(local_rfc3339(ts)));
    match &entry.payload {
        Payload::Structured(map) => {
            out.insert(JSON_PAYLOAD.to_string(), Value::Object(map.clone()));
        }
        Payload::Text(text) => {
            out.insert(TEXT_PAYLOAD.to_string(), Value::from(text.as_str()));
        }
    }

    Normalized {
        record: Record::from_value(&Value::Object(out)),
        entry_time: entry.timestamp.map(to_local),
    }
}

/// Turn one line read from a file or stdin into a record.
///
/// JSON object lines keep their content and only gain `severity` and
/// `timestamp` when those keys are missing. Anything else is wrapped as a
/// `textPayload` record stamped with `ingested_at`.
pub fn normalize_line(line: &str, ingested_at: DateTime<Utc>) -> Record {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(line) {
        if !map.contains_key(SEVERITY) {
            let severity = LEVEL_KEYS
                .iter()
                .find_map(|key| map.get(*key))
                .map(Severity::from_json)
                .unwrap_or_default();
            map.insert(SEVERITY.to_string(), Value::from(severity.name()));
        }
        if !map.contains_key(TIMESTAMP) {
            map.insert(TIMESTAMP.to_string(), Value::from(local_rfc3339(ingested_at)));
        }
        return Record::from_value(&Value::Object(map));
    }

    let mut map = Map::new();
    map.insert(SEVERITY.to_string(), Value::from(Severity::Default.name()));
    map.insert(TIMESTAMP.to_string(), Value::from(local_rfc3339(ingested_at)));
    map.insert(TEXT_PAYLOAD.to_string(), Value::from(line));
    Record::from_value(&Value::Object(map))
}

/// Accepts RFC3339 strings and protobuf-style `{seconds, nanos}` objects.
fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Object(map) => {
            let seconds = map.get("seconds").and_then(number_or_string)?;
            let nanos = map.get("nanos").and_then(number_or_string).unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

fn number_or_string(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
