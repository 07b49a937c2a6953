//! Core types for logtap-core.
//!
//! This module defines the values that travel across every reader: the
//! canonical [`Record`], the [`Severity`] scale, the [`SourceKind`] tag and the
//! [`Watermark`] a remote session resumes from.

use chrono::{DateTime, FixedOffset, Local, SecondsFormat, Utc};
use serde_json::Value;

/// A single normalised log entry as it travels over the record channel.
///
/// A `Record` is always one self-contained JSON object carrying at least a
/// `severity` and a `timestamp` key. It can only be built from a JSON value,
/// and it is never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record(String);

impl Record {
    /// Encode a JSON object as a record.
    pub fn from_value(value: &Value) -> Self {
        Self(value.to_string())
    }

    /// The JSON text of this record.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Decode the record back into a JSON value.
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.0)
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Log severity, following the Cloud Logging `LogSeverity` scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    #[default]
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    /// Canonical upper-case name, as rendered into records.
    pub fn name(self) -> &'static str {
        match self {
            Severity::Default => "DEFAULT",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Notice => "NOTICE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
            Severity::Alert => "ALERT",
            Severity::Emergency => "EMERGENCY",
        }
    }

    /// Parse a severity name. Common logger spellings (`warn`, `fatal`,
    /// `trace`, ...) are folded onto the nearest level.
    pub fn from_name(name: &str) -> Option<Self> {
        let severity = match name.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" => Severity::Default,
            "TRACE" | "DEBUG" => Severity::Debug,
            "INFO" | "INFORMATION" => Severity::Info,
            "NOTICE" => Severity::Notice,
            "WARN" | "WARNING" => Severity::Warning,
            "ERR" | "ERROR" => Severity::Error,
            "CRIT" | "CRITICAL" | "FATAL" => Severity::Critical,
            "ALERT" => Severity::Alert,
            "EMERG" | "EMERGENCY" | "PANIC" => Severity::Emergency,
            _ => return None,
        };
        Some(severity)
    }

    /// Map a numeric `LogSeverity` value; values between levels round down.
    pub fn from_number(value: i64) -> Self {
        match value {
            i64::MIN..=99 => Severity::Default,
            100..=199 => Severity::Debug,
            200..=299 => Severity::Info,
            300..=399 => Severity::Notice,
            400..=499 => Severity::Warning,
            500..=599 => Severity::Error,
            600..=699 => Severity::Critical,
            700..=799 => Severity::Alert,
            _ => Severity::Emergency,
        }
    }

    /// Best-effort read from a JSON value (string name or number).
    /// Anything unrecognised is [`Severity::Default`].
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Severity::from_name(s).unwrap_or_default(),
            Value::Number(n) => n.as_i64().map(Severity::from_number).unwrap_or_default(),
            _ => Severity::Default,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which kind of source a reader pulls from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    File,
    Stdin,
    RemoteApi,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Stdin => write!(f, "stdin"),
            SourceKind::RemoteApi => write!(f, "remote-api"),
        }
    }
}

/// Time of the most recent entry delivered by a remote session.
///
/// A watermark only ever moves forward: [`Watermark::advance`] ignores any
/// timestamp that is not strictly later than the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<FixedOffset>);

impl Watermark {
    pub fn new(at: DateTime<FixedOffset>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<FixedOffset> {
        self.0
    }

    /// Move the watermark to `to` if it is later. Returns whether it moved.
    pub fn advance(&mut self, to: DateTime<FixedOffset>) -> bool {
        if to > self.0 {
            self.0 = to;
            true
        } else {
            false
        }
    }

    /// RFC3339 rendering, with sub-second digits only when they are non-zero.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Convert a UTC instant to the local zone, keeping the offset explicit.
pub fn to_local(ts: DateTime<Utc>) -> DateTime<FixedOffset> {
    ts.with_timezone(&Local).fixed_offset()
}

/// Local-time RFC3339 rendering used for every record `timestamp`.
pub fn local_rfc3339(ts: DateTime<Utc>) -> String {
    to_local(ts).to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
