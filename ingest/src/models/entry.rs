//! Raw log entry model.
//!
//! Defines the `Entry` structure handed to the pipeline by upstream producers,
//! along with its ordinal `Severity`.

use super::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Entry severity.
///
/// Ordinal scale with four sub-levels per band. The explicit discriminants
/// follow the producer-side numbering (`Trace = 10`, `Debug = 20`, ...), so
/// `Severity::from_level` round-trips for every variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Severity {
    /// No severity was assigned.
    #[default]
    Default = 0,
    /// Trace.
    Trace = 10,
    /// Trace, sub-level 2.
    Trace2 = 11,
    /// Trace, sub-level 3.
    Trace3 = 12,
    /// Trace, sub-level 4.
    Trace4 = 13,
    /// Debug.
    Debug = 20,
    /// Debug, sub-level 2.
    Debug2 = 21,
    /// Debug, sub-level 3.
    Debug3 = 22,
    /// Debug, sub-level 4.
    Debug4 = 23,
    /// Info.
    Info = 30,
    /// Info, sub-level 2.
    Info2 = 31,
    /// Info, sub-level 3.
    Info3 = 32,
    /// Info, sub-level 4.
    Info4 = 33,
    /// Warn.
    Warn = 40,
    /// Warn, sub-level 2.
    Warn2 = 41,
    /// Warn, sub-level 3.
    Warn3 = 42,
    /// Warn, sub-level 4.
    Warn4 = 43,
    /// Error.
    Error = 50,
    /// Error, sub-level 2.
    Error2 = 51,
    /// Error, sub-level 3.
    Error3 = 52,
    /// Error, sub-level 4.
    Error4 = 53,
    /// Fatal.
    Fatal = 60,
    /// Fatal, sub-level 2.
    Fatal2 = 61,
    /// Fatal, sub-level 3.
    Fatal3 = 62,
    /// Fatal, sub-level 4.
    Fatal4 = 63,
}

const BANDS: [[Severity; 4]; 6] = [
    [
        Severity::Trace,
        Severity::Trace2,
        Severity::Trace3,
        Severity::Trace4,
    ],
    [
        Severity::Debug,
        Severity::Debug2,
        Severity::Debug3,
        Severity::Debug4,
    ],
    [Severity::Info, Severity::Info2, Severity::Info3, Severity::Info4],
    [Severity::Warn, Severity::Warn2, Severity::Warn3, Severity::Warn4],
    [
        Severity::Error,
        Severity::Error2,
        Severity::Error3,
        Severity::Error4,
    ],
    [
        Severity::Fatal,
        Severity::Fatal2,
        Severity::Fatal3,
        Severity::Fatal4,
    ],
];

impl Severity {
    /// Maps a numeric level onto the banded severity scale.
    ///
    /// Levels below 10 are `Default`. Each band of ten selects a severity
    /// family, the offset inside the band selects the sub-level (offsets of
    /// three or more saturate at sub-level 4), and everything from 60 up is
    /// `Fatal`.
    ///
    /// # Example
    ///
    /// ```
    /// use ingest::models::Severity;
    ///
    /// assert_eq!(Severity::from_level(10), Severity::Trace);
    /// assert_eq!(Severity::from_level(31), Severity::Info2);
    /// assert_eq!(Severity::from_level(5), Severity::Default);
    /// assert_eq!(Severity::from_level(1_000), Severity::Fatal4);
    /// ```
    #[must_use]
    pub fn from_level(level: i64) -> Self {
        if level < 10 {
            return Self::Default;
        }
        let band = usize::try_from((level / 10 - 1).min(5)).unwrap_or(5);
        let offset = if level >= 70 {
            3
        } else {
            usize::try_from((level % 10).min(3)).unwrap_or(3)
        };
        BANDS[band][offset]
    }

    /// Returns the severity number in the 0-24 record scale.
    #[must_use]
    pub fn number(self) -> i32 {
        let level = self as u8;
        if level == 0 {
            return 0;
        }
        i32::from((level / 10 - 1) * 4 + level % 10 + 1)
    }

    /// Returns the display text used on converted records.
    #[must_use]
    pub fn text(self) -> &'static str {
        match self {
            Self::Default => "Undefined",
            Self::Trace => "Trace",
            Self::Trace2 => "Trace2",
            Self::Trace3 => "Trace3",
            Self::Trace4 => "Trace4",
            Self::Debug => "Debug",
            Self::Debug2 => "Debug2",
            Self::Debug3 => "Debug3",
            Self::Debug4 => "Debug4",
            Self::Info => "Info",
            Self::Info2 => "Info2",
            Self::Info3 => "Info3",
            Self::Info4 => "Info4",
            Self::Warn => "Warn",
            Self::Warn2 => "Warn2",
            Self::Warn3 => "Warn3",
            Self::Warn4 => "Warn4",
            Self::Error => "Error",
            Self::Error2 => "Error2",
            Self::Error3 => "Error3",
            Self::Error4 => "Error4",
            Self::Fatal => "Fatal",
            Self::Fatal2 => "Fatal2",
            Self::Fatal3 => "Fatal3",
            Self::Fatal4 => "Fatal4",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// A raw log entry as produced upstream.
///
/// Entries are moved through the pipeline, never shared: the producer hands
/// one to the emitter, which hands it to exactly one converter worker.
///
/// # Example
///
/// ```
/// use ingest::models::{Entry, Severity};
///
/// let entry = Entry::new("connection accepted")
///     .with_severity(Severity::Info)
///     .with_attribute("peer", "10.0.0.7")
///     .with_resource("host.name", "web-1");
///
/// assert_eq!(entry.resource.get("host.name").map(String::as_str), Some("web-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// Time the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Severity of the event.
    pub severity: Severity,

    /// Event payload.
    pub body: Value,

    /// Event attributes.
    pub attributes: HashMap<String, Value>,

    /// Attributes of the entity that produced the event (host, container, ...).
    pub resource: HashMap<String, String>,

    /// Trace id, expected to be 16 bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Vec<u8>>,

    /// Span id, expected to be 8 bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<Vec<u8>>,

    /// W3C trace flags; only the first byte is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_flags: Option<Vec<u8>>,
}

impl Default for Entry {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl Entry {
    /// Creates a new entry with the current timestamp and the given body.
    #[must_use]
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity: Severity::Default,
            body: body.into(),
            attributes: HashMap::new(),
            resource: HashMap::new(),
            trace_id: None,
            span_id: None,
            trace_flags: None,
        }
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Sets the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Adds a resource attribute.
    #[must_use]
    pub fn with_resource(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource.insert(key.into(), value.into());
        self
    }

    /// Sets the trace id.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<Vec<u8>>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Sets the span id.
    #[must_use]
    pub fn with_span_id(mut self, span_id: impl Into<Vec<u8>>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    /// Sets the trace flags.
    #[must_use]
    pub fn with_trace_flags(mut self, flags: impl Into<Vec<u8>>) -> Self {
        self.trace_flags = Some(flags.into());
        self
    }
}
