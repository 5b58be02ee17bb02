//! Converted log record model.
//!
//! A `Record` is the normalized form of an `Entry`; records sharing a
//! resource are collected into a `ResourceGroup`, the unit handed downstream.

use crate::resource::ResourceId;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, UNIX_EPOCH};

/// A record attribute or body value.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum AnyValue {
    /// No value.
    #[default]
    Empty,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Double(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    Array(Vec<AnyValue>),
    /// A string-keyed map of values.
    Map(BTreeMap<String, AnyValue>),
}

impl AnyValue {
    /// Returns the map if this value is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, AnyValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the mutable map if this value is one.
    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, AnyValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the string slice if this value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AnyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for AnyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for AnyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AnyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for AnyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

fn serialize_hex<S, const N: usize>(id: &Option<[u8; N]>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match id {
        Some(bytes) => s.serialize_str(&hex::encode(bytes)),
        None => s.serialize_none(),
    }
}

/// A converted and normalized log record.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Record {
    /// Event time in nanoseconds since the Unix epoch.
    pub time_unix_nano: u64,

    /// Severity number, 0 (undefined) through 24.
    pub severity_number: i32,

    /// Severity display text.
    pub severity_text: String,

    /// Record payload.
    pub body: AnyValue,

    /// Record attributes.
    pub attributes: BTreeMap<String, AnyValue>,

    /// Trace id.
    #[serde(serialize_with = "serialize_hex", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<[u8; 16]>,

    /// Span id.
    #[serde(serialize_with = "serialize_hex", skip_serializing_if = "Option::is_none")]
    pub span_id: Option<[u8; 8]>,

    /// Trace flags; the low 8 bits carry the W3C flags, the rest are reserved.
    pub flags: u32,
}

impl Record {
    /// Returns the record time as a `DateTime<Utc>`.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(UNIX_EPOCH + Duration::from_nanos(self.time_unix_nano))
    }
}

/// Records that share one resource, in arrival order.
///
/// Groups are built by a single converter worker and handed downstream whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceGroup {
    /// Hash of `resource`.
    pub resource_id: ResourceId,

    /// The resource every record in this group was produced by.
    pub resource: HashMap<String, String>,

    /// The converted records.
    pub records: Vec<Record>,
}

impl ResourceGroup {
    /// Creates an empty group for a resource.
    #[must_use]
    pub fn new(resource: HashMap<String, String>) -> Self {
        Self {
            resource_id: ResourceId::of(&resource),
            resource,
            records: Vec::new(),
        }
    }

    /// Number of records in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the group holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
