//! Conversion from raw entries to normalized records.
//!
//! Everything here is a pure function of its inputs: no shared state, no
//! errors. Values without a natural record representation are rendered as
//! strings rather than rejected.
//!
//! # Example
//!
//! ```
//! use ingest::convert::convert;
//! use ingest::models::{Entry, Severity, Value};
//!
//! let entry = Entry::new(Value::map([("severity", Value::from(50)), ("msg", Value::from("boom"))]))
//!     .with_severity(Severity::Info);
//!
//! let record = convert(entry, None);
//! assert_eq!(record.severity_text, "Error");
//! ```

pub mod timestamp;
pub mod transform;

use crate::models::{AnyValue, Entry, Record, ResourceGroup, Value};
use crate::plugin::PluginRegistry;
use std::collections::BTreeMap;

/// Converts an entry into a record and applies the normalization rules.
#[must_use]
pub fn convert(entry: Entry, plugins: Option<&PluginRegistry>) -> Record {
    let mut record = convert_into_record(entry);
    transform::transform(&mut record, plugins);
    record
}

/// Converts a single entry into a one-record group.
///
/// Stateless convenience for callers that do not need batching. The body is
/// carried over as-is; no normalization rules are applied.
#[must_use]
pub fn convert_to_group(entry: Entry) -> ResourceGroup {
    let resource = entry.resource.clone();
    let mut group = ResourceGroup::new(resource);
    group.records.push(convert_into_record(entry));
    group
}

/// Converts the entry fields without applying normalization.
fn convert_into_record(entry: Entry) -> Record {
    let mut record = Record {
        time_unix_nano: entry
            .timestamp
            .timestamp_nanos_opt()
            .and_then(|nanos| u64::try_from(nanos).ok())
            .unwrap_or_default(),
        severity_number: entry.severity.number(),
        severity_text: entry.severity.text().to_string(),
        body: to_any_value(entry.body),
        attributes: to_attribute_map(entry.attributes),
        trace_id: entry.trace_id.as_deref().map(fixed_id),
        span_id: entry.span_id.as_deref().map(fixed_id),
        flags: 0,
    };

    if let Some(&flags) = entry.trace_flags.as_deref().and_then(<[u8]>::first) {
        // The low byte holds the W3C trace flags; the upper 24 bits are reserved.
        record.flags = (record.flags & 0xFFFF_FF00) | u32::from(flags);
    }

    record
}

/// Copies an id into a fixed-size array, zero-padding or truncating.
fn fixed_id<const N: usize>(id: &[u8]) -> [u8; N] {
    let mut buffer = [0u8; N];
    let len = id.len().min(N);
    buffer[..len].copy_from_slice(&id[..len]);
    buffer
}

/// Converts an entry value to its record form.
fn to_any_value(value: Value) -> AnyValue {
    match value {
        Value::Null => AnyValue::Empty,
        Value::Bool(b) => AnyValue::Bool(b),
        Value::Int(i) => AnyValue::Int(i),
        Value::Double(d) => AnyValue::Double(d),
        Value::String(s) => AnyValue::String(s),
        Value::Bytes(b) => AnyValue::String(String::from_utf8_lossy(&b).into_owned()),
        Value::Array(arr) => AnyValue::Array(arr.into_iter().map(to_any_value).collect()),
        Value::Map(map) => AnyValue::Map(
            map.into_iter()
                .map(|(k, v)| (k, to_any_value(v)))
                .collect(),
        ),
    }
}

fn to_attribute_map<I>(attributes: I) -> BTreeMap<String, AnyValue>
where
    I: IntoIterator<Item = (String, Value)>,
{
    attributes
        .into_iter()
        .map(|(k, v)| (k, to_any_value(v)))
        .collect()
}
