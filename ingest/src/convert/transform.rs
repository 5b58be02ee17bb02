//! Normalization rules applied to converted records.
//!
//! Producers tend to leave structured data inside map bodies as strings:
//! timestamps, severities, `ip:port` pairs, comma-separated address lists,
//! and numbers. These rules lift that data into typed record fields. A rule
//! that does not recognize what it finds leaves it untouched.

use super::timestamp::coerce_to_timestamp;
use crate::models::{AnyValue, Record, Severity};
use crate::plugin::PluginRegistry;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;

type Body = BTreeMap<String, AnyValue>;

/// Body keys checked for an event time, in priority order.
const TIMESTAMP_FIELDS: [&str; 3] = ["@timestamp", "timestamp", "time"];

const SEVERITY_FIELD: &str = "severity";
const PLUGIN_ID_ATTRIBUTE: &str = "plugin_id";
const CLIENT_FIELD: &str = "client";

const IP_KEY: &str = "ip";
const PORT_KEY: &str = "port";
const ADDRESS_KEY: &str = "address";

/// Body keys that may hold a comma-separated list encoded as a string.
const ARRAY_FIELDS: [&str; 5] = [
    "http_x_forwarded_for",
    "remote",
    "remote_addr",
    "proxy_protocol_addr",
    "proxy_add_x_forwarded_for",
];

/// Body keys that may hold an integer encoded as a string.
const INT_FIELDS: [&str; 16] = [
    "bytes_sent",
    "code",
    "dbid",
    "http_status",
    "level",
    "org_id",
    "pid",
    "process_id",
    "process_log_line",
    "rows_examined",
    "rows_sent",
    "sessionid",
    "size",
    "slow_query_timestamp",
    "status",
    "tid",
];

/// Body keys that may hold a float encoded as a string.
const FLOAT_FIELDS: [&str; 2] = ["query_time", "lock_time"];

lazy_static! {
    /// An IPv4 address followed by a port.
    static ref IP_PORT_REGEX: Regex =
        Regex::new(r"^([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}):([0-9]+)$")
            .expect("failed creating regex");

    /// A bare IPv4 address.
    static ref IP_REGEX: Regex =
        Regex::new(r"^([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})$")
            .expect("failed creating regex");

    /// Anything followed by a trailing `:port`.
    static ref PORT_REGEX: Regex = Regex::new(r"(.*):([0-9]+)$").expect("failed creating regex");
}

/// Applies every normalization rule to the record, in a fixed order.
///
/// Timestamp and severity promotion run first so that later rules never see
/// the promoted keys.
pub fn transform(record: &mut Record, plugins: Option<&PluginRegistry>) {
    promote_timestamp(record);
    promote_severity(record);
    if let Some(plugins) = plugins {
        add_plugin_info(record, plugins);
    }

    let Some(body) = record.body.as_map_mut() else {
        return;
    };
    convert_client(body);
    convert_string_arrays(body);
    convert_numeric_fields(body);
}

/// Moves the first body timestamp that can be coerced to the record time.
fn promote_timestamp(record: &mut Record) {
    let Some(body) = record.body.as_map_mut() else {
        return;
    };

    for field in TIMESTAMP_FIELDS {
        if let Some(nanos) = body.get(field).and_then(coerce_to_timestamp) {
            body.remove(field);
            record.time_unix_nano = nanos;
            return;
        }
    }
}

/// Moves an integral `severity` body value to the record severity.
fn promote_severity(record: &mut Record) {
    let Some(body) = record.body.as_map_mut() else {
        return;
    };

    let level = match body.get(SEVERITY_FIELD) {
        Some(AnyValue::Int(level)) => Some(*level),
        Some(AnyValue::String(level)) => level.parse::<i64>().ok(),
        _ => None,
    };

    if let Some(level) = level {
        body.remove(SEVERITY_FIELD);
        let severity = Severity::from_level(level);
        record.severity_number = severity.number();
        record.severity_text = severity.text().to_string();
    }
}

/// Adds the type, name, and version of the plugin that produced the record.
///
/// Attributes already present on the record are kept.
fn add_plugin_info(record: &mut Record, plugins: &PluginRegistry) {
    let Some(info) = record
        .attributes
        .get(PLUGIN_ID_ATTRIBUTE)
        .and_then(AnyValue::as_str)
        .and_then(|id| plugins.get(id))
    else {
        return;
    };

    for (key, value) in info.attributes() {
        record
            .attributes
            .entry(key.to_string())
            .or_insert_with(|| AnyValue::from(value));
    }
}

/// Splits a string `client` into its address and port parts.
fn convert_client(body: &mut Body) {
    replace_string_field(body, CLIENT_FIELD, |client| {
        Some(AnyValue::Map(parse_client(client)))
    });
}

fn parse_client(client: &str) -> Body {
    let mut parts = Body::new();

    if let Some(caps) = IP_PORT_REGEX.captures(client) {
        if let Ok(port) = caps[2].parse::<i64>() {
            parts.insert(IP_KEY.to_string(), AnyValue::from(&caps[1]));
            parts.insert(PORT_KEY.to_string(), AnyValue::Int(port));
        } else {
            parts.insert(ADDRESS_KEY.to_string(), AnyValue::from(client));
        }
        return parts;
    }

    if let Some(caps) = IP_REGEX.captures(client) {
        parts.insert(IP_KEY.to_string(), AnyValue::from(&caps[1]));
        return parts;
    }

    if let Some(caps) = PORT_REGEX.captures(client) {
        if let Ok(port) = caps[2].parse::<i64>() {
            if !caps[1].is_empty() {
                parts.insert(ADDRESS_KEY.to_string(), AnyValue::from(&caps[1]));
            }
            parts.insert(PORT_KEY.to_string(), AnyValue::Int(port));
        } else {
            parts.insert(ADDRESS_KEY.to_string(), AnyValue::from(client));
        }
        return parts;
    }

    parts.insert(ADDRESS_KEY.to_string(), AnyValue::from(client));
    parts
}

/// Turns list-like strings (`"[a, b]"` or `"a, b"`) into arrays.
fn convert_string_arrays(body: &mut Body) {
    for field in ARRAY_FIELDS {
        replace_string_field(body, field, |raw| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return None;
            }

            let inner = trimmed
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .unwrap_or(trimmed);

            Some(AnyValue::Array(
                inner
                    .split(',')
                    .map(|part| AnyValue::from(part.trim()))
                    .collect(),
            ))
        });
    }
}

fn convert_numeric_fields(body: &mut Body) {
    for field in INT_FIELDS {
        replace_string_field(body, field, |raw| raw.parse::<i64>().ok().map(AnyValue::Int));
    }

    for field in FLOAT_FIELDS {
        replace_string_field(body, field, |raw| raw.parse::<f64>().ok().map(AnyValue::Double));
    }
}

/// Replaces a string body value with `parse(value)`, unless `parse` declines.
fn replace_string_field<F>(body: &mut Body, field: &str, parse: F)
where
    F: FnOnce(&str) -> Option<AnyValue>,
{
    let replacement = match body.get(field) {
        Some(AnyValue::String(raw)) => parse(raw),
        _ => None,
    };

    if let Some(value) = replacement {
        body.insert(field.to_string(), value);
    }
}

#[cfg(test)]
#[path = "transform_test.rs"]
mod transform_test;
