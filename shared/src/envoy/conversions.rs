//! Conversions between Envoy access log protobuf types and internal types.
//!
//! This module turns an Envoy `HTTPAccessLogEntry` into the flattened
//! [`AccessLogRecord`] used by sinks that emit structured output.

use crate::envoy::api::v2::core::RequestMethod;
use crate::envoy::data::accesslog::v2::http_access_log_entry::HttpVersion as ProtoHttpVersion;
use crate::envoy::data::accesslog::v2::HttpAccessLogEntry;
use crate::models::{AccessLogRecord, HttpVersion};
use chrono::{DateTime, Utc};
use prost_types::value::Kind;
use std::collections::HashMap;

/// Converts a protobuf `Timestamp` to a `DateTime<Utc>`.
///
/// Returns `None` for timestamps outside chrono's representable range.
fn timestamp_to_datetime(ts: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.nanos).ok()?;
    DateTime::from_timestamp(ts.seconds, nanos)
}

/// Converts a protobuf `Value` to `serde_json::Value`.
pub fn struct_value_to_json(value: &prost_types::Value) -> serde_json::Value {
    match &value.kind {
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(*n)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(struct_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => struct_to_json(s),
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
    }
}

/// Converts a protobuf `Struct` to a JSON object.
pub fn struct_to_json(s: &prost_types::Struct) -> serde_json::Value {
    let map = s
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), struct_value_to_json(v)))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(map)
}

/// Converts Envoy filter metadata to a JSON map keyed by filter name.
pub fn filter_metadata_to_json(
    filter_metadata: &HashMap<String, prost_types::Struct>,
) -> HashMap<String, serde_json::Value> {
    filter_metadata
        .iter()
        .map(|(filter, s)| (filter.clone(), struct_to_json(s)))
        .collect()
}

fn protocol_version(raw: i32) -> HttpVersion {
    match ProtoHttpVersion::try_from(raw) {
        Ok(ProtoHttpVersion::Http10) => HttpVersion::Http10,
        Ok(ProtoHttpVersion::Http11) => HttpVersion::Http11,
        Ok(ProtoHttpVersion::Http2) => HttpVersion::Http2,
        Ok(ProtoHttpVersion::Http3) => HttpVersion::Http3,
        Ok(ProtoHttpVersion::ProtocolUnspecified) | Err(_) => HttpVersion::Unspecified,
    }
}

fn request_method(raw: i32) -> String {
    match RequestMethod::try_from(raw) {
        Ok(RequestMethod::MethodUnspecified) | Err(_) => String::new(),
        Ok(method) => method.as_str_name().to_string(),
    }
}

/// Converts an Envoy `HTTPAccessLogEntry` to an `AccessLogRecord`.
///
/// # Arguments
///
/// * `entry` - The access log entry received from the proxy
/// * `correlated_value` - The value already extracted from the entry's filter metadata
#[must_use]
pub fn http_entry_to_record(
    entry: &HttpAccessLogEntry,
    correlated_value: impl Into<String>,
) -> AccessLogRecord {
    let mut record = AccessLogRecord::new(String::new(), String::new())
        .with_correlated_value(correlated_value);
    record.protocol = protocol_version(entry.protocol_version);

    if let Some(common) = &entry.common_properties {
        record.start_time = common.start_time.as_ref().and_then(timestamp_to_datetime);
        record.upstream_cluster.clone_from(&common.upstream_cluster);
        record.route_name.clone_from(&common.route_name);
        if let Some(metadata) = &common.metadata {
            record.filter_metadata = filter_metadata_to_json(&metadata.filter_metadata);
        }
    }

    if let Some(request) = &entry.request {
        record.method = request_method(request.request_method);
        record.scheme.clone_from(&request.scheme);
        record.authority.clone_from(&request.authority);
        record.path.clone_from(&request.path);
        record.user_agent.clone_from(&request.user_agent);
        record.request_id.clone_from(&request.request_id);
    }

    record.response_code = entry.response.as_ref().and_then(|r| r.response_code);

    record
}

#[path = "conversions_test.rs"]
mod conversions_test;
