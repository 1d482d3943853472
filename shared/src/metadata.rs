//! Filter metadata extraction.
//!
//! Envoy attaches per-request dynamic metadata to each access log entry, keyed
//! by the reverse-DNS name of the filter that produced it. The transformation
//! filter, for example, stores values extracted from the response body under
//! `io.solo.transformation`. This module reads string fields out of that
//! mapping without ever failing: a missing filter or field yields `""`.

use crate::envoy::data::accesslog::v2::HttpAccessLogEntry;
use prost_types::value::Kind;
use std::collections::HashMap;

/// Filter name under which the transformation filter stores dynamic metadata.
pub const TRANSFORMATION_FILTER: &str = "io.solo.transformation";

/// Default field read from the transformation filter's metadata.
pub const DEFAULT_FIELD_KEY: &str = "args_body";

/// Returns the string value stored at `field_key` in the metadata of `filter_id`.
///
/// Returns an empty string when the filter has no metadata, the field is
/// missing, or the field holds a non-string value.
///
/// # Example
///
/// ```
/// use prost_types::{value::Kind, Struct, Value};
/// use shared::metadata::extract_string_field;
/// use std::collections::HashMap;
///
/// let fields = [(
///     "args_body".to_string(),
///     Value { kind: Some(Kind::StringValue("foo".to_string())) },
/// )];
/// let metadata = HashMap::from([(
///     "transformation".to_string(),
///     Struct { fields: fields.into_iter().collect() },
/// )]);
///
/// assert_eq!(extract_string_field(&metadata, "transformation", "args_body"), "foo");
/// assert_eq!(extract_string_field(&metadata, "transformation", "missing_key"), "");
/// ```
#[must_use]
pub fn extract_string_field(
    filter_metadata: &HashMap<String, prost_types::Struct>,
    filter_id: &str,
    field_key: &str,
) -> String {
    let Some(filter) = filter_metadata.get(filter_id) else {
        return String::new();
    };

    match filter.fields.get(field_key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    }
}

/// A fixed filter id and field key applied to every entry of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataLookup {
    /// Filter whose metadata is read.
    pub filter_id: String,
    /// Field read from that filter's metadata.
    pub field_key: String,
}

impl MetadataLookup {
    /// Creates a lookup for `field_key` in the metadata of `filter_id`.
    #[must_use]
    pub fn new(filter_id: impl Into<String>, field_key: impl Into<String>) -> Self {
        Self {
            filter_id: filter_id.into(),
            field_key: field_key.into(),
        }
    }

    /// Creates a lookup for `field_key` in the transformation filter's metadata.
    #[must_use]
    pub fn transformation(field_key: impl Into<String>) -> Self {
        Self::new(TRANSFORMATION_FILTER, field_key)
    }

    /// Applies the lookup to a filter metadata mapping.
    #[must_use]
    pub fn extract(&self, filter_metadata: &HashMap<String, prost_types::Struct>) -> String {
        extract_string_field(filter_metadata, &self.filter_id, &self.field_key)
    }

    /// Applies the lookup to an HTTP access log entry.
    ///
    /// Entries without common properties or metadata resolve to `""`.
    #[must_use]
    pub fn extract_from_entry(&self, entry: &HttpAccessLogEntry) -> String {
        entry
            .common_properties
            .as_ref()
            .and_then(|common| common.metadata.as_ref())
            .map(|metadata| self.extract(&metadata.filter_metadata))
            .unwrap_or_default()
    }
}

impl Default for MetadataLookup {
    fn default() -> Self {
        Self::transformation(DEFAULT_FIELD_KEY)
    }
}
