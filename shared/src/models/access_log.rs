//! Access log record model.
//!
//! Defines `AccessLogRecord`, a flattened, serializable view of one Envoy HTTP
//! access log entry together with the value correlated from filter metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP protocol version reported by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpVersion {
    /// The proxy did not report a version.
    #[default]
    Unspecified,
    /// HTTP/1.0.
    Http10,
    /// HTTP/1.1.
    Http11,
    /// HTTP/2.
    Http2,
    /// HTTP/3.
    Http3,
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unspecified => write!(f, "unspecified"),
            Self::Http10 => write!(f, "HTTP/1.0"),
            Self::Http11 => write!(f, "HTTP/1.1"),
            Self::Http2 => write!(f, "HTTP/2"),
            Self::Http3 => write!(f, "HTTP/3"),
        }
    }
}

/// One HTTP request observed by the proxy, correlated with filter metadata.
///
/// # Example
///
/// ```
/// use shared::models::AccessLogRecord;
///
/// let record = AccessLogRecord::new("GET", "/status")
///     .with_response_code(200)
///     .with_correlated_value("foo");
///
/// assert_eq!(record.path, "/status");
/// assert_eq!(record.correlated_value, "foo");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogRecord {
    /// When the proxy received the first byte of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// HTTP protocol version.
    #[serde(default)]
    pub protocol: HttpVersion,

    /// Request method (`GET`, `POST`, ...), empty if unspecified.
    #[serde(default)]
    pub method: String,

    /// Request scheme.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scheme: String,

    /// Value of the `:authority` / `Host` header.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authority: String,

    /// Request path.
    #[serde(default)]
    pub path: String,

    /// Value of the `User-Agent` header.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_agent: String,

    /// Value of the `X-Request-Id` header.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_id: String,

    /// Response status code, if a response was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_code: Option<u32>,

    /// Upstream cluster the request was routed to.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub upstream_cluster: String,

    /// Name of the matched route.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route_name: String,

    /// Dynamic metadata per filter, converted to JSON.
    #[serde(default)]
    pub filter_metadata: HashMap<String, serde_json::Value>,

    /// Value read from filter metadata for this entry (empty when absent).
    #[serde(default)]
    pub correlated_value: String,
}

impl AccessLogRecord {
    /// Creates a record for a request with the given method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            start_time: None,
            protocol: HttpVersion::Unspecified,
            method: method.into(),
            scheme: String::new(),
            authority: String::new(),
            path: path.into(),
            user_agent: String::new(),
            request_id: String::new(),
            response_code: None,
            upstream_cluster: String::new(),
            route_name: String::new(),
            filter_metadata: HashMap::new(),
            correlated_value: String::new(),
        }
    }

    /// Sets the response status code.
    #[must_use]
    pub fn with_response_code(mut self, code: u32) -> Self {
        self.response_code = Some(code);
        self
    }

    /// Sets the value correlated from filter metadata.
    #[must_use]
    pub fn with_correlated_value(mut self, value: impl Into<String>) -> Self {
        self.correlated_value = value.into();
        self
    }

    /// Returns true if the response carried a 5xx status.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.response_code.is_some_and(|code| (500..600).contains(&code))
    }
}
