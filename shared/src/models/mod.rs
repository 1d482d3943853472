//! Data models for correlated access log records.

pub mod access_log;

pub use access_log::{AccessLogRecord, HttpVersion};
