//! Envoy access log gRPC receiver.
//!
//! Implements `envoy.service.accesslog.v2.AccessLogService`, the client-streaming
//! endpoint Envoy's gRPC access logger connects to.

mod service;

pub use service::AccessLogServiceImpl;
