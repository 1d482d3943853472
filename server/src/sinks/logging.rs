//! Structured logging sink.

use async_trait::async_trait;
use shared::envoy::conversions::http_entry_to_record;
use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;

use crate::callback::AccessLogCallback;
use crate::context::EntryContext;
use crate::error::CallbackError;

/// Logs one line per HTTP request, including the value correlated from
/// filter metadata. The full record is attached at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

impl LoggingCallback {
    /// Creates a logging callback.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccessLogCallback for LoggingCallback {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(
        &self,
        ctx: &EntryContext<'_>,
        _message: &StreamAccessLogsMessage,
    ) -> Result<(), CallbackError> {
        let record = http_entry_to_record(ctx.entry, ctx.correlated_value);

        tracing::info!(
            args_from_response = %record.correlated_value,
            method = %record.method,
            path = %record.path,
            response_code = record.response_code,
            "Received http request"
        );

        if tracing::enabled!(tracing::Level::DEBUG) {
            let json = serde_json::to_string(&record)?;
            tracing::debug!(record = %json, "Correlated access log record");
        }

        Ok(())
    }
}
