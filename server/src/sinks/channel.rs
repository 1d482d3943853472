//! Channel sink feeding an in-process event pipeline.

use async_trait::async_trait;
use shared::envoy::conversions::http_entry_to_record;
use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;
use shared::models::AccessLogRecord;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::callback::AccessLogCallback;
use crate::context::EntryContext;
use crate::error::CallbackError;

/// Converts each entry to an [`AccessLogRecord`] and pushes it onto a bounded channel.
///
/// The callback never waits for capacity: a full channel rejects the record
/// and a dropped receiver closes the sink. Both surface as callback failures.
#[derive(Debug, Clone)]
pub struct ChannelCallback {
    name: String,
    sender: mpsc::Sender<AccessLogRecord>,
}

impl ChannelCallback {
    /// Creates a sink with a channel of the given capacity and returns the receiving end.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<AccessLogRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::from_sender(name, sender), receiver)
    }

    /// Creates a sink that pushes onto an existing channel.
    #[must_use]
    pub fn from_sender(name: impl Into<String>, sender: mpsc::Sender<AccessLogRecord>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

#[async_trait]
impl AccessLogCallback for ChannelCallback {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        ctx: &EntryContext<'_>,
        _message: &StreamAccessLogsMessage,
    ) -> Result<(), CallbackError> {
        let record = http_entry_to_record(ctx.entry, ctx.correlated_value);

        match self.sender.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CallbackError::Rejected {
                sink: self.name.clone(),
                reason: "channel is full".to_string(),
            }),
            Err(TrySendError::Closed(_)) => Err(CallbackError::Closed(self.name.clone())),
        }
    }
}
