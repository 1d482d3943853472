//! gRPC service implementation for the Envoy access log service.

use shared::envoy::service::accesslog::v2::access_log_service_server::AccessLogService;
use shared::envoy::service::accesslog::v2::stream_access_logs_message::LogEntries;
use shared::envoy::service::accesslog::v2::{StreamAccessLogsMessage, StreamAccessLogsResponse};
use shared::metadata::MetadataLookup;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::{Code, Request, Response, Status, Streaming};
use tracing::Instrument;

use crate::callback::{CallbackList, Dispatch, FailurePolicy};
use crate::context::{EntryContext, StreamContext};
use crate::stats::IngestStats;

/// Implementation of the Envoy `AccessLogService` gRPC service.
///
/// One instance is shared by every stream. It holds only read-only
/// configuration plus the shared counters; per-stream state lives in the
/// [`StreamContext`] created for each call.
#[derive(Clone)]
pub struct AccessLogServiceImpl {
    callbacks: CallbackList,
    lookup: Arc<MetadataLookup>,
    policy: FailurePolicy,
    stats: Arc<IngestStats>,
    shutdown: CancellationToken,
}

impl AccessLogServiceImpl {
    /// Creates a service dispatching to `callbacks`, correlating entries with `lookup`.
    #[must_use]
    pub fn new(callbacks: CallbackList, lookup: MetadataLookup, stats: Arc<IngestStats>) -> Self {
        Self {
            callbacks,
            lookup: Arc::new(lookup),
            policy: FailurePolicy::default(),
            stats,
            shutdown: CancellationToken::new(),
        }
    }

    /// Sets what happens when a callback reports a failure.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Ends open streams when `shutdown` is cancelled.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Shared ingest counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }

    /// Receives messages until the stream ends, fails, or the server stops.
    ///
    /// A cancelled stream and a server shutdown both end the loop cleanly.
    ///
    /// # Errors
    ///
    /// Returns the receive error for any failure other than cancellation, or
    /// `Aborted` when a callback fails under [`FailurePolicy::Abort`].
    pub async fn receive_loop<S>(&self, ctx: &mut StreamContext, mut inbound: S) -> Result<(), Status>
    where
        S: Stream<Item = Result<StreamAccessLogsMessage, Status>> + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    tracing::debug!("Server stopping, closing stream");
                    return Ok(());
                }
                next = inbound.next() => next,
            };

            match next {
                None => return Ok(()),
                Some(Err(status)) if status.code() == Code::Cancelled => {
                    tracing::debug!("Stream cancelled by peer");
                    return Ok(());
                }
                Some(Err(status)) => return Err(status),
                Some(Ok(message)) => self.process_message(ctx, &message).await?,
            }
        }
    }

    /// Classifies one message and dispatches each HTTP entry to the callbacks.
    async fn process_message(
        &self,
        ctx: &mut StreamContext,
        message: &StreamAccessLogsMessage,
    ) -> Result<(), Status> {
        self.stats.message_received();

        if let Some(identifier) = &message.identifier {
            ctx.observe_identifier(identifier);
        }

        match &message.log_entries {
            Some(LogEntries::HttpLogs(http_logs)) => {
                for (index, entry) in http_logs.log_entry.iter().enumerate() {
                    let correlated_value = self.lookup.extract_from_entry(entry);
                    self.stats.http_entry();

                    let entry_ctx = EntryContext {
                        stream: ctx,
                        entry,
                        index,
                        correlated_value: &correlated_value,
                    };

                    match self.callbacks.dispatch(&entry_ctx, message, self.policy).await {
                        Dispatch::Completed { failures: 0 } => {}
                        Dispatch::Completed { failures } => {
                            self.stats
                                .callback_failures(u64::try_from(failures).unwrap_or(u64::MAX));
                        }
                        Dispatch::Aborted { callback, error } => {
                            self.stats.callback_failures(1);
                            tracing::error!(%callback, error = %error, "Callback failed, aborting stream");
                            return Err(Status::aborted(format!(
                                "callback '{callback}' failed: {error}"
                            )));
                        }
                    }
                }
            }
            Some(LogEntries::TcpLogs(_)) | None => {
                self.stats.message_ignored();
                tracing::trace!("Ignoring message without HTTP entries");
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for AccessLogServiceImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessLogServiceImpl")
            .field("callbacks", &self.callbacks)
            .field("lookup", &self.lookup)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[tonic::async_trait]
impl AccessLogService for AccessLogServiceImpl {
    async fn stream_access_logs(
        &self,
        request: Request<Streaming<StreamAccessLogsMessage>>,
    ) -> Result<Response<StreamAccessLogsResponse>, Status> {
        let peer = request.remote_addr();
        let stream_id = self.stats.stream_opened();
        let span = tracing::info_span!(
            "access_log_stream",
            stream_id,
            peer = ?peer,
            log_name = tracing::field::Empty,
            node_id = tracing::field::Empty
        );

        let mut ctx = StreamContext::new(stream_id, peer, span.clone(), self.shutdown.clone());
        let inbound = request.into_inner();

        let result = async {
            tracing::debug!("Stream opened");
            self.receive_loop(&mut ctx, inbound).await
        }
        .instrument(span.clone())
        .await;

        self.stats.stream_closed(result.is_err());

        span.in_scope(|| match &result {
            Ok(()) => tracing::debug!("Stream closed"),
            Err(status) => {
                tracing::warn!(code = ?status.code(), detail = status.message(), "Stream ended with error");
            }
        });

        result.map(|()| Response::new(StreamAccessLogsResponse {}))
    }
}
