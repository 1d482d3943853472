//! Request-scoped context handed to callbacks.
//!
//! A `StreamContext` lives for one inbound stream. It carries the stream's
//! tracing span (the request-scoped logger), what the proxy told us about
//! itself in the first message, and the server's stop token. An
//! `EntryContext` narrows it down to one log entry and its correlated value.

use shared::envoy::data::accesslog::v2::HttpAccessLogEntry;
use shared::envoy::service::accesslog::v2::stream_access_logs_message::Identifier;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::Span;

/// Per-stream context shared by every entry received on the stream.
#[derive(Debug, Clone)]
pub struct StreamContext {
    stream_id: u64,
    peer: Option<SocketAddr>,
    log_name: String,
    node_id: String,
    span: Span,
    shutdown: CancellationToken,
}

impl StreamContext {
    /// Creates the context for a newly accepted stream.
    #[must_use]
    pub fn new(
        stream_id: u64,
        peer: Option<SocketAddr>,
        span: Span,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            stream_id,
            peer,
            log_name: String::new(),
            node_id: String::new(),
            span,
            shutdown,
        }
    }

    /// Records the identifier the proxy sends on the first message of a stream.
    pub fn observe_identifier(&mut self, identifier: &Identifier) {
        self.log_name.clone_from(&identifier.log_name);
        if let Some(node) = &identifier.node {
            self.node_id.clone_from(&node.id);
        }
        self.span.record("log_name", self.log_name.as_str());
        self.span.record("node_id", self.node_id.as_str());
    }

    /// Server-assigned id of this stream.
    #[must_use]
    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    /// Remote address of the proxy, when the transport exposes it.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Log name configured on the proxy side, empty until the identifier arrives.
    #[must_use]
    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Id of the proxy node, empty until the identifier arrives.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Span that scopes all logging for this stream.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Token cancelled when the server starts shutting down.
    #[must_use]
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }
}

/// Context for a single HTTP log entry being dispatched to callbacks.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    /// The stream the entry arrived on.
    pub stream: &'a StreamContext,
    /// The entry itself.
    pub entry: &'a HttpAccessLogEntry,
    /// Position of the entry within its message.
    pub index: usize,
    /// Value read from the entry's filter metadata, empty when absent.
    pub correlated_value: &'a str,
}
