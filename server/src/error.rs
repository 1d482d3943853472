//! Error types for the access log server.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors that end the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The gRPC listener could not be bound. The server never reached SERVING.
    #[error("Failed to bind listener at {addr}: {source}")]
    Bind {
        /// Address the listener was bound to.
        addr: SocketAddr,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The reflection service could not be built from the descriptor set.
    #[error("Failed to build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    /// The transport failed while serving.
    #[error("Server transport failed: {0}")]
    Serve(#[from] tonic::transport::Error),

    /// The debug HTTP server failed.
    #[error("Debug server failed: {0}")]
    Debug(#[source] std::io::Error),
}

/// Error reported by a callback for a single entry.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The sink rejected the record.
    #[error("Sink '{sink}' rejected record: {reason}")]
    Rejected {
        /// Name of the rejecting sink.
        sink: String,
        /// Why the record was rejected.
        reason: String,
    },

    /// The sink's downstream is gone and cannot accept records anymore.
    #[error("Sink '{0}' is closed")]
    Closed(String),

    /// The record could not be serialized.
    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A failure policy name that is neither `continue` nor `abort`.
#[derive(Debug, Error)]
#[error("Unknown failure policy '{0}'. Expected 'continue' or 'abort'")]
pub struct ParsePolicyError(pub String);
