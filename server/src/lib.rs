//! Accesslogger Server
//!
//! This crate receives Envoy access logs over gRPC, correlates each HTTP entry
//! with a value from the proxy's filter metadata, and hands it to callbacks.
//!
//! # Architecture
//!
//! The server is built on Tonic and Tokio, providing:
//! - `envoy.service.accesslog.v2.AccessLogService` for access log ingestion
//! - `grpc.health.v1.Health` and gRPC reflection on the same port
//! - An optional Axum debug server exposing `/health` and `/stats`
//!
//! # Example
//!
//! ```no_run
//! use accesslogger::run_server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     run_server().await
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod callback;
mod config;
pub mod context;
pub mod error;
pub mod grpc;
pub mod health;
pub mod lifecycle;
mod routes;
pub mod sinks;
mod state;
pub mod stats;

pub use config::Config;
pub use state::AppState;

use anyhow::Result;
use axum::Router;
use shared::metadata::MetadataLookup;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use callback::{AccessLogCallback, CallbackList};
use error::ServerError;
use grpc::AccessLogServiceImpl;
use health::HealthProbe;
use stats::IngestStats;

/// Runs the access log server.
///
/// This function initializes the server with configuration from environment variables
/// and serves until SIGTERM/SIGINT, logging every entry with [`sinks::LoggingCallback`].
///
/// # Errors
///
/// Returns an error if:
/// - Configuration cannot be loaded from environment
/// - The server fails to bind to the configured address
/// - The transport fails while the server is not shutting down
pub async fn run_server() -> Result<()> {
    let config = Config::from_env()?;
    let ctx = CancellationToken::new();
    tokio::spawn(shutdown_signal(ctx.clone()));

    run_server_with_config(config, default_callbacks(), ctx).await
}

/// Runs the access log server with the provided configuration and callbacks.
///
/// The server stops when `ctx` is cancelled. This is useful for testing or when
/// embedding the server with custom sinks.
///
/// # Errors
///
/// Returns an error if:
/// - The configured addresses are invalid
/// - The gRPC or debug listener cannot be bound
/// - The transport fails while `ctx` is still live
pub async fn run_server_with_config(
    config: Config,
    callbacks: CallbackList,
    ctx: CancellationToken,
) -> Result<()> {
    let addr = config.socket_addr()?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        service = %config.service_name,
        filter_id = %config.filter_id,
        field_key = %config.field_key,
        failure_policy = %config.failure_policy,
        callbacks = ?callbacks.names(),
        "Accesslogger server starting"
    );

    let stats = Arc::new(IngestStats::new());
    let probe = HealthProbe::new(config.service_name.clone());
    let service = AccessLogServiceImpl::new(
        callbacks,
        MetadataLookup::new(config.filter_id.clone(), config.field_key.clone()),
        Arc::clone(&stats),
    )
    .with_failure_policy(config.failure_policy);

    let debug_server = match config.debug_addr()? {
        Some(debug_addr) => Some(
            spawn_debug_server(debug_addr, AppState::new(stats, probe.clone()), ctx.clone())
                .await?,
        ),
        None => None,
    };

    let result = lifecycle::run(ctx.clone(), addr, service, probe, config.shutdown_grace).await;

    // The debug server follows the gRPC server down, whatever the reason.
    ctx.cancel();
    if let Some(task) = debug_server {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(error = %error, "Debug server failed"),
            Err(error) => tracing::warn!(error = %error, "Debug server task failed"),
        }
    }

    result?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Callbacks registered by the `accesslogger` binary.
#[must_use]
pub fn default_callbacks() -> CallbackList {
    let logging: Arc<dyn AccessLogCallback> = Arc::new(sinks::LoggingCallback::new());
    CallbackList::new(vec![logging])
}

/// Creates the debug router with all routes and middleware.
///
/// This function is public to allow testing the router without starting a full server.
pub fn create_debug_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::stats_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the debug server and serves it in the background until `ctx` is cancelled.
async fn spawn_debug_server(
    addr: SocketAddr,
    state: AppState,
    ctx: CancellationToken,
) -> Result<JoinHandle<std::io::Result<()>>, ServerError> {
    let listener = TcpListener::bind(addr).await.map_err(ServerError::Debug)?;
    let local_addr = listener.local_addr().map_err(ServerError::Debug)?;
    tracing::info!(addr = %local_addr, "Debug server listening");

    let app = create_debug_router(state);
    Ok(tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(ctx.cancelled_owned())
            .await
    }))
}

/// Cancels `ctx` on the first shutdown signal (SIGTERM or SIGINT).
///
/// Returns without cancelling if `ctx` is cancelled by someone else first.
pub async fn shutdown_signal(ctx: CancellationToken) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = ctx.cancelled() => return,
    }

    ctx.cancel();
}
