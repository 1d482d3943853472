//! Server lifecycle: bind, serve, and coordinated shutdown.
//!
//! ```text
//! Unbound --start--> Bound --serve--> Serving --stop--> Stopping --> Stopped
//! ```
//!
//! [`start`] binds the listener and assembles the gRPC routes (access log
//! service, health, reflection). [`RunningServer::serve`] publishes SERVING
//! and blocks until a [`ServerHandle`] stops it or the transport fails.
//! Stopping publishes NOT_SERVING first, then fires the stop token: the
//! server stops accepting, drops the listener, and open streams end.
//!
//! [`run`] ties these together with an external [`CancellationToken`].

use shared::envoy::service::accesslog::v2::access_log_service_server::AccessLogServiceServer;
use shared::envoy::FILE_DESCRIPTOR_SET;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::service::Routes;
use tonic::transport::Server;

use crate::error::ServerError;
use crate::grpc::AccessLogServiceImpl;
use crate::health::HealthProbe;

/// How long serving may keep draining connections after stop, unless configured.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// No listener yet.
    Unbound,
    /// Listener bound, not yet serving.
    Bound,
    /// Accepting streams.
    Serving,
    /// Stop requested; draining.
    Stopping,
    /// Serving has returned.
    Stopped,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unbound,
            1 => Self::Bound,
            2 => Self::Serving,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

struct HandleInner {
    state: AtomicU8,
    local_addr: SocketAddr,
    probe: HealthProbe,
    stop: CancellationToken,
    done: CancellationToken,
}

/// Control handle for a started server.
///
/// Cloning is cheap; all clones control the same server.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<HandleInner>,
}

impl ServerHandle {
    fn new(local_addr: SocketAddr, probe: HealthProbe) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                state: AtomicU8::new(LifecycleState::Unbound as u8),
                local_addr,
                probe,
                stop: CancellationToken::new(),
                done: CancellationToken::new(),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Health probe of this server.
    #[must_use]
    pub fn probe(&self) -> &HealthProbe {
        &self.inner.probe
    }

    /// Returns true once serving has returned.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.done.is_cancelled()
    }

    /// Waits until serving has returned.
    pub async fn stopped(&self) {
        self.inner.done.cancelled().await;
    }

    /// Requests shutdown.
    ///
    /// Health goes NOT_SERVING before the stop token fires, so probes see
    /// the change before the listener is dropped. Returns true only for the
    /// call that initiated shutdown; later and concurrent calls are no-ops.
    pub async fn stop(&self) -> bool {
        let mut current = self.inner.state.load(Ordering::Acquire);
        loop {
            if current >= LifecycleState::Stopping as u8 {
                return false;
            }
            match self.inner.state.compare_exchange(
                current,
                LifecycleState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        tracing::info!(addr = %self.inner.local_addr, "Stopping server");
        self.inner.probe.set_not_serving().await;
        self.inner.stop.cancel();
        true
    }

    fn stop_token(&self) -> CancellationToken {
        self.inner.stop.clone()
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn finish(&self) {
        self.inner.probe.set_not_serving().await;
        self.inner
            .state
            .store(LifecycleState::Stopped as u8, Ordering::Release);
        self.inner.done.cancel();
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.inner.local_addr)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A server whose listener is bound but which is not serving yet.
pub struct RunningServer {
    listener: TcpListener,
    routes: Routes,
    handle: ServerHandle,
    shutdown_grace: Duration,
}

impl RunningServer {
    /// Address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// A handle that can stop the server from another task.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Sets the upper bound on draining after stop.
    #[must_use]
    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    /// Publishes SERVING and serves until stopped or the transport fails.
    ///
    /// After stop, this returns within the shutdown grace period even if
    /// clients keep connections open. If stop was requested before serving
    /// began, it returns immediately without publishing SERVING.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] if the transport fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let Self {
            listener,
            routes,
            handle,
            shutdown_grace,
        } = self;

        if !handle.transition(LifecycleState::Bound, LifecycleState::Serving) {
            tracing::debug!("Stop requested before serving");
            handle.finish().await;
            return Ok(());
        }

        handle.probe().set_serving().await;
        tracing::info!(addr = %handle.local_addr(), "Serving access log service");

        let stop = handle.stop_token();
        let server = Server::builder()
            .add_routes(routes)
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                stop.clone().cancelled_owned(),
            );
        let drain_deadline = async {
            stop.cancelled().await;
            tokio::time::sleep(shutdown_grace).await;
        };

        let result = tokio::select! {
            result = server => result.map_err(ServerError::from),
            () = drain_deadline => {
                tracing::warn!(
                    grace_ms = u64::try_from(shutdown_grace.as_millis()).unwrap_or(u64::MAX),
                    "Shutdown grace period elapsed, dropping remaining connections"
                );
                Ok(())
            }
        };

        handle.finish().await;
        match &result {
            Ok(()) => tracing::info!("Server stopped"),
            Err(error) => tracing::error!(error = %error, "Server stopped with error"),
        }
        result
    }
}

impl std::fmt::Debug for RunningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningServer")
            .field("handle", &self.handle)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}

/// Binds `addr` and assembles the access log, health, and reflection services.
///
/// The probe stays NOT_SERVING until [`RunningServer::serve`] is called.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot be bound, or
/// [`ServerError::Reflection`] if the descriptor set is unusable.
pub async fn start(
    addr: SocketAddr,
    service: AccessLogServiceImpl,
    probe: HealthProbe,
) -> Result<RunningServer, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::Bind { addr, source })?;

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    probe.register().await;
    let handle = ServerHandle::new(local_addr, probe);
    let service = service.with_shutdown(handle.stop_token());
    let routes = handle
        .probe()
        .routes()
        .add_service(AccessLogServiceServer::new(service))
        .add_service(reflection);

    handle
        .inner
        .state
        .store(LifecycleState::Bound as u8, Ordering::Release);
    tracing::info!(%local_addr, service = handle.probe().service_name(), "Listener bound");

    Ok(RunningServer {
        listener,
        routes,
        handle,
        shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
    })
}

/// Stops the server when `ctx` is cancelled.
///
/// The task also ends, without stopping anything, once the server stops on
/// its own.
pub fn watch_cancellation(ctx: CancellationToken, handle: ServerHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = ctx.cancelled() => {
                tracing::info!("Cancellation requested, shutting down");
                handle.stop().await;
            }
            () = handle.stopped() => {}
        }
    })
}

/// Starts the server and serves until `ctx` is cancelled.
///
/// A transport error after `ctx` was cancelled is part of an expected
/// shutdown and is not reported.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] or [`ServerError::Reflection`] on startup
/// failure, and [`ServerError::Serve`] if the transport fails while `ctx` is
/// still live.
pub async fn run(
    ctx: CancellationToken,
    addr: SocketAddr,
    service: AccessLogServiceImpl,
    probe: HealthProbe,
    shutdown_grace: Duration,
) -> Result<(), ServerError> {
    let server = start(addr, service, probe)
        .await?
        .with_shutdown_grace(shutdown_grace);
    let watcher = watch_cancellation(ctx.clone(), server.handle());

    let result = server.serve().await;

    if let Err(error) = watcher.await {
        tracing::warn!(error = %error, "Cancellation watcher failed");
    }

    match result {
        Err(error) if ctx.is_cancelled() => {
            tracing::info!(error = %error, "Ignoring transport error during shutdown");
            Ok(())
        }
        other => other,
    }
}
