//! gRPC health reporting for the ingestion endpoint.
//!
//! Wraps `tonic-health` so the serving status of the configured service name
//! (and of the server as a whole, the empty service name) moves from SERVING
//! to NOT_SERVING exactly once.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tonic::service::Routes;
use tonic_health::server::{health_reporter, HealthReporter};
use tonic_health::ServingStatus;

/// Serving state as seen by health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingState {
    /// Accepting new streams.
    Serving,
    /// Not accepting new streams (not started yet, or shutting down).
    NotServing,
}

impl ServingState {
    /// Lowercase name used in the debug HTTP API.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serving => "serving",
            Self::NotServing => "not_serving",
        }
    }
}

const PENDING: u8 = 0;
const SERVING: u8 = 1;
const STOPPED: u8 = 2;

/// Health status of the ingestion endpoint.
///
/// Cloning is cheap; all clones share the same status.
#[derive(Clone)]
pub struct HealthProbe {
    service_name: Arc<str>,
    phase: Arc<AtomicU8>,
    transition: Arc<Mutex<()>>,
    reporter: HealthReporter,
    routes: Routes,
}

impl HealthProbe {
    /// Creates a probe reporting under `service_name`.
    ///
    /// The probe starts NOT_SERVING; [`HealthProbe::set_serving`] is called
    /// by the lifecycle once the listener is bound.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        let (reporter, health_service) = health_reporter();
        let service_name: String = service_name.into();
        Self {
            service_name: service_name.into(),
            phase: Arc::new(AtomicU8::new(PENDING)),
            transition: Arc::new(Mutex::new(())),
            reporter,
            routes: Routes::new(health_service),
        }
    }

    /// Service name the status is reported under.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The `grpc.health.v1.Health` service, ready to be mounted on a server.
    #[must_use]
    pub fn routes(&self) -> Routes {
        self.routes.clone()
    }

    /// Current serving state.
    #[must_use]
    pub fn current_status(&self) -> ServingState {
        match self.phase.load(Ordering::Acquire) {
            SERVING => ServingState::Serving,
            _ => ServingState::NotServing,
        }
    }

    /// Registers the service name with the reporter as NOT_SERVING.
    ///
    /// Called once the listener is bound, so health checks issued before
    /// serving begins see NOT_SERVING instead of an unknown service.
    pub async fn register(&self) {
        let _guard = self.transition.lock().await;
        if self.phase.load(Ordering::Acquire) == PENDING {
            self.publish(ServingStatus::NotServing).await;
        }
    }

    /// Publishes SERVING.
    ///
    /// Returns false, and publishes nothing, if the probe already went
    /// NOT_SERVING: the transition never reverts.
    pub async fn set_serving(&self) -> bool {
        let _guard = self.transition.lock().await;
        if self.phase.load(Ordering::Acquire) != PENDING {
            tracing::debug!(service = %self.service_name, "Ignoring set_serving after shutdown began");
            return false;
        }

        self.publish(ServingStatus::Serving).await;
        self.phase.store(SERVING, Ordering::Release);
        tracing::info!(service = %self.service_name, "Health status set to SERVING");
        true
    }

    /// Publishes NOT_SERVING.
    ///
    /// Returns true only for the call that performed the transition.
    pub async fn set_not_serving(&self) -> bool {
        let _guard = self.transition.lock().await;
        if self.phase.swap(STOPPED, Ordering::AcqRel) == STOPPED {
            return false;
        }

        self.publish(ServingStatus::NotServing).await;
        tracing::info!(service = %self.service_name, "Health status set to NOT_SERVING");
        true
    }

    /// Publishing happens under `transition`, so the reporter always ends on
    /// the status matching `phase`.
    async fn publish(&self, status: ServingStatus) {
        self.reporter
            .set_service_status(self.service_name.as_ref(), status)
            .await;
        self.reporter.set_service_status("", status).await;
    }
}

impl std::fmt::Debug for HealthProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthProbe")
            .field("service_name", &self.service_name)
            .field("status", &self.current_status())
            .finish_non_exhaustive()
    }
}
