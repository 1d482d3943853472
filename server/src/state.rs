//! Application state module.
//!
//! Defines the shared state passed to debug route handlers.

use std::sync::Arc;

use crate::health::HealthProbe;
use crate::stats::IngestStats;

/// State shared by the debug HTTP handlers.
///
/// Holds the same counters and probe the gRPC side updates, so the debug
/// server always reflects the live server.
#[derive(Debug, Clone)]
pub struct AppState {
    stats: Arc<IngestStats>,
    probe: HealthProbe,
}

impl AppState {
    /// Creates a new application state.
    #[must_use]
    pub fn new(stats: Arc<IngestStats>, probe: HealthProbe) -> Self {
        Self { stats, probe }
    }

    /// Returns the ingest counters.
    #[must_use]
    pub fn stats(&self) -> &IngestStats {
        self.stats.as_ref()
    }

    /// Returns the health probe.
    #[must_use]
    pub fn probe(&self) -> &HealthProbe {
        &self.probe
    }
}
