//! Server configuration module.
//!
//! Handles loading configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use shared::metadata::{DEFAULT_FIELD_KEY, TRANSFORMATION_FILTER};
use std::net::SocketAddr;
use std::time::Duration;

use crate::callback::FailurePolicy;

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `ACCESSLOG_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `SERVER_PORT`: The gRPC port to listen on (default: 8083)
/// - `SERVICE_NAME`: Name reported by the gRPC health service (default: "AccessLog")
/// - `DEBUG_PORT`: Port of the debug HTTP server, 0 disables it (default: 0)
/// - `ACCESSLOG_FILTER_ID`: Filter whose metadata is correlated (default: "io.solo.transformation")
/// - `ACCESSLOG_FIELD_KEY`: Metadata field read per entry (default: "`args_body`")
/// - `ACCESSLOG_FAILURE_POLICY`: `continue` or `abort` on callback failure (default: "continue")
/// - `ACCESSLOG_SHUTDOWN_GRACE_MS`: Upper bound on draining after stop (default: 5000)
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The gRPC port to listen on.
    pub port: u16,
    /// Service name registered with the health service.
    pub service_name: String,
    /// Debug HTTP server port; `0` disables the debug server.
    pub debug_port: u16,
    /// Filter id whose dynamic metadata is read for every entry.
    pub filter_id: String,
    /// Field read from the filter's metadata.
    pub field_key: String,
    /// What to do when a callback reports a failure.
    pub failure_policy: FailurePolicy,
    /// How long serving may keep draining connections after stop.
    pub shutdown_grace: Duration,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `SERVER_PORT` or `DEBUG_PORT` is set but cannot be parsed as a valid port number
    /// - `ACCESSLOG_FAILURE_POLICY` is not `continue` or `abort`
    /// - `ACCESSLOG_SHUTDOWN_GRACE_MS` is not a number of milliseconds
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates a configuration from an arbitrary variable lookup.
    ///
    /// Keeps parsing testable without touching the process environment.
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let host = lookup("ACCESSLOG_HOST").unwrap_or(defaults.host);

        let port = lookup("SERVER_PORT")
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("SERVER_PORT is not a valid port")?
            .unwrap_or(defaults.port);

        let service_name = lookup("SERVICE_NAME").unwrap_or(defaults.service_name);

        let debug_port = lookup("DEBUG_PORT")
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("DEBUG_PORT is not a valid port")?
            .unwrap_or(defaults.debug_port);

        let filter_id = lookup("ACCESSLOG_FILTER_ID").unwrap_or(defaults.filter_id);
        let field_key = lookup("ACCESSLOG_FIELD_KEY").unwrap_or(defaults.field_key);

        let failure_policy = lookup("ACCESSLOG_FAILURE_POLICY")
            .map(|p| p.parse::<FailurePolicy>())
            .transpose()?
            .unwrap_or(defaults.failure_policy);

        let shutdown_grace = lookup("ACCESSLOG_SHUTDOWN_GRACE_MS")
            .map(|ms| ms.parse::<u64>().map(Duration::from_millis))
            .transpose()
            .context("ACCESSLOG_SHUTDOWN_GRACE_MS is not a number")?
            .unwrap_or(defaults.shutdown_grace);

        Ok(Self {
            host,
            port,
            service_name,
            debug_port,
            filter_id,
            field_key,
            failure_policy,
            shutdown_grace,
        })
    }

    /// Returns the socket address for the gRPC listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port combination is not a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Self::parse_addr(&self.host, self.port)
    }

    /// Returns the socket address for the debug server, or `None` if it is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and debug port do not form a valid socket address.
    pub fn debug_addr(&self) -> Result<Option<SocketAddr>> {
        if self.debug_port == 0 {
            return Ok(None);
        }
        Self::parse_addr(&self.host, self.debug_port).map(Some)
    }

    fn parse_addr(host: &str, port: u16) -> Result<SocketAddr> {
        format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid socket address {host}:{port}"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            service_name: "AccessLog".to_string(),
            debug_port: 0,
            filter_id: TRANSFORMATION_FILTER.to_string(),
            field_key: DEFAULT_FIELD_KEY.to_string(),
            failure_policy: FailurePolicy::Continue,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}
