//! Debug route definitions.
//!
//! This module organizes the HTTP routes of the debug server.

mod health;
mod stats;

pub use health::health_routes;
pub use stats::stats_routes;
