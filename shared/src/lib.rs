//! Accesslogger Shared Library
//!
//! This crate contains the protocol types, metadata extraction, and record
//! models shared by the access log server and the `alsctl` CLI.
//!
//! # Modules
//!
//! - [`envoy`] - Generated Envoy access log service types and conversions
//! - [`metadata`] - Reading string fields out of per-filter dynamic metadata
//! - [`models`] - Serializable access log records
//!
//! # Example
//!
//! ```
//! use shared::metadata::MetadataLookup;
//! use shared::envoy::data::accesslog::v2::HttpAccessLogEntry;
//!
//! // Entries without metadata correlate to an empty value
//! let lookup = MetadataLookup::default();
//! assert_eq!(lookup.extract_from_entry(&HttpAccessLogEntry::default()), "");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod envoy;
pub mod metadata;
pub mod models;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use prost_types;
pub use serde;
pub use serde_json;
