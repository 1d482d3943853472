//! Envoy access log service (ALS) support.
//!
//! Generated protobuf types for the v2 access log service, plus conversions
//! from Envoy's HTTP access log entries into [`AccessLogRecord`](crate::models::AccessLogRecord).
//!
//! The module tree mirrors the protobuf packages (`envoy.api.v2.core`,
//! `envoy.data.accesslog.v2`, `envoy.service.accesslog.v2`) because the
//! generated code refers to sibling packages through relative paths.
//!
//! # Example
//!
//! ```
//! use shared::envoy::service::accesslog::v2::stream_access_logs_message::LogEntries;
//! use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;
//!
//! let message = StreamAccessLogsMessage::default();
//! assert!(!matches!(message.log_entries, Some(LogEntries::HttpLogs(_))));
//! ```

pub mod conversions;

/// Encoded `FileDescriptorSet` for every compiled Envoy proto, used to serve gRPC reflection.
pub const FILE_DESCRIPTOR_SET: &[u8] =
    include_bytes!(concat!(env!("OUT_DIR"), "/accesslog_descriptor.bin"));

#[allow(clippy::all)]
#[allow(clippy::pedantic)]
#[allow(missing_docs)]
pub mod api {
    //! Envoy API types.
    pub mod v2 {
        //! Envoy v2 API.
        pub mod core {
            //! Core types shared across the Envoy API.
            #![allow(clippy::all)]
            #![allow(clippy::pedantic)]
            #![allow(missing_docs)]
            tonic::include_proto!("envoy.api.v2.core");
        }
    }
}

#[allow(clippy::all)]
#[allow(clippy::pedantic)]
#[allow(missing_docs)]
pub mod data {
    //! Envoy data types.
    pub mod accesslog {
        //! Access log entry types.
        pub mod v2 {
            #![allow(clippy::all)]
            #![allow(clippy::pedantic)]
            #![allow(missing_docs)]
            tonic::include_proto!("envoy.data.accesslog.v2");
        }
    }
}

#[allow(clippy::all)]
#[allow(clippy::pedantic)]
#[allow(missing_docs)]
pub mod service {
    //! Envoy gRPC services.
    pub mod accesslog {
        //! Access log streaming service.
        pub mod v2 {
            #![allow(clippy::all)]
            #![allow(clippy::pedantic)]
            #![allow(missing_docs)]
            tonic::include_proto!("envoy.service.accesslog.v2");
        }
    }
}
