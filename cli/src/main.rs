//! alsctl
//!
//! Command-line client for poking at a running Accesslogger server.
//!
//! # Usage
//!
//! ```bash
//! alsctl --help
//! alsctl health
//! alsctl send --path /api/orders --args-body '{"id":1}' --count 3
//! ```

#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::envoy::api::v2::core::{Metadata, Node, RequestMethod};
use shared::envoy::data::accesslog::v2::{
    AccessLogCommon, HttpAccessLogEntry, HttpRequestProperties, HttpResponseProperties,
};
use shared::envoy::service::accesslog::v2::access_log_service_client::AccessLogServiceClient;
use shared::envoy::service::accesslog::v2::stream_access_logs_message::{
    HttpAccessLogEntries, Identifier, LogEntries,
};
use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;
use shared::metadata::{DEFAULT_FIELD_KEY, TRANSFORMATION_FILTER};
use std::collections::HashMap;
use tonic::transport::Channel;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;

/// alsctl - Envoy access log service command-line client
#[derive(Parser)]
#[command(name = "alsctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server URL
    #[arg(
        short,
        long,
        env = "ALSCTL_SERVER_URL",
        default_value = "http://127.0.0.1:8083"
    )]
    server_url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health over the gRPC health protocol
    Health {
        /// Service name to check; empty checks the server as a whole
        #[arg(long, default_value = "AccessLog")]
        service: String,
    },
    /// Stream synthetic HTTP access log entries to the server
    Send {
        /// Request path of every entry
        #[arg(long, default_value = "/")]
        path: String,

        /// Value stored under the field key in the transformation metadata
        #[arg(long)]
        args_body: Option<String>,

        /// Metadata field key the value is stored under
        #[arg(long, default_value = DEFAULT_FIELD_KEY)]
        field_key: String,

        /// Number of messages to send
        #[arg(long, default_value_t = 1)]
        count: usize,

        /// Log name sent in the stream identifier
        #[arg(long, default_value = "alsctl")]
        log_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Health { service }) => health(&cli.server_url, service).await,
        Some(Commands::Send {
            path,
            args_body,
            field_key,
            count,
            log_name,
        }) => {
            let messages =
                build_messages(&path, args_body.as_deref(), &field_key, count, &log_name);
            send(&cli.server_url, messages).await
        }
        None => {
            println!("alsctl v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

async fn connect(server_url: &str) -> Result<Channel> {
    Channel::from_shared(server_url.to_string())
        .with_context(|| format!("invalid server URL {server_url}"))?
        .connect()
        .await
        .with_context(|| format!("failed to connect to {server_url}"))
}

async fn health(server_url: &str, service: String) -> Result<()> {
    let mut client = HealthClient::new(connect(server_url).await?);
    let response = client
        .check(HealthCheckRequest {
            service: service.clone(),
        })
        .await
        .context("health check failed")?
        .into_inner();

    let status = ServingStatus::try_from(response.status).unwrap_or(ServingStatus::Unknown);
    println!("{service:?}: {}", status.as_str_name());

    if status != ServingStatus::Serving {
        bail!("service {service:?} is not serving");
    }
    Ok(())
}

async fn send(server_url: &str, messages: Vec<StreamAccessLogsMessage>) -> Result<()> {
    let count = messages.len();
    let mut client = AccessLogServiceClient::new(connect(server_url).await?);

    tracing::debug!(count, "Streaming access log messages");
    client
        .stream_access_logs(tokio_stream::iter(messages))
        .await
        .context("stream rejected by server")?;

    println!("Sent {count} message(s) to {server_url}");
    Ok(())
}

/// Builds `count` messages with one HTTP entry each. The first carries the identifier.
fn build_messages(
    path: &str,
    args_body: Option<&str>,
    field_key: &str,
    count: usize,
    log_name: &str,
) -> Vec<StreamAccessLogsMessage> {
    (0..count)
        .map(|i| {
            let identifier = (i == 0).then(|| Identifier {
                node: Some(Node {
                    id: "alsctl".to_string(),
                    ..Default::default()
                }),
                log_name: log_name.to_string(),
            });
            StreamAccessLogsMessage {
                identifier,
                log_entries: Some(LogEntries::HttpLogs(HttpAccessLogEntries {
                    log_entry: vec![http_entry(path, args_body, field_key)],
                })),
            }
        })
        .collect()
}

fn http_entry(path: &str, args_body: Option<&str>, field_key: &str) -> HttpAccessLogEntry {
    let mut filter_metadata = HashMap::new();
    if let Some(value) = args_body {
        let field = prost_types::Value {
            kind: Some(prost_types::value::Kind::StringValue(value.to_string())),
        };
        filter_metadata.insert(
            TRANSFORMATION_FILTER.to_string(),
            prost_types::Struct {
                fields: [(field_key.to_string(), field)].into_iter().collect(),
            },
        );
    }

    HttpAccessLogEntry {
        common_properties: Some(AccessLogCommon {
            start_time: Some(prost_types::Timestamp::from(std::time::SystemTime::now())),
            metadata: Some(Metadata { filter_metadata }),
            ..Default::default()
        }),
        request: Some(HttpRequestProperties {
            request_method: RequestMethod::Get as i32,
            path: path.to_string(),
            ..Default::default()
        }),
        response: Some(HttpResponseProperties {
            response_code: Some(200),
            ..Default::default()
        }),
        ..Default::default()
    }
}
