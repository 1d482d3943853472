//! Shared helpers for integration tests.

use accesslogger::callback::{AccessLogCallback, CallbackList, FailurePolicy};
use accesslogger::context::EntryContext;
use accesslogger::error::{CallbackError, ServerError};
use accesslogger::grpc::AccessLogServiceImpl;
use accesslogger::health::{HealthProbe, ServingState};
use accesslogger::lifecycle::{self, ServerHandle};
use accesslogger::sinks::ChannelCallback;
use accesslogger::stats::IngestStats;
use async_trait::async_trait;
use shared::envoy::api::v2::core::{Metadata, Node};
use shared::envoy::data::accesslog::v2::{
    AccessLogCommon, HttpAccessLogEntry, HttpRequestProperties, HttpResponseProperties,
};
use shared::envoy::service::accesslog::v2::access_log_service_client::AccessLogServiceClient;
use shared::envoy::service::accesslog::v2::stream_access_logs_message::{
    HttpAccessLogEntries, Identifier, LogEntries,
};
use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;
use shared::metadata::MetadataLookup;
use shared::models::AccessLogRecord;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

/// Name the test servers report health under.
pub const SERVICE_NAME: &str = "AccessLog";

/// A server running in the background.
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub probe: HealthProbe,
    pub stats: Arc<IngestStats>,
    pub records: mpsc::Receiver<AccessLogRecord>,
    pub task: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Stops the server and waits for serving to return.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        self.handle.stop().await;
        self.task.await.unwrap()
    }

    /// Waits for the next record delivered to the channel sink.
    pub async fn next_record(&mut self) -> AccessLogRecord {
        tokio::time::timeout(Duration::from_secs(5), self.records.recv())
            .await
            .expect("timed out waiting for a record")
            .expect("record channel closed")
    }
}

/// Always fails, recording how often it was called.
pub struct FailingCallback {
    pub calls: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl AccessLogCallback for FailingCallback {
    fn name(&self) -> &str {
        "failing"
    }

    async fn handle(
        &self,
        _ctx: &EntryContext<'_>,
        _message: &StreamAccessLogsMessage,
    ) -> Result<(), CallbackError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Err(CallbackError::Rejected {
            sink: "failing".to_string(),
            reason: "always fails".to_string(),
        })
    }
}

/// Starts a server whose callbacks are `before`, then a channel sink.
pub async fn start_server_with(
    policy: FailurePolicy,
    field_key: &str,
    before: Vec<Arc<dyn AccessLogCallback>>,
) -> TestServer {
    let (channel, records) = ChannelCallback::new("channel", 64);
    let mut callbacks = before;
    callbacks.push(Arc::new(channel));

    let stats = Arc::new(IngestStats::new());
    let probe = HealthProbe::new(SERVICE_NAME);
    let service = AccessLogServiceImpl::new(
        CallbackList::new(callbacks),
        MetadataLookup::transformation(field_key),
        Arc::clone(&stats),
    )
    .with_failure_policy(policy);

    let server = lifecycle::start("127.0.0.1:0".parse().unwrap(), service, probe.clone())
        .await
        .unwrap()
        .with_shutdown_grace(Duration::from_millis(500));
    let addr = server.local_addr();
    let handle = server.handle();
    let task = tokio::spawn(server.serve());
    wait_until_serving(&probe).await;

    TestServer {
        addr,
        handle,
        probe,
        stats,
        records,
        task,
    }
}

/// Waits until the spawned serve task has published SERVING.
pub async fn wait_until_serving(probe: &HealthProbe) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while probe.current_status() != ServingState::Serving {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server did not reach SERVING");
}

/// Starts a server correlating `args_body` with the default failure policy.
pub async fn start_server() -> TestServer {
    start_server_with(FailurePolicy::Continue, "args_body", Vec::new()).await
}

/// Opens a channel to the server.
pub async fn channel(addr: SocketAddr) -> Channel {
    Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

/// Opens an access log client to the server.
pub async fn client(addr: SocketAddr) -> AccessLogServiceClient<Channel> {
    AccessLogServiceClient::new(channel(addr).await)
}

/// An HTTP entry for `path` whose transformation metadata carries `args_body`.
pub fn http_entry(path: &str, args_body: Option<&str>) -> HttpAccessLogEntry {
    let filter_metadata = args_body
        .map(|value| {
            let fields = [(
                "args_body".to_string(),
                prost_types::Value {
                    kind: Some(prost_types::value::Kind::StringValue(value.to_string())),
                },
            )];
            HashMap::from([(
                "io.solo.transformation".to_string(),
                prost_types::Struct {
                    fields: fields.into_iter().collect(),
                },
            )])
        })
        .unwrap_or_default();

    HttpAccessLogEntry {
        common_properties: Some(AccessLogCommon {
            metadata: Some(Metadata { filter_metadata }),
            upstream_cluster: "backend".to_string(),
            ..Default::default()
        }),
        request: Some(HttpRequestProperties {
            path: path.to_string(),
            authority: "example.com".to_string(),
            ..Default::default()
        }),
        response: Some(HttpResponseProperties {
            response_code: Some(200),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A message carrying the given HTTP entries.
pub fn http_message(entries: Vec<HttpAccessLogEntry>) -> StreamAccessLogsMessage {
    StreamAccessLogsMessage {
        identifier: None,
        log_entries: Some(LogEntries::HttpLogs(HttpAccessLogEntries {
            log_entry: entries,
        })),
    }
}

/// The identifier Envoy sends on the first message of a stream.
pub fn identifier(log_name: &str) -> Identifier {
    Identifier {
        node: Some(Node {
            id: "gateway-proxy".to_string(),
            cluster: "gateway".to_string(),
            ..Default::default()
        }),
        log_name: log_name.to_string(),
    }
}
