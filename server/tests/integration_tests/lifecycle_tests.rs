//! Integration tests for startup and shutdown.

use super::common::{client, http_entry, http_message, start_server};
use accesslogger::callback::CallbackList;
use accesslogger::error::ServerError;
use accesslogger::grpc::AccessLogServiceImpl;
use accesslogger::health::{HealthProbe, ServingState};
use accesslogger::lifecycle::{self, LifecycleState};
use accesslogger::stats::IngestStats;
use shared::envoy::service::accesslog::v2::access_log_service_client::AccessLogServiceClient;
use tonic::transport::Channel;
use shared::metadata::MetadataLookup;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

fn service() -> AccessLogServiceImpl {
    AccessLogServiceImpl::new(
        CallbackList::default(),
        MetadataLookup::default(),
        Arc::new(IngestStats::new()),
    )
}

#[tokio::test]
async fn test_open_stream_ends_on_stop() {
    let mut server = start_server().await;
    let mut client = client(server.addr).await;

    let (sender, receiver) = tokio::sync::mpsc::channel(4);
    let call = tokio::spawn(async move {
        client
            .stream_access_logs(tokio_stream::wrappers::ReceiverStream::new(receiver))
            .await
    });

    sender
        .send(http_message(vec![http_entry("/open", Some("v"))]))
        .await
        .unwrap();
    assert_eq!(server.next_record().await.path, "/open");

    server.handle.stop().await;

    // The client still holds the sender open; the server must not wait for it.
    let finished = tokio::time::timeout(Duration::from_secs(5), server.task).await;
    assert!(finished.is_ok(), "serving did not return after stop");
    assert_eq!(server.handle.state(), LifecycleState::Stopped);

    drop(sender);
    let _ = tokio::time::timeout(Duration::from_secs(5), call).await;
}

#[tokio::test]
async fn test_no_stream_is_processed_after_stop() {
    let mut server = start_server().await;
    let entries_before = server.stats.snapshot().http_entries;

    assert!(server.handle.stop().await);

    let addr = server.addr;
    let attempt = tokio::time::timeout(Duration::from_secs(5), async move {
        let channel = Channel::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect()
            .await
            .map_err(|e| e.to_string())?;
        let sent: Result<(), String> = AccessLogServiceClient::new(channel)
            .stream_access_logs(tokio_stream::iter(vec![http_message(vec![http_entry(
                "/late",
                Some("late"),
            )])]))
            .await
            .map(|_| ())
            .map_err(|status| status.to_string());
        sent
    })
    .await;

    // Refused, timed out, or answered: either way nothing reached the callbacks.
    drop(attempt);
    assert_eq!(server.stats.snapshot().http_entries, entries_before);
    assert!(server.records.try_recv().is_err());

    let finished = tokio::time::timeout(Duration::from_secs(5), server.task).await;
    assert!(finished.is_ok(), "serving did not return after stop");
}

#[tokio::test]
async fn test_stop_marks_health_not_serving_before_returning() {
    let server = start_server().await;
    assert_eq!(server.probe.current_status(), ServingState::Serving);

    assert!(server.handle.stop().await);
    assert_eq!(server.probe.current_status(), ServingState::NotServing);
    assert!(!server.handle.stop().await);

    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_stops_initiate_once() {
    let server = start_server().await;

    let stops: Vec<_> = (0..8)
        .map(|_| {
            let handle = server.handle.clone();
            tokio::spawn(async move { handle.stop().await })
        })
        .collect();

    let mut initiated = 0;
    for stop in stops {
        if stop.await.unwrap() {
            initiated += 1;
        }
    }

    assert_eq!(initiated, 1);
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_run_fails_when_port_is_taken() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();
    let probe = HealthProbe::new("AccessLog");

    let result = lifecycle::run(
        CancellationToken::new(),
        addr,
        service(),
        probe.clone(),
        Duration::from_millis(200),
    )
    .await;

    assert!(matches!(result, Err(ServerError::Bind { .. })));
    assert_eq!(probe.current_status(), ServingState::NotServing);
}

#[tokio::test]
async fn test_run_stops_on_external_cancellation() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let ctx = CancellationToken::new();
    let probe = HealthProbe::new("AccessLog");
    let running = tokio::spawn(lifecycle::run(
        ctx.clone(),
        addr,
        service(),
        probe.clone(),
        Duration::from_millis(200),
    ));

    while probe.current_status() != ServingState::Serving {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    ctx.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("run did not return after cancellation")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(probe.current_status(), ServingState::NotServing);
}
