//! Integration tests for access log streams.

use super::common::{
    client, http_entry, http_message, identifier, start_server, start_server_with,
    FailingCallback,
};
use accesslogger::callback::{AccessLogCallback, FailurePolicy};
use shared::envoy::service::accesslog::v2::stream_access_logs_message::{
    LogEntries, TcpAccessLogEntries,
};
use shared::envoy::service::accesslog::v2::StreamAccessLogsMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tonic::Code;

#[tokio::test]
async fn test_entries_are_correlated_in_order() {
    let mut server = start_server().await;
    let mut client = client(server.addr).await;

    let mut first = http_message(vec![
        http_entry("/one", Some("first")),
        http_entry("/two", Some("second")),
    ]);
    first.identifier = Some(identifier("example"));
    let second = http_message(vec![http_entry("/three", Some("third"))]);

    client
        .stream_access_logs(tokio_stream::iter(vec![first, second]))
        .await
        .unwrap();

    for (path, value) in [("/one", "first"), ("/two", "second"), ("/three", "third")] {
        let record = server.next_record().await;
        assert_eq!(record.path, path);
        assert_eq!(record.correlated_value, value);
        assert_eq!(record.response_code, Some(200));
        assert_eq!(record.upstream_cluster, "backend");
    }

    let stats = server.stats.snapshot();
    assert_eq!(stats.messages_received, 2);
    assert_eq!(stats.http_entries, 3);
    assert_eq!(stats.stream_errors, 0);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_metadata_correlates_to_empty_string() {
    let mut server = start_server().await;
    let mut client = client(server.addr).await;

    client
        .stream_access_logs(tokio_stream::iter(vec![http_message(vec![http_entry(
            "/plain", None,
        )])]))
        .await
        .unwrap();

    let record = server.next_record().await;
    assert_eq!(record.path, "/plain");
    assert_eq!(record.correlated_value, "");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_field_key_correlates_to_empty_string() {
    let mut server = start_server_with(FailurePolicy::Continue, "missing_key", Vec::new()).await;
    let mut client = client(server.addr).await;

    client
        .stream_access_logs(tokio_stream::iter(vec![http_message(vec![http_entry(
            "/foo",
            Some("foo"),
        )])]))
        .await
        .unwrap();

    assert_eq!(server.next_record().await.correlated_value, "");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_tcp_and_empty_messages_are_ignored() {
    let mut server = start_server().await;
    let mut client = client(server.addr).await;

    let tcp = StreamAccessLogsMessage {
        identifier: Some(identifier("tcp")),
        log_entries: Some(LogEntries::TcpLogs(TcpAccessLogEntries::default())),
    };
    let messages = vec![
        tcp,
        StreamAccessLogsMessage::default(),
        http_message(vec![http_entry("/after", Some("x"))]),
    ];

    client
        .stream_access_logs(tokio_stream::iter(messages))
        .await
        .unwrap();

    assert_eq!(server.next_record().await.path, "/after");
    let stats = server.stats.snapshot();
    assert_eq!(stats.messages_received, 3);
    assert_eq!(stats.messages_ignored, 2);
    assert_eq!(stats.http_entries, 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_stream_succeeds() {
    let server = start_server().await;
    let mut client = client(server.addr).await;

    client
        .stream_access_logs(tokio_stream::iter(Vec::<StreamAccessLogsMessage>::new()))
        .await
        .unwrap();

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_callback_does_not_block_siblings() {
    let calls = Arc::new(AtomicUsize::new(0));
    let failing: Arc<dyn AccessLogCallback> = Arc::new(FailingCallback {
        calls: Arc::clone(&calls),
    });
    let mut server = start_server_with(FailurePolicy::Continue, "args_body", vec![failing]).await;
    let mut client = client(server.addr).await;

    client
        .stream_access_logs(tokio_stream::iter(vec![http_message(vec![
            http_entry("/a", Some("a")),
            http_entry("/b", Some("b")),
        ])]))
        .await
        .unwrap();

    assert_eq!(server.next_record().await.path, "/a");
    assert_eq!(server.next_record().await.path, "/b");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(server.stats.snapshot().callback_failures, 2);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_abort_policy_ends_stream_with_aborted() {
    let calls = Arc::new(AtomicUsize::new(0));
    let failing: Arc<dyn AccessLogCallback> = Arc::new(FailingCallback {
        calls: Arc::clone(&calls),
    });
    let mut server = start_server_with(FailurePolicy::Abort, "args_body", vec![failing]).await;
    let mut client = client(server.addr).await;

    let status = client
        .stream_access_logs(tokio_stream::iter(vec![http_message(vec![
            http_entry("/a", Some("a")),
            http_entry("/b", Some("b")),
        ])]))
        .await
        .unwrap_err();

    assert_eq!(status.code(), Code::Aborted);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(server.records.try_recv().is_err());
    assert_eq!(server.stats.snapshot().stream_errors, 1);

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_streams_are_all_delivered() {
    let mut server = start_server().await;

    let mut calls = Vec::new();
    for stream in 0..4 {
        let mut client = client(server.addr).await;
        calls.push(tokio::spawn(async move {
            let messages: Vec<_> = (0..5)
                .map(|i| {
                    let path = format!("/{stream}/{i}");
                    http_message(vec![http_entry(&path, Some("v"))])
                })
                .collect();
            client
                .stream_access_logs(tokio_stream::iter(messages))
                .await
        }));
    }
    for call in calls {
        call.await.unwrap().unwrap();
    }

    let mut paths = Vec::new();
    for _ in 0..20 {
        paths.push(server.next_record().await.path);
    }

    for stream in 0..4 {
        let ordered: Vec<_> = paths
            .iter()
            .filter(|p| p.starts_with(&format!("/{stream}/")))
            .cloned()
            .collect();
        let expected: Vec<_> = (0..5).map(|i| format!("/{stream}/{i}")).collect();
        assert_eq!(ordered, expected);
    }
    assert_eq!(server.stats.snapshot().streams_opened, 4);

    server.shutdown().await.unwrap();
}
