//! Fetch and verification behavior against mock HTTP servers

use httpmock::prelude::*;
use kiln_hash::{Algorithm, Digest};
use kiln_net::{fetch_artifact, NetClient, NetConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const BODY: &[u8] = b"pretend this is a source tarball";

fn fast_client(retry_count: u32) -> NetClient {
    NetClient::new(NetConfig {
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        retry_count,
        retry_delay: Duration::from_millis(10),
        ..NetConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn download_verifies_and_lands_at_dest() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/pkg-1.0.tar.gz");
            then.status(200).body(BODY);
        })
        .await;

    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("pkg-1.0.tar.gz");
    let expected = Digest::of_data(Algorithm::Sha256, BODY);
    let (tx, mut rx) = kiln_events::channel();

    let client = fast_client(0);
    let result = fetch_artifact(&client, &server.url("/pkg-1.0.tar.gz"), &dest, &expected, &tx)
        .await
        .unwrap();

    assert_eq!(result.size, BODY.len() as u64);
    assert_eq!(result.digest, expected);
    assert!(dest.exists());
    assert!(!dest.with_extension("download").exists());
    mock.assert_hits_async(1).await;

    // Events arrive in lifecycle order
    drop(tx);
    let mut kinds = Vec::new();
    while let Some(event) = rx.recv().await {
        if let kiln_events::AppEvent::Fetch(fetch) = event {
            kinds.push(match fetch {
                kiln_events::FetchEvent::Started { .. } => "started",
                kiln_events::FetchEvent::Progress { .. } => "progress",
                kiln_events::FetchEvent::Verifying { .. } => "verifying",
                kiln_events::FetchEvent::Completed { .. } => "completed",
                kiln_events::FetchEvent::Failed { .. } => "failed",
            });
        }
    }
    assert_eq!(kinds.first(), Some(&"started"));
    assert_eq!(kinds.last(), Some(&"completed"));
    assert!(kinds.contains(&"verifying"));
    assert!(!kinds.contains(&"failed"));
}

#[tokio::test]
async fn tampered_artifact_fails_checksum_and_leaves_nothing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/pkg.tar.gz");
            then.status(200).body(b"tampered bytes");
        })
        .await;

    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("pkg.tar.gz");
    let expected = Digest::of_data(Algorithm::Sha256, BODY);
    let (tx, _rx) = kiln_events::channel();

    let client = fast_client(0);
    let err = fetch_artifact(&client, &server.url("/pkg.tar.gz"), &dest, &expected, &tx)
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 4);
    assert!(!dest.exists());
    assert!(!dest.with_extension("download").exists());
}

#[tokio::test]
async fn client_errors_fail_without_retry() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/missing.tar.gz");
            then.status(404);
        })
        .await;

    let temp = tempfile::tempdir().unwrap();
    let expected = Digest::of_data(Algorithm::Sha256, BODY);
    let (tx, _rx) = kiln_events::channel();

    let client = fast_client(3);
    let err = fetch_artifact(
        &client,
        &server.url("/missing.tar.gz"),
        &temp.path().join("missing.tar.gz"),
        &expected,
        &tx,
    )
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 3);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky.tar.gz");
            then.status(500);
        })
        .await;

    let temp = tempfile::tempdir().unwrap();
    let expected = Digest::of_data(Algorithm::Sha256, BODY);
    let (tx, _rx) = kiln_events::channel();

    let client = fast_client(2);
    let err = fetch_artifact(
        &client,
        &server.url("/flaky.tar.gz"),
        &temp.path().join("flaky.tar.gz"),
        &expected,
        &tx,
    )
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 3);
    // Initial attempt plus two retries
    mock.assert_hits_async(3).await;
}

/// Minimal HTTP server that fails the first `failures` requests with 500
/// and then serves `body`. httpmock cannot express per-request response
/// sequences, which this scenario needs.
async fn flaky_server(
    failures: usize,
    body: &'static [u8],
) -> (std::net::SocketAddr, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let attempt = counter.fetch_add(1, Ordering::SeqCst);

            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;

            let response = if attempt < failures {
                b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    .to_vec()
            } else {
                let mut head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                )
                .into_bytes();
                head.extend_from_slice(body);
                head
            };
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        }
    });

    (addr, hits)
}

#[tokio::test]
async fn fetch_succeeds_after_exactly_two_retries() {
    let (addr, hits) = flaky_server(2, BODY).await;

    let temp = tempfile::tempdir().unwrap();
    let dest = temp.path().join("pkg.tar.gz");
    let expected = Digest::of_data(Algorithm::Sha256, BODY);
    let (tx, _rx) = kiln_events::channel();

    let client = fast_client(3);
    let result = fetch_artifact(
        &client,
        &format!("http://{addr}/pkg.tar.gz"),
        &dest,
        &expected,
        &tx,
    )
    .await
    .unwrap();

    assert_eq!(result.size, BODY.len() as u64);
    assert!(dest.exists());
    // Two failed attempts, then the one that succeeded
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}
