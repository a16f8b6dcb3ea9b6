//! Integration tests for the HTTP trigger surface.
//!
//! Each test spins up an Axum server on a random port backed by a real
//! run worker and exercises the REST contract with reqwest.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use bill_inbox::channels::discord::{DiscordConfig, DiscordNotifier};
use bill_inbox::config::ExtractionConfig;
use bill_inbox::extraction::BillExtractor;
use bill_inbox::pipeline::{InboxProcessor, spawn_run_worker};
use bill_inbox::server::inbox_routes;

use common::{MemoryMailbox, StubLlm};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

struct TestServer {
    port: u16,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

/// Start the trigger server on a random port with the given mailbox.
async fn start_server(mailbox: Arc<MemoryMailbox>, capacity: usize) -> TestServer {
    let sink = DiscordNotifier::new(DiscordConfig {
        webhook_url: "http://127.0.0.1:9/unused".to_string().into(),
        username: "Bill".into(),
        split_ways: 2,
    });
    let processor = Arc::new(InboxProcessor::new(
        mailbox,
        BillExtractor::new(Arc::new(StubLlm::new("[]")), ExtractionConfig::default()),
        Arc::new(sink),
    ));

    let cancel = CancellationToken::new();
    let (queue, worker) = spawn_run_worker(processor, capacity, cancel.clone());
    let app = inbox_routes(queue);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        port,
        cancel,
        worker,
    }
}

async fn post_inbox(port: u16) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/inbox"))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn health_reports_service_name() {
    let server = start_server(Arc::new(MemoryMailbox::new(vec![])), 4).await;

    let body: Value = reqwest::get(format!("http://127.0.0.1:{}/health", server.port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "bill-inbox");
}

#[tokio::test]
async fn trigger_is_accepted_and_run_executes() {
    let mailbox = Arc::new(MemoryMailbox::gated());
    let server = start_server(Arc::clone(&mailbox), 4).await;

    let (status, body) = post_inbox(server.port).await;
    assert_eq!(status, 202);
    assert_eq!(body["status"], "queued");
    assert!(body["requested_at"].is_string());

    timeout(TEST_TIMEOUT, mailbox.wait_started())
        .await
        .expect("run never started");
    mailbox.release();
    assert_eq!(mailbox.fetch_count(), 1);
}

#[tokio::test]
async fn full_queue_returns_service_unavailable() {
    let mailbox = Arc::new(MemoryMailbox::gated());
    let server = start_server(Arc::clone(&mailbox), 1).await;

    // First trigger occupies the worker, second fills the queue.
    let (first, _) = post_inbox(server.port).await;
    assert_eq!(first, 202);
    timeout(TEST_TIMEOUT, mailbox.wait_started())
        .await
        .expect("run never started");
    let (second, _) = post_inbox(server.port).await;
    assert_eq!(second, 202);

    let (third, body) = post_inbox(server.port).await;
    assert_eq!(third, 503);
    assert_eq!(body["error"], "Run queue is full");

    mailbox.release();
    timeout(TEST_TIMEOUT, mailbox.wait_started())
        .await
        .expect("queued run never started");
    mailbox.release();
}

#[tokio::test]
async fn stopped_worker_returns_service_unavailable() {
    let server = start_server(Arc::new(MemoryMailbox::new(vec![])), 4).await;

    server.cancel.cancel();
    timeout(TEST_TIMEOUT, server.worker)
        .await
        .expect("worker did not stop")
        .unwrap();

    let (status, body) = post_inbox(server.port).await;
    assert_eq!(status, 503);
    assert_eq!(body["error"], "Run worker has stopped");
}
