//! Mock HTTP tests for the upload client and the background worker.
//!
//! These tests cover:
//! - Multipart wire format and authentication header
//! - Error classification (HTTP status, connection, timeout)
//! - Retry schedule bounds
//! - Worker FIFO processing, stats, reconfiguration and shutdown modes

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use photobooth::upload::{
    UploadCallbacks, UploadClient, UploadError, UploadJob, UploadPolicy, UploadWorker,
};

fn test_policy(url: String) -> UploadPolicy {
    UploadPolicy {
        url,
        api_key: "test-key".to_string(),
        timeout: Duration::from_secs(5),
        retry_count: 2,
        retry_delay: Duration::from_millis(20),
    }
}

fn fake_jpeg() -> Bytes {
    // ASCII stand-in keeps the multipart body matchable as text
    Bytes::from_static(b"not-really-a-jpeg")
}

// === Wire Format Tests ===

#[tokio::test]
async fn test_upload_sends_multipart_fields_and_api_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header("X-API-Key", "test-key"))
        .and(body_string_contains("name=\"photo\""))
        .and(body_string_contains("filename=\"shot.jpg\""))
        .and(body_string_contains("image/jpeg"))
        .and(body_string_contains("name=\"timestamp\""))
        .and(body_string_contains("name=\"source\""))
        .and(body_string_contains("photobooth"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = UploadClient::new(test_policy(format!("{}/upload", mock_server.uri()))).unwrap();
    let result = client.upload_once(&fake_jpeg(), "shot.jpg").await;

    assert_eq!(result.unwrap(), 200);
}

#[tokio::test]
async fn test_no_api_key_header_when_unconfigured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut policy = test_policy(format!("{}/upload", mock_server.uri()));
    policy.api_key = String::new();
    let client = UploadClient::new(policy).unwrap();
    client.upload_once(&fake_jpeg(), "shot.jpg").await.unwrap();

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("X-API-Key").is_none());
}

// === Error Classification Tests ===

#[tokio::test]
async fn test_http_error_carries_status_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&mock_server)
        .await;

    let client = UploadClient::new(test_policy(format!("{}/upload", mock_server.uri()))).unwrap();
    let error = client.upload_once(&fake_jpeg(), "shot.jpg").await.unwrap_err();

    match error {
        UploadError::Http { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "busy");
        }
        other => panic!("Expected Http error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_error_classified() {
    // Nothing listens on port 1
    let mut policy = test_policy("http://127.0.0.1:1/upload".to_string());
    policy.timeout = Duration::from_secs(2);
    let client = UploadClient::new(policy).unwrap();

    let error = client.upload_once(&fake_jpeg(), "shot.jpg").await.unwrap_err();
    assert!(
        matches!(error, UploadError::Connection(_) | UploadError::Timeout(_)),
        "Expected Connection or Timeout, got {:?}",
        error
    );
}

#[tokio::test]
async fn test_timeout_classified() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&mock_server)
        .await;

    let mut policy = test_policy(format!("{}/upload", mock_server.uri()));
    policy.timeout = Duration::from_millis(100);
    let client = UploadClient::new(policy).unwrap();

    let error = client.upload_once(&fake_jpeg(), "shot.jpg").await.unwrap_err();
    assert!(matches!(error, UploadError::Timeout(_)));
}

// === Retry Schedule Tests ===

#[tokio::test]
async fn test_retry_count_bounds_attempts() {
    let mock_server = MockServer::start().await;

    // retry_count = 2 means exactly 3 attempts, then give up
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let client = UploadClient::new(test_policy(format!("{}/upload", mock_server.uri()))).unwrap();
    let mut job = UploadJob::new(fake_jpeg(), "shot.jpg".to_string());
    let outcome = client.run_job(&mut job).await;

    assert!(!outcome.success);
    assert_eq!(job.attempts, 3);
    assert_eq!(outcome.status, Some(500));
    assert!(outcome.error.unwrap().contains("after 3 attempts"));
}

#[tokio::test]
async fn test_failure_then_success_stops_retrying() {
    let mock_server = MockServer::start().await;

    // First attempt fails, second succeeds, no third attempt
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(2)
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = UploadClient::new(test_policy(format!("{}/upload", mock_server.uri()))).unwrap();
    let mut job = UploadJob::new(fake_jpeg(), "shot.jpg".to_string());
    let outcome = client.run_job(&mut job).await;

    assert!(outcome.success);
    assert_eq!(job.attempts, 2);
    assert_eq!(outcome.status, Some(200));
}

// === Worker Tests ===

#[tokio::test]
async fn test_worker_processes_jobs_in_order() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&mock_server)
        .await;

    let completed = Arc::new(Mutex::new(Vec::new()));
    let completed_cb = Arc::clone(&completed);
    let mut worker = UploadWorker::spawn(
        test_policy(format!("{}/upload", mock_server.uri())),
        UploadCallbacks {
            on_success: Some(Arc::new(move |outcome| {
                completed_cb.lock().unwrap().push(outcome.filename.clone());
            })),
            on_error: None,
        },
    );

    worker.enqueue(fake_jpeg(), "a.jpg".to_string());
    worker.enqueue(fake_jpeg(), "b.jpg".to_string());
    worker.enqueue(fake_jpeg(), "c.jpg".to_string());
    worker.shutdown(true).await;

    assert_eq!(*completed.lock().unwrap(), vec!["a.jpg", "b.jpg", "c.jpg"]);
    let stats = worker.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.successful, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_worker_counts_failed_jobs() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut worker = UploadWorker::spawn(
        test_policy(format!("{}/upload", mock_server.uri())),
        UploadCallbacks::default(),
    );
    worker.enqueue(fake_jpeg(), "a.jpg".to_string());
    worker.shutdown(true).await;

    let stats = worker.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.successful, 0);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_callbacks_split_by_outcome() {
    let mock_server = MockServer::start().await;

    // First job lands, second exhausts its attempts
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    let succeeded = Arc::new(Mutex::new(Vec::new()));
    let failed = Arc::new(Mutex::new(Vec::new()));
    let succeeded_cb = Arc::clone(&succeeded);
    let failed_cb = Arc::clone(&failed);
    let mut worker = UploadWorker::spawn(
        test_policy(format!("{}/upload", mock_server.uri())),
        UploadCallbacks {
            on_success: Some(Arc::new(move |outcome| {
                succeeded_cb.lock().unwrap().push(outcome.filename.clone());
            })),
            on_error: Some(Arc::new(move |outcome| {
                failed_cb.lock().unwrap().push(outcome.filename.clone());
            })),
        },
    );

    worker.enqueue(fake_jpeg(), "a.jpg".to_string());
    worker.enqueue(fake_jpeg(), "b.jpg".to_string());
    worker.shutdown(true).await;

    assert_eq!(*succeeded.lock().unwrap(), vec!["a.jpg"]);
    assert_eq!(*failed.lock().unwrap(), vec!["b.jpg"]);
}

#[tokio::test]
async fn test_reconfigure_keeps_queue_and_switches_endpoint() {
    let old_server = MockServer::start().await;
    let new_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&old_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&new_server)
        .await;

    let mut worker = UploadWorker::spawn(
        test_policy(format!("{}/upload", old_server.uri())),
        UploadCallbacks::default(),
    );
    worker.enqueue(fake_jpeg(), "a.jpg".to_string());

    // Wait for the first job to land on the old endpoint
    for _ in 0..100 {
        if worker.stats().successful == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(worker.stats().successful, 1);

    worker.reconfigure(test_policy(format!("{}/upload", new_server.uri())));
    worker.enqueue(fake_jpeg(), "b.jpg".to_string());
    worker.shutdown(true).await;

    let stats = worker.stats();
    assert_eq!(stats.successful, 2);
}

#[tokio::test]
async fn test_shutdown_without_drain_abandons_queued_jobs() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&mock_server)
        .await;

    let mut worker = UploadWorker::spawn(
        test_policy(format!("{}/upload", mock_server.uri())),
        UploadCallbacks::default(),
    );
    for name in ["a.jpg", "b.jpg", "c.jpg", "d.jpg"] {
        worker.enqueue(fake_jpeg(), name.to_string());
    }

    // Let the first job get in flight, then bail out
    tokio::time::sleep(Duration::from_millis(50)).await;
    worker.shutdown(false).await;

    let stats = worker.stats();
    assert_eq!(stats.total, 4);
    assert!(stats.successful <= 1, "queued jobs should be abandoned");
    assert_eq!(stats.successful + stats.failed, 4);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let mock_server = MockServer::start().await;
    let mut worker = UploadWorker::spawn(
        test_policy(format!("{}/upload", mock_server.uri())),
        UploadCallbacks::default(),
    );
    worker.shutdown(true).await;
    worker.shutdown(true).await;
    assert_eq!(worker.stats().total, 0);
}

#[tokio::test]
async fn test_upload_sync_shares_stats_and_retry_path() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut worker = UploadWorker::spawn(
        test_policy(format!("{}/upload", mock_server.uri())),
        UploadCallbacks::default(),
    );
    let outcome = worker
        .upload_sync(fake_jpeg(), "direct.jpg".to_string())
        .await;

    assert!(outcome.success);
    assert_eq!(outcome.status, Some(200));
    let stats = worker.stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.successful, 1);
    worker.shutdown(true).await;
}
