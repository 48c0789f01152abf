//! Resolver integration tests against an in-process artifact store
//!
//! An axum server on an ephemeral port serves `/v{version}/{file}` objects
//! from memory and counts the requests it receives.

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use chrono::NaiveDate;
use futures::StreamExt;
use dermai::{ModelResolver, RegistryConfig, RegistryError, RegistryEvent, ResolutionTier};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast::{self, error::TryRecvError};

// =============================================================================
// Test Artifact Store
// =============================================================================

#[derive(Clone)]
enum Object {
    Bytes(Vec<u8>),
    Status(StatusCode),
    /// Sends a first chunk, then aborts the body
    BrokenStream,
    /// Sends a first chunk, then goes silent for longer than any test timeout
    StalledStream,
    /// Declares a Content-Length larger than the body it sends
    ShortBody { declared: usize, sent: Vec<u8> },
}

#[derive(Clone)]
struct Store {
    objects: Arc<HashMap<String, Object>>,
    requests: Arc<AtomicUsize>,
}

async fn serve_object(State(store): State<Store>, Path(path): Path<String>) -> Response {
    store.requests.fetch_add(1, Ordering::SeqCst);

    match store.objects.get(&path) {
        Some(Object::Bytes(bytes)) => bytes.clone().into_response(),
        Some(Object::Status(status)) => (*status, "injected failure").into_response(),
        Some(Object::BrokenStream) => {
            let chunks = futures::stream::iter(vec![
                Ok(Bytes::from_static(b"partial weights")),
                Err(std::io::Error::other("connection dropped")),
            ]);
            Body::from_stream(chunks).into_response()
        }
        Some(Object::StalledStream) => {
            let first = futures::stream::once(async {
                Ok::<_, std::io::Error>(Bytes::from_static(b"partial weights"))
            });
            let stall = futures::stream::once(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(Bytes::from_static(b"too late"))
            });
            Body::from_stream(first.chain(stall)).into_response()
        }
        Some(Object::ShortBody { declared, sent }) => {
            // Streamed so the declared length is not replaced by the real one
            let body = futures::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from(
                sent.clone(),
            ))]);
            Response::builder()
                .header(header::CONTENT_LENGTH, *declared)
                .body(Body::from_stream(body))
                .unwrap()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

struct TestServer {
    base_url: String,
    requests: Arc<AtomicUsize>,
}

impl TestServer {
    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

async fn start_store(objects: Vec<(&str, Object)>) -> TestServer {
    let requests = Arc::new(AtomicUsize::new(0));
    let store = Store {
        objects: Arc::new(
            objects
                .into_iter()
                .map(|(path, object)| (path.to_string(), object))
                .collect(),
        ),
        requests: requests.clone(),
    };

    let app = Router::new()
        .route("/{*path}", get(serve_object))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{}/releases", addr),
        requests,
    }
}

fn weights() -> Object {
    Object::Bytes(vec![7u8; 64 * 1024])
}

fn labels(text: &str) -> Object {
    Object::Bytes(text.as_bytes().to_vec())
}

fn config_for(dir: &TempDir, server: &TestServer) -> RegistryConfig {
    let config = RegistryConfig {
        models_dir: dir.path().join("models"),
        local_dev_dir: dir.path().join("dev"),
        remote_base_url: server.base_url.clone(),
        connect_timeout_secs: 2,
        read_timeout_secs: 5,
        prefer_local_dev: false,
        ..Default::default()
    };
    config.validate().unwrap();
    config
}

/// Collect buffered events, skipping past any the receiver lagged behind on
fn drain(rx: &mut broadcast::Receiver<RegistryEvent>) -> Vec<RegistryEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    events
}

fn cache_entries(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_remote_download_registers_model() {
    let server = start_store(vec![
        ("releases/v2/dermai_model_v2.onnx", weights()),
        ("releases/v2/classes_v2.txt", labels("Melanoma\nNevus\nBasal Cell Carcinoma\n")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, &server);
    let resolver = ModelResolver::from_config(&config).unwrap();
    let mut rx = resolver.subscribe_events();

    let model = resolver.ensure_model_exists(2, false).await.unwrap();

    assert_eq!(model.tier, ResolutionTier::Remote);
    assert_eq!(model.class_names, vec!["Melanoma", "Nevus", "Basal Cell Carcinoma"]);
    assert_eq!(model.artifact_path, config.models_dir.join("dermai_model_v2.onnx"));
    assert_eq!(std::fs::metadata(&model.artifact_path).unwrap().len(), 64 * 1024);

    let info = resolver.get_model_info(2).await.unwrap();
    assert_eq!(info.record.path, model.artifact_path);
    assert_eq!(info.record.metadata.num_classes, 3);
    // No card published: training date and accuracy stay unknown
    assert_eq!(info.record.metadata.train_date, None);
    assert_eq!(info.record.metadata.accuracy, None);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        RegistryEvent::DownloadStarted { version: 2, file, total_bytes: Some(65536) }
            if file == "dermai_model_v2.onnx"
    )));
    assert!(events.contains(&RegistryEvent::Registered {
        version: 2,
        num_classes: 3,
        inserted: true,
    }));
}

#[tokio::test]
async fn test_cached_model_makes_no_requests() {
    let server = start_store(vec![
        ("releases/v1/dermai_model_v1.onnx", weights()),
        ("releases/v1/classes_v1.txt", labels("a\nb\n")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let resolver = ModelResolver::from_config(&config_for(&dir, &server)).unwrap();

    resolver.ensure_model_exists(1, false).await.unwrap();
    let after_download = server.request_count();
    assert!(after_download >= 2);

    let again = resolver.ensure_model_exists(1, false).await.unwrap();
    assert_eq!(again.tier, ResolutionTier::Cache);
    assert_eq!(server.request_count(), after_download);
    assert_eq!(resolver.list_models().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_model_card_is_fetched() {
    let server = start_store(vec![
        ("releases/v3/dermai_model_v3.onnx", weights()),
        ("releases/v3/classes_v3.txt", labels("a\nb\n")),
        (
            "releases/v3/model_card_v3.json",
            Object::Bytes(br#"{"train_date": "2025-08-25", "accuracy": 0.75}"#.to_vec()),
        ),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let resolver = ModelResolver::from_config(&config_for(&dir, &server)).unwrap();

    resolver.ensure_model_exists(3, false).await.unwrap();

    let info = resolver.get_model_info(3).await.unwrap();
    assert_eq!(info.record.metadata.train_date, NaiveDate::from_ymd_opt(2025, 8, 25));
    assert_eq!(info.record.metadata.accuracy, Some(0.75));
}

#[tokio::test]
async fn test_http_error_leaves_no_record_or_files() {
    let server = start_store(vec![
        ("releases/v4/dermai_model_v4.onnx", Object::Status(StatusCode::INTERNAL_SERVER_ERROR)),
        ("releases/v4/classes_v4.txt", labels("a\nb\n")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, &server);
    let resolver = ModelResolver::from_config(&config).unwrap();
    let mut rx = resolver.subscribe_events();

    let err = resolver.ensure_model_exists(4, false).await.unwrap_err();

    match &err {
        RegistryError::ModelUnavailable { version, cause } => {
            assert_eq!(*version, 4);
            assert!(cause.to_string().contains("500"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(resolver.list_models().await.unwrap().is_empty());
    assert!(cache_entries(&config.models_dir).is_empty());
    assert!(
        drain(&mut rx)
            .iter()
            .any(|e| matches!(e, RegistryEvent::DownloadFailed { version: 4, .. }))
    );
}

#[tokio::test]
async fn test_interrupted_body_leaves_no_partial_file() {
    let server = start_store(vec![
        ("releases/v5/dermai_model_v5.onnx", Object::BrokenStream),
        ("releases/v5/classes_v5.txt", labels("a\nb\n")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, &server);
    let resolver = ModelResolver::from_config(&config).unwrap();

    let err = resolver.ensure_model_exists(5, false).await.unwrap_err();

    assert!(matches!(err, RegistryError::ModelUnavailable { version: 5, .. }));
    assert!(cache_entries(&config.models_dir).is_empty());

    let err = resolver.get_model_info(5).await.unwrap_err();
    assert!(matches!(err, RegistryError::ModelNotFound(5)));
}

#[tokio::test]
async fn test_missing_version_is_unavailable() {
    let server = start_store(vec![]).await;
    let dir = TempDir::new().unwrap();
    let resolver = ModelResolver::from_config(&config_for(&dir, &server)).unwrap();

    let err = resolver.ensure_model_exists(9, false).await.unwrap_err();
    assert!(matches!(err, RegistryError::ModelUnavailable { version: 9, .. }));
}

#[tokio::test]
async fn test_local_dev_preferred_over_remote() {
    let server = start_store(vec![
        ("releases/v1/dermai_model_v1.onnx", weights()),
        ("releases/v1/classes_v1.txt", labels("a\nb\n")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, &server);
    std::fs::create_dir_all(&config.local_dev_dir).unwrap();
    std::fs::write(config.local_dev_dir.join("dermai_model_v1.onnx"), b"dev weights").unwrap();
    std::fs::write(config.local_dev_dir.join("classes_v1.txt"), "a\nb\nc\nd\ne\n").unwrap();
    let resolver = ModelResolver::from_config(&config).unwrap();

    let model = resolver.ensure_model_exists(1, true).await.unwrap();

    assert_eq!(model.tier, ResolutionTier::LocalDev);
    assert_eq!(model.num_classes(), 5);
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn test_stalled_body_times_out_without_partial_file() {
    let server = start_store(vec![
        ("releases/v6/dermai_model_v6.onnx", Object::StalledStream),
        ("releases/v6/classes_v6.txt", labels("a\nb\n")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let config = RegistryConfig {
        read_timeout_secs: 1,
        ..config_for(&dir, &server)
    };
    let resolver = ModelResolver::from_config(&config).unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(15),
        resolver.ensure_model_exists(6, false),
    )
    .await
    .expect("read timeout should end the download")
    .unwrap_err();

    match &err {
        RegistryError::ModelUnavailable { version, cause } => {
            assert_eq!(*version, 6);
            assert!(matches!(**cause, RegistryError::DownloadFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cache_entries(&config.models_dir).is_empty());
    assert!(resolver.list_models().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_short_body_is_rejected_without_partial_file() {
    let server = start_store(vec![
        (
            "releases/v7/dermai_model_v7.onnx",
            Object::ShortBody {
                declared: 64 * 1024,
                sent: vec![7u8; 1024],
            },
        ),
        ("releases/v7/classes_v7.txt", labels("a\nb\n")),
    ])
    .await;
    let dir = TempDir::new().unwrap();
    let config = config_for(&dir, &server);
    let resolver = ModelResolver::from_config(&config).unwrap();

    let err = tokio::time::timeout(
        Duration::from_secs(15),
        resolver.ensure_model_exists(7, false),
    )
    .await
    .expect("short body should fail the download")
    .unwrap_err();

    match &err {
        RegistryError::ModelUnavailable { version, cause } => {
            assert_eq!(*version, 7);
            assert!(matches!(**cause, RegistryError::DownloadFailed { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(cache_entries(&config.models_dir).is_empty());
    assert!(resolver.get_model_info(7).await.is_err());
}
