use super::handlers::BOUNDARY;
use super::server::{StreamServer, StreamServerBuilder};
use crate::{
    access::StreamAccess,
    config::{CameraConfig, ServerConfig},
    manager::WorkerManager,
    publisher::FramePublisher,
    registry::InMemoryCameraRegistry,
    source::MockSourceOpener,
    test_support::{scripted_detector, test_context, wait_until},
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct TestServer {
    server: StreamServer,
    router: Router,
    manager: Arc<WorkerManager>,
    opener: MockSourceOpener,
}

fn server_config() -> ServerConfig {
    ServerConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        stream_keepalive_ms: 100,
        cors_allow_any: true,
    }
}

fn test_server(cameras: Vec<CameraConfig>) -> TestServer {
    let opener = MockSourceOpener::new();
    let registry = Arc::new(InMemoryCameraRegistry::with_cameras(cameras).unwrap());
    let manager = Arc::new(WorkerManager::new(
        test_context(&opener, scripted_detector()),
        Arc::new(FramePublisher::new()),
    ));
    let access = StreamAccess::new(registry, Arc::clone(&manager));

    let server = StreamServerBuilder::new()
        .config(server_config())
        .access(access)
        .build()
        .unwrap();

    TestServer {
        router: server.router(),
        server,
        manager,
        opener,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_builder_validation() {
    assert!(StreamServerBuilder::new().config(server_config()).build().is_err());
    assert!(StreamServerBuilder::new().build().is_err());
}

#[tokio::test]
async fn test_root_and_health() {
    let server = test_server(vec![CameraConfig::new("c1", "Gate", "fake://ok", 5)]);
    server.manager.start(&CameraConfig::new("c1", "Gate", "fake://ok", 5)).await;

    let response = server.router.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let response = server.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cameras"], 1);
    assert_eq!(body["running_workers"], 1);
    assert_eq!(body["viewers"]["active_connections"], 0);

    server.manager.stop_all().await;
}

#[tokio::test]
async fn test_unknown_camera_returns_404() {
    let server = test_server(Vec::new());

    for uri in ["/api/stream/nope", "/api/stream/nope/alerts", "/api/stream/nope/status"] {
        let response = server.router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Camera 'nope' not found");
    }
}

#[tokio::test]
async fn test_inactive_camera_returns_503() {
    let server = test_server(vec![CameraConfig::new("c1", "Gate", "fake://ok", 5)]);

    let response = server.router.clone().oneshot(get("/api/stream/c1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = server.router.clone().oneshot(get("/api/stream/c1/alerts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = server.router.clone().oneshot(get("/api/stream/c1/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["publishing"], false);
}

#[tokio::test]
async fn test_alerts_wire_format() {
    let camera = CameraConfig::new("c1", "Gate", "fake://ok", 20);
    let server = test_server(vec![camera.clone()]);
    server.manager.start(&camera).await;

    let publisher = Arc::clone(server.manager.publisher());
    assert!(wait_until(Duration::from_secs(2), || publisher.read_alerts("c1").is_some()).await);

    let response = server.router.clone().oneshot(get("/api/stream/c1/alerts")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        serde_json::json!({
            "person_count": 1,
            "epi_count": 0,
            "has_violations": true,
            "violations": [{"class_id": 7, "count": 1}]
        })
    );

    let response = server.router.clone().oneshot(get("/api/stream/c1/status")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body["state"], "running");
    assert_eq!(body["publishing"], true);
    assert_eq!(body["target_interval_ms"], 50);

    server.manager.stop_all().await;
}

#[tokio::test]
async fn test_mjpeg_stream_emits_multipart_frames() {
    let camera = CameraConfig::new("c1", "Gate", "fake://ok", 20);
    let server = test_server(vec![camera.clone()]);
    server.manager.start(&camera).await;

    let response = server.router.clone().oneshot(get("/api/stream/c1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        format!("multipart/x-mixed-replace; boundary={}", BOUNDARY).as_str()
    );

    let mut body = response.into_body().into_data_stream();
    let mut received = Vec::new();
    let marker = format!("--{}\r\n", BOUNDARY);
    while count_occurrences(&received, marker.as_bytes()) < 2 {
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .expect("frame within timeout")
            .expect("stream open")
            .unwrap();
        received.extend_from_slice(&chunk);
    }

    let text = String::from_utf8_lossy(&received);
    assert!(text.contains("Content-Type: image/jpeg"));
    assert!(text.contains("X-Frame-ID: "));
    // Mock frames are tiny JPEGs
    assert!(received.windows(2).any(|w| w == [0xFF, 0xD8]));

    drop(body);
    server.manager.stop_all().await;
    assert_eq!(server.opener.stats().live_handles, 0);
}

#[tokio::test]
async fn test_mjpeg_keepalive_resends_last_frame() {
    let camera = CameraConfig::new("c1", "Gate", "fake://ok", 20);
    let server = test_server(vec![camera.clone()]);
    server.manager.start(&camera).await;

    let publisher = Arc::clone(server.manager.publisher());
    assert!(wait_until(Duration::from_secs(2), || publisher.read_frame("c1").is_some()).await);

    // Freeze the source so only keepalive frames follow
    server.opener.hang_reads(true);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = server.router.clone().oneshot(get("/api/stream/c1")).await.unwrap();
    let mut body = response.into_body().into_data_stream();
    let marker = format!("--{}\r\n", BOUNDARY);
    let mut received = Vec::new();
    while count_occurrences(&received, marker.as_bytes()) < 3 {
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .expect("keepalive within timeout")
            .expect("stream open")
            .unwrap();
        received.extend_from_slice(&chunk);
    }

    drop(body);
    server.manager.stop_all().await;
}

#[tokio::test]
async fn test_mjpeg_stream_ends_when_server_shuts_down() {
    let camera = CameraConfig::new("c1", "Gate", "fake://ok", 20);
    let server = test_server(vec![camera.clone()]);
    server.manager.start(&camera).await;

    let shutdown = CancellationToken::new();
    let router = server.server.router_with_shutdown(shutdown.clone());
    let response = router.oneshot(get("/api/stream/c1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("first chunk within timeout")
        .expect("stream open")
        .unwrap();
    assert_eq!(server.server.stats().snapshot().active_connections, 1);

    // The worker keeps publishing; only the shutdown token ends the body
    shutdown.cancel();
    let drained = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(chunk) = body.next().await {
            chunk.unwrap();
        }
    })
    .await;
    assert!(drained.is_ok(), "stream still open after shutdown");
    assert!(server.manager.has_worker("c1"));
    assert_eq!(server.server.stats().snapshot().active_connections, 0);

    server.manager.stop_all().await;
}

fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}
