use super::*;
use crate::config::CameraConfig;
use crate::registry::InMemoryCameraRegistry;
use crate::source::MockSourceOpener;
use crate::test_support::{scripted_detector, test_context, wait_until};
use crate::worker::LifecycleState;
use futures::StreamExt;
use std::time::{Duration, Instant};

struct Fixture {
    opener: MockSourceOpener,
    detector: Arc<crate::detector::ScriptedDetector>,
    manager: Arc<WorkerManager>,
    access: StreamAccess,
}

fn fixture(cameras: Vec<CameraConfig>) -> Fixture {
    let opener = MockSourceOpener::new();
    let detector = scripted_detector();
    let registry = Arc::new(InMemoryCameraRegistry::with_cameras(cameras).unwrap());
    let manager = Arc::new(WorkerManager::new(
        test_context(&opener, detector.clone()),
        Arc::new(FramePublisher::new()),
    ));
    let access = StreamAccess::new(registry, Arc::clone(&manager));

    Fixture {
        opener,
        detector,
        manager,
        access,
    }
}

fn camera(id: &str, fps: u32) -> CameraConfig {
    CameraConfig::new(id, id, "fake://ok", fps)
}

#[tokio::test]
async fn test_unknown_camera_is_not_found() {
    let f = fixture(Vec::new());

    assert_eq!(
        f.access.get_alert_snapshot("nope").await.unwrap_err(),
        AccessError::not_found("nope")
    );
    assert_eq!(
        f.access.get_stream_status("nope").await.unwrap_err(),
        AccessError::not_found("nope")
    );
    assert!(matches!(
        f.access.open_stream("nope").await,
        Err(AccessError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_camera_without_worker_is_unavailable() {
    let f = fixture(vec![camera("c1", 5)]);

    assert_eq!(
        f.access.get_alert_snapshot("c1").await.unwrap_err(),
        AccessError::unavailable("c1")
    );
    assert!(matches!(
        f.access.open_stream("c1").await,
        Err(AccessError::Unavailable { .. })
    ));

    let status = f.access.get_stream_status("c1").await.unwrap();
    assert_eq!(status.state, LifecycleState::Stopped);
    assert!(!status.publishing);
}

#[tokio::test]
async fn test_no_alerts_before_first_frame() {
    let f = fixture(vec![camera("c1", 5)]);
    f.opener.hang_reads(true);
    f.manager.start(&camera("c1", 5)).await;

    assert!(wait_until(Duration::from_secs(2), || f.opener.stats().reads >= 1).await);

    assert_eq!(
        f.access.get_alert_snapshot("c1").await.unwrap_err(),
        AccessError::unavailable("c1")
    );
    let status = f.access.get_stream_status("c1").await.unwrap();
    assert_eq!(status.state, LifecycleState::Running);
    assert!(!status.publishing);

    f.manager.stop_all().await;
}

#[tokio::test]
async fn test_viewers_share_one_capture_loop() {
    let fps = 20;
    let f = fixture(vec![camera("c1", fps)]);
    let started = Instant::now();
    f.manager.start(&camera("c1", fps)).await;

    let mut viewers = Vec::new();
    for _ in 0..5 {
        let mut stream = f.access.open_stream("c1").await.unwrap();
        viewers.push(tokio::spawn(async move {
            let mut frames = Vec::new();
            while frames.len() < 3 {
                match tokio::time::timeout(Duration::from_secs(2), stream.next()).await {
                    Ok(Some(frame)) => frames.push(frame.frame_id),
                    _ => break,
                }
            }
            frames
        }));
    }

    for viewer in viewers {
        let frames = viewer.await.unwrap();
        assert_eq!(frames.len(), 3);
        assert!(frames.windows(2).all(|w| w[0] < w[1]));
    }

    // Frames are detected once per read, not once per viewer
    let status = f.access.get_stream_status("c1").await.unwrap();
    let calls = f.detector.calls();
    let stats = f.opener.stats();
    assert_eq!(stats.opens, 1);
    assert!(calls <= stats.reads);
    assert!(status.publishing);
    assert!(status.frames_processed <= calls);

    f.manager.stop_all().await;

    // Five viewers still read at the camera rate, not five times it
    let elapsed = started.elapsed().as_secs_f64();
    let reads = f.opener.stats().reads;
    let bound = (fps as f64 * elapsed).ceil() as u64 + 1;
    assert!(reads <= bound, "{} reads in {:.3}s exceeds {}", reads, elapsed, bound);
}

#[tokio::test]
async fn test_dropping_a_viewer_leaves_others_running() {
    let f = fixture(vec![camera("c1", 20)]);
    f.manager.start(&camera("c1", 20)).await;

    let first = f.access.open_stream("c1").await.unwrap();
    let mut second = f.access.open_stream("c1").await.unwrap();
    drop(first);

    for _ in 0..2 {
        let frame = tokio::time::timeout(Duration::from_secs(2), second.next())
            .await
            .unwrap();
        assert!(frame.is_some());
    }
    assert_eq!(
        f.manager.status("c1").map(|s| s.state),
        Some(LifecycleState::Running)
    );

    f.manager.stop_all().await;
}

#[tokio::test]
async fn test_stream_ends_when_camera_is_retired() {
    let f = fixture(vec![camera("c1", 20)]);
    f.manager.start(&camera("c1", 20)).await;

    let mut stream = f.access.open_stream("c1").await.unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), stream.next()).await.unwrap();
    assert!(first.is_some());

    f.manager.stop("c1").await;

    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        while stream.next().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok());

    let frame = f.access.get_frame("c1").await;
    assert_eq!(frame.unwrap_err(), AccessError::unavailable("c1"));
}

#[tokio::test]
async fn test_counts() {
    let f = fixture(vec![camera("c1", 5), camera("c2", 5)]);
    f.manager.start(&camera("c1", 5)).await;

    assert_eq!(f.access.counts().await, (2, 1));
    f.manager.stop_all().await;
}
