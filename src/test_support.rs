//! Helpers shared by the async tests of the worker, manager and access layers.

use crate::detector::{BoundingBox, ClassTaxonomy, Detection, Detector, ScriptedDetector};
use crate::overlay::FrameAnnotator;
use crate::source::MockSourceOpener;
use crate::worker::{BackoffPolicy, FrameProcessor, StateTransition, WorkerContext};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Person plus a missing helmet
pub fn person_without_helmet() -> Vec<Detection> {
    vec![
        Detection::new(6, BoundingBox::new(0.0, 0.0, 2.0, 2.0), 0.9),
        Detection::new(7, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.8),
    ]
}

pub fn scripted_detector() -> Arc<ScriptedDetector> {
    Arc::new(ScriptedDetector::always(person_without_helmet()))
}

/// Context with short timeouts so failure paths run quickly
pub fn test_context(opener: &MockSourceOpener, detector: Arc<dyn Detector>) -> WorkerContext {
    let (transitions, _) = broadcast::channel(256);
    WorkerContext {
        opener: Arc::new(opener.clone()),
        processor: Arc::new(FrameProcessor::new(
            detector,
            ClassTaxonomy::default(),
            FrameAnnotator::passthrough(),
            0.5,
        )),
        backoff: BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(40)),
        read_timeout: Duration::from_millis(300),
        stop_grace: Duration::from_secs(1),
        transitions,
    }
}

pub fn subscribe(ctx: &WorkerContext) -> broadcast::Receiver<StateTransition> {
    ctx.transitions.subscribe()
}

/// Poll `condition` every few milliseconds until it holds or `limit` passes
pub async fn wait_until<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Like [`wait_until`] for async conditions
pub async fn wait_until_async<F, Fut>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition().await
}
