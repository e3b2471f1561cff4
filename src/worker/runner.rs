use super::backoff::BackoffPolicy;
use super::processor::{FrameProcessor, ProcessOutcome};
use super::state::{LifecycleState, StateTransition, WorkerStatus};
use crate::config::CameraConfig;
use crate::error::SourceError;
use crate::publisher::SnapshotCell;
use crate::source::{CaptureHandle, SourceOpener};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared collaborators handed to every worker
#[derive(Clone)]
pub struct WorkerContext {
    pub opener: Arc<dyn SourceOpener>,
    pub processor: Arc<FrameProcessor>,
    pub backoff: BackoffPolicy,
    pub read_timeout: Duration,
    pub stop_grace: Duration,
    pub transitions: broadcast::Sender<StateTransition>,
}

/// Loop state. `Running` owns the capture handle, so leaving it releases
/// the source.
enum Phase {
    Starting,
    Running(Box<dyn CaptureHandle>),
    Error(String),
    Stopped,
}

impl Phase {
    fn lifecycle(&self) -> LifecycleState {
        match self {
            Phase::Starting => LifecycleState::Starting,
            Phase::Running(_) => LifecycleState::Running,
            Phase::Error(_) => LifecycleState::Error,
            Phase::Stopped => LifecycleState::Stopped,
        }
    }
}

pub(super) struct WorkerLoop {
    config: CameraConfig,
    ctx: WorkerContext,
    status: Arc<RwLock<WorkerStatus>>,
    cell: Arc<SnapshotCell>,
    cancel: CancellationToken,
}

impl WorkerLoop {
    pub(super) fn new(
        config: CameraConfig,
        ctx: WorkerContext,
        status: Arc<RwLock<WorkerStatus>>,
        cell: Arc<SnapshotCell>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            ctx,
            status,
            cell,
            cancel,
        }
    }

    /// Overlay caption. The name comes from the status so a rename applies
    /// from the next frame on.
    fn caption(&self) -> String {
        let name = self.status.read().camera_name.clone();
        format!("Camera: {} | FPS: {}", name, self.config.target_fps)
    }

    pub(super) async fn run(self) {
        info!(
            "Stream worker for camera {} ({}) started, source {}",
            self.config.id, self.config.name, self.config.source_url
        );

        let mut phase = Phase::Starting;
        self.record(&phase);

        loop {
            phase = match phase {
                Phase::Starting => self.open_source().await,
                Phase::Running(handle) => self.capture(handle).await,
                Phase::Error(error) => self.wait_backoff(error).await,
                Phase::Stopped => break,
            };
            self.record(&phase);
        }

        info!("Stream worker for camera {} stopped", self.config.id);
    }

    async fn open_source(&self) -> Phase {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return Phase::Stopped,
            result = self.ctx.opener.open(&self.config.source_url) => result,
        };

        match opened {
            Ok(handle) => {
                info!("Opened source {} for camera {}", self.config.source_url, self.config.id);
                Phase::Running(handle)
            }
            Err(e) => Phase::Error(e.to_string()),
        }
    }

    async fn capture(&self, mut handle: Box<dyn CaptureHandle>) -> Phase {
        let mut ticker = interval(self.config.target_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut recovered = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Phase::Stopped,
                _ = ticker.tick() => {}
            }

            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Phase::Stopped,
                result = timeout(self.ctx.read_timeout, handle.read_frame()) => result,
            };

            let frame = match read {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => return Phase::Error(e.to_string()),
                Err(_) => {
                    let error = SourceError::ReadTimeout {
                        timeout: self.ctx.read_timeout,
                    };
                    return Phase::Error(error.to_string());
                }
            };

            if !recovered {
                recovered = true;
                let mut status = self.status.write();
                if status.retry_count > 0 {
                    info!(
                        "Camera {} recovered after {} attempts",
                        self.config.id, status.retry_count
                    );
                }
                status.retry_count = 0;
                status.last_error = None;
            }

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => return Phase::Stopped,
                outcome = self.ctx.processor.process_blocking(frame, self.caption()) => outcome,
            };

            self.publish(outcome);
        }
    }

    fn publish(&self, outcome: ProcessOutcome) {
        let failed = match outcome {
            ProcessOutcome::Detected {
                frame,
                alerts,
                detections,
            } => {
                debug!(
                    "Camera {}: frame {} with {} detections, {} violations",
                    self.config.id,
                    frame.frame_id,
                    detections,
                    alerts.total_violations()
                );
                self.cell.publish(frame, alerts);
                false
            }
            ProcessOutcome::DetectorFailed { frame, error } => {
                warn!(
                    "Detector failed on frame {} of camera {}: {}",
                    frame.frame_id, self.config.id, error
                );
                self.cell.publish_frame(frame);
                true
            }
        };

        let mut status = self.status.write();
        status.frames_processed += 1;
        status.last_frame_at = Some(Utc::now());
        if failed {
            status.detector_failures += 1;
        }
    }

    async fn wait_backoff(&self, error: String) -> Phase {
        let retry_count = self.status.read().retry_count;

        let delay = self.ctx.backoff.delay(retry_count);
        warn!(
            "Camera {} failed (attempt {}): {}; retrying in {:?}",
            self.config.id, retry_count, error, delay
        );

        tokio::select! {
            _ = self.cancel.cancelled() => Phase::Stopped,
            _ = tokio::time::sleep(delay) => Phase::Starting,
        }
    }

    fn record(&self, phase: &Phase) {
        let next = phase.lifecycle();
        let transition = {
            let mut status = self.status.write();
            let previous = status.state;
            if previous == next {
                return;
            }
            debug_assert!(previous.can_transition_to(next));
            status.state = next;

            if let Phase::Error(error) = phase {
                status.retry_count += 1;
                status.last_error = Some(error.clone());
            }

            StateTransition {
                camera_id: self.config.id.clone(),
                from: previous,
                to: next,
                retry_count: status.retry_count,
                error: status.last_error.clone(),
            }
        };

        debug!(
            "Camera {} transition {} -> {}",
            transition.camera_id, transition.from, transition.to
        );

        // No subscribers is fine
        let _ = self.ctx.transitions.send(transition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockSourceOpener;
    use crate::test_support::{scripted_detector, test_context};

    #[test]
    fn test_caption_follows_status_name() {
        let opener = MockSourceOpener::new();
        let config = CameraConfig::new("c1", "Gate", "fake://ok", 5);
        let status = Arc::new(RwLock::new(WorkerStatus::new(
            &config.id,
            &config.name,
            config.target_interval(),
        )));
        let worker_loop = WorkerLoop::new(
            config,
            test_context(&opener, scripted_detector()),
            Arc::clone(&status),
            Arc::new(SnapshotCell::new("c1")),
            CancellationToken::new(),
        );

        assert_eq!(worker_loop.caption(), "Camera: Gate | FPS: 5");
        status.write().camera_name = "Main gate".to_string();
        assert_eq!(worker_loop.caption(), "Camera: Main gate | FPS: 5");
    }
}
