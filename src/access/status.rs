use crate::worker::{LifecycleState, WorkerStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle summary of one camera as reported to viewers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamStatus {
    pub camera_id: String,
    pub state: LifecycleState,
    /// Running and at least one frame available
    pub publishing: bool,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub frames_processed: u64,
    pub detector_failures: u64,
    pub target_interval_ms: u64,
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl StreamStatus {
    pub fn from_worker(worker: &WorkerStatus, has_frame: bool) -> Self {
        Self {
            camera_id: worker.camera_id.clone(),
            state: worker.state,
            publishing: worker.state.is_publishing() && has_frame,
            retry_count: worker.retry_count,
            last_error: worker.last_error.clone(),
            frames_processed: worker.frames_processed,
            detector_failures: worker.detector_failures,
            target_interval_ms: worker.target_interval.as_millis() as u64,
            last_frame_at: worker.last_frame_at,
        }
    }

    /// Known camera without a worker
    pub fn stopped(camera_id: &str) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            state: LifecycleState::Stopped,
            publishing: false,
            retry_count: 0,
            last_error: None,
            frames_processed: 0,
            detector_failures: 0,
            target_interval_ms: 0,
            last_frame_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_publishing_requires_running_and_frame() {
        let mut worker = WorkerStatus::new("c1", "Gate", Duration::from_millis(200));
        worker.state = LifecycleState::Running;

        assert!(!StreamStatus::from_worker(&worker, false).publishing);
        let status = StreamStatus::from_worker(&worker, true);
        assert!(status.publishing);
        assert_eq!(status.target_interval_ms, 200);

        worker.state = LifecycleState::Error;
        assert!(!StreamStatus::from_worker(&worker, true).publishing);
    }

    #[test]
    fn test_stopped_serialization() {
        let value = serde_json::to_value(StreamStatus::stopped("c1")).unwrap();
        assert_eq!(value["state"], "stopped");
        assert_eq!(value["publishing"], false);
        assert!(value["last_error"].is_null());
    }
}
