use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Lifecycle of a stream worker.
///
/// `Stopped -> Starting -> Running -> Error -> Starting -> ...` until the
/// worker is stopped from outside, which is possible from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Error,
}

impl LifecycleState {
    /// Transitions the worker loop is allowed to make on its own
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Error)
                | (Running, Error)
                | (Error, Starting)
                | (_, Stopped)
        )
    }

    pub fn is_publishing(self) -> bool {
        self == LifecycleState::Running
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// One state change of a worker, broadcast to observers
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    pub camera_id: String,
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub retry_count: u32,
    pub error: Option<String>,
}

/// Observable status of a single worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub camera_id: String,
    pub camera_name: String,
    pub state: LifecycleState,
    /// Consecutive failed attempts since the last successful read
    pub retry_count: u32,
    pub last_error: Option<String>,
    #[serde(serialize_with = "serialize_millis")]
    pub target_interval: Duration,
    pub frames_processed: u64,
    pub detector_failures: u64,
    pub started_at: DateTime<Utc>,
    pub last_frame_at: Option<DateTime<Utc>>,
}

impl WorkerStatus {
    pub fn new(camera_id: &str, camera_name: &str, target_interval: Duration) -> Self {
        Self {
            camera_id: camera_id.to_string(),
            camera_name: camera_name.to_string(),
            state: LifecycleState::Stopped,
            retry_count: 0,
            last_error: None,
            target_interval,
            frames_processed: 0,
            detector_failures: 0,
            started_at: Utc::now(),
            last_frame_at: None,
        }
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}
