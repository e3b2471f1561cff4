//! Per-camera capture and inference loop.
//!
//! A [`StreamWorker`] owns one spawned task that opens the camera source,
//! reads frames at the configured rate, runs detection, and publishes the
//! annotated frame and its alerts into the camera's [`SnapshotCell`].

mod backoff;
mod processor;
mod runner;
mod state;

pub use backoff::BackoffPolicy;
pub use processor::{FrameProcessor, ProcessOutcome};
pub use runner::WorkerContext;
pub use state::{LifecycleState, StateTransition, WorkerStatus};

use crate::config::CameraConfig;
use crate::publisher::SnapshotCell;
use parking_lot::RwLock;
use runner::WorkerLoop;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct StreamWorker {
    config: CameraConfig,
    status: Arc<RwLock<WorkerStatus>>,
    cell: Arc<SnapshotCell>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    stop_grace: Duration,
}

impl StreamWorker {
    /// Start the loop for `config`, publishing into `cell`
    pub fn spawn(config: CameraConfig, cell: Arc<SnapshotCell>, ctx: WorkerContext) -> Self {
        let status = Arc::new(RwLock::new(WorkerStatus::new(
            &config.id,
            &config.name,
            config.target_interval(),
        )));
        let cancel = CancellationToken::new();
        let stop_grace = ctx.stop_grace;

        let worker_loop = WorkerLoop::new(
            config.clone(),
            ctx,
            Arc::clone(&status),
            Arc::clone(&cell),
            cancel.clone(),
        );
        let task = tokio::spawn(worker_loop.run());

        Self {
            config,
            status,
            cell,
            cancel,
            task: Some(task),
            stop_grace,
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn status(&self) -> WorkerStatus {
        self.status.read().clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.read().state
    }

    /// Shared status, kept readable after the worker is gone
    pub fn status_handle(&self) -> Arc<RwLock<WorkerStatus>> {
        Arc::clone(&self.status)
    }

    /// Apply a new display name without restarting the loop
    pub fn rename(&mut self, name: &str) {
        info!(
            "Renaming camera {} from '{}' to '{}'",
            self.config.id, self.config.name, name
        );
        self.config.name = name.to_string();
        self.status.write().camera_name = name.to_string();
    }

    pub fn cell(&self) -> &Arc<SnapshotCell> {
        &self.cell
    }

    /// True once the loop task has exited, normally only after a panic
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop the loop and wait for it to release its source.
    ///
    /// A loop that does not finish within the stop grace period is aborted;
    /// aborting drops the capture handle at its current suspension point.
    pub async fn stop(mut self) {
        info!("Stopping stream worker for camera {}", self.config.id);
        self.cancel.cancel();

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.stop_grace, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    error!("Stream worker for camera {} panicked: {}", self.config.id, e);
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    warn!(
                        "Stream worker for camera {} did not stop within {:?}, aborting",
                        self.config.id, self.stop_grace
                    );
                    task.abort();
                    let _ = task.await;
                }
            }
        }

        self.status.write().state = LifecycleState::Stopped;
        self.cell.clear();
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        // Dropped without stop(): let the loop wind down on its own
        self.cancel.cancel();
    }
}
