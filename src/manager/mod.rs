//! Keyed collection of stream workers.
//!
//! The manager reconciles the running worker set with the desired camera
//! configuration and guarantees at most one worker per camera id. All
//! lifecycle operations go through one async mutex, so two transitions for the
//! same camera never race; status reads use a separate index and never wait
//! on a start or stop in progress.

mod report;

pub use report::ReconcileReport;

use crate::config::CameraConfig;
use crate::publisher::FramePublisher;
use crate::worker::{StateTransition, StreamWorker, WorkerContext, WorkerStatus};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub struct WorkerManager {
    workers: Mutex<HashMap<String, StreamWorker>>,
    statuses: RwLock<HashMap<String, Arc<RwLock<WorkerStatus>>>>,
    publisher: Arc<FramePublisher>,
    ctx: WorkerContext,
}

enum Action {
    Start,
    Restart,
    Retire,
    Keep,
    Nothing,
}

/// Why a running worker has to go
enum Removal {
    /// Camera deactivated or deleted; viewer streams end
    Retire,
    /// Replaced by a worker with new settings; viewer streams continue
    Replace,
}

impl WorkerManager {
    pub fn new(ctx: WorkerContext, publisher: Arc<FramePublisher>) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            publisher,
            ctx,
        }
    }

    pub fn publisher(&self) -> &Arc<FramePublisher> {
        &self.publisher
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.ctx.transitions.subscribe()
    }

    /// Start a worker for an active camera. Returns `false` without doing
    /// anything when the camera is inactive or already has a worker.
    pub async fn start(&self, config: &CameraConfig) -> bool {
        let mut workers = self.workers.lock().await;
        self.start_locked(&mut workers, config)
    }

    /// Stop a camera's worker and end its viewer streams. Returns `false` if
    /// no worker was running.
    pub async fn stop(&self, camera_id: &str) -> bool {
        let mut workers = self.workers.lock().await;
        self.stop_locked(&mut workers, camera_id, Removal::Retire).await
    }

    /// Bring the running set in line with `desired`.
    ///
    /// Cameras missing from `desired` or marked inactive are stopped; cameras
    /// whose source or rate changed are restarted; active cameras without a
    /// worker are started.
    pub async fn reconcile(&self, desired: &[CameraConfig]) -> ReconcileReport {
        let mut workers = self.workers.lock().await;
        let mut report = ReconcileReport::default();

        let desired_by_id: HashMap<&str, &CameraConfig> =
            desired.iter().map(|c| (c.id.as_str(), c)).collect();

        let running: Vec<String> = workers.keys().cloned().collect();
        for camera_id in running {
            let target = desired_by_id.get(camera_id.as_str()).copied();
            self.reconcile_locked(&mut workers, &camera_id, target, &mut report)
                .await;
        }

        for config in desired {
            if !workers.contains_key(&config.id) {
                self.reconcile_locked(&mut workers, &config.id, Some(config), &mut report)
                    .await;
            }
        }

        report
    }

    /// Reconcile a single camera; `desired` is `None` when it no longer exists
    pub async fn reconcile_camera(
        &self,
        camera_id: &str,
        desired: Option<&CameraConfig>,
    ) -> ReconcileReport {
        let mut workers = self.workers.lock().await;
        let mut report = ReconcileReport::default();
        self.reconcile_locked(&mut workers, camera_id, desired, &mut report)
            .await;
        report
    }

    /// Stop every worker and wait until each has released its source
    pub async fn stop_all(&self) {
        let mut workers = self.workers.lock().await;
        let drained: Vec<(String, StreamWorker)> = workers.drain().collect();
        if drained.is_empty() {
            return;
        }

        info!("Stopping {} stream workers", drained.len());

        join_all(drained.into_iter().map(|(camera_id, worker)| {
            let publisher = Arc::clone(&self.publisher);
            async move {
                worker.stop().await;
                publisher.remove(&camera_id);
            }
        }))
        .await;

        self.statuses.write().clear();

        info!("All stream workers stopped");
    }

    pub fn status(&self, camera_id: &str) -> Option<WorkerStatus> {
        self.statuses
            .read()
            .get(camera_id)
            .map(|status| status.read().clone())
    }

    pub fn statuses(&self) -> Vec<WorkerStatus> {
        let mut statuses: Vec<WorkerStatus> = self
            .statuses
            .read()
            .values()
            .map(|status| status.read().clone())
            .collect();
        statuses.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        statuses
    }

    pub fn has_worker(&self, camera_id: &str) -> bool {
        self.statuses.read().contains_key(camera_id)
    }

    pub fn worker_count(&self) -> usize {
        self.statuses.read().len()
    }

    async fn reconcile_locked(
        &self,
        workers: &mut HashMap<String, StreamWorker>,
        camera_id: &str,
        desired: Option<&CameraConfig>,
        report: &mut ReconcileReport,
    ) {
        let action = match (workers.get(camera_id), desired) {
            (Some(_), None) => Action::Retire,
            (Some(_), Some(config)) if !config.active => Action::Retire,
            (Some(worker), Some(_)) if worker.is_finished() => {
                warn!("Stream worker for camera {} exited unexpectedly", camera_id);
                Action::Restart
            }
            (Some(worker), Some(config)) if worker.config().requires_restart(config) => {
                Action::Restart
            }
            (Some(_), Some(_)) => Action::Keep,
            (None, Some(config)) if config.active => Action::Start,
            (None, _) => Action::Nothing,
        };

        match (action, desired) {
            (Action::Retire, _) => {
                self.stop_locked(workers, camera_id, Removal::Retire).await;
                report.stopped.push(camera_id.to_string());
            }
            (Action::Restart, Some(config)) => {
                self.stop_locked(workers, camera_id, Removal::Replace).await;
                self.start_locked(workers, config);
                report.restarted.push(camera_id.to_string());
            }
            (Action::Start, Some(config)) => {
                self.start_locked(workers, config);
                report.started.push(camera_id.to_string());
            }
            (Action::Keep, Some(config)) => {
                if let Some(worker) = workers.get_mut(camera_id) {
                    if worker.config().name != config.name {
                        worker.rename(&config.name);
                    }
                }
                report.unchanged.push(camera_id.to_string());
            }
            // Inactive or unknown camera: nothing runs, nothing to publish
            _ => {
                self.publisher.remove(camera_id);
            }
        }
    }

    fn start_locked(
        &self,
        workers: &mut HashMap<String, StreamWorker>,
        config: &CameraConfig,
    ) -> bool {
        if !config.active {
            debug!("Camera {} is inactive, not starting a worker", config.id);
            return false;
        }

        if workers.contains_key(&config.id) {
            debug!("Camera {} already has a worker, ignoring start", config.id);
            return false;
        }

        let cell = self.publisher.register(&config.id);
        let worker = StreamWorker::spawn(config.clone(), cell, self.ctx.clone());

        self.statuses
            .write()
            .insert(config.id.clone(), worker.status_handle());
        workers.insert(config.id.clone(), worker);

        info!(
            "Started worker for camera {} ({}) at {} fps",
            config.id, config.name, config.target_fps
        );
        true
    }

    async fn stop_locked(
        &self,
        workers: &mut HashMap<String, StreamWorker>,
        camera_id: &str,
        removal: Removal,
    ) -> bool {
        let Some(worker) = workers.remove(camera_id) else {
            return false;
        };

        // The old status stays visible until the worker has stopped; a
        // replacement overwrites it in start_locked
        worker.stop().await;

        if let Removal::Retire = removal {
            self.statuses.write().remove(camera_id);
            self.publisher.remove(camera_id);
        }
        true
    }
}
