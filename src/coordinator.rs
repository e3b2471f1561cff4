//! Reconciliation triggers driven by camera registry changes.

use crate::manager::{ReconcileReport, WorkerManager};
use crate::registry::{CameraRegistry, RegistryChange};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct DetectionCoordinator {
    registry: Arc<dyn CameraRegistry>,
    manager: Arc<WorkerManager>,
}

impl DetectionCoordinator {
    pub fn new(registry: Arc<dyn CameraRegistry>, manager: Arc<WorkerManager>) -> Self {
        Self { registry, manager }
    }

    pub fn manager(&self) -> &Arc<WorkerManager> {
        &self.manager
    }

    pub fn registry(&self) -> &Arc<dyn CameraRegistry> {
        &self.registry
    }

    pub async fn on_camera_activated(&self, camera_id: &str) -> ReconcileReport {
        self.reconcile_camera(camera_id).await
    }

    pub async fn on_camera_deactivated(&self, camera_id: &str) -> ReconcileReport {
        self.reconcile_camera(camera_id).await
    }

    pub async fn on_camera_config_changed(&self, camera_id: &str) -> ReconcileReport {
        self.reconcile_camera(camera_id).await
    }

    pub async fn on_camera_deleted(&self, camera_id: &str) -> ReconcileReport {
        let report = self.manager.reconcile_camera(camera_id, None).await;
        log_report("camera deleted", &report);
        report
    }

    /// Reconcile every camera in the registry
    pub async fn reconcile_all(&self) -> ReconcileReport {
        let cameras = self.registry.list().await;
        let report = self.manager.reconcile(&cameras).await;
        log_report("full reconcile", &report);
        report
    }

    async fn reconcile_camera(&self, camera_id: &str) -> ReconcileReport {
        let desired = self.registry.get(camera_id).await;
        let report = self
            .manager
            .reconcile_camera(camera_id, desired.as_ref())
            .await;
        log_report(camera_id, &report);
        report
    }

    /// Apply one registry change
    pub async fn apply(&self, change: &RegistryChange) -> ReconcileReport {
        debug!("Registry change: {:?}", change);
        match change {
            RegistryChange::Created(id) | RegistryChange::Activated(id) => {
                self.on_camera_activated(id).await
            }
            RegistryChange::Deactivated(id) => self.on_camera_deactivated(id).await,
            RegistryChange::ConfigChanged(id) => self.on_camera_config_changed(id).await,
            RegistryChange::Deleted(id) => self.on_camera_deleted(id).await,
        }
    }

    /// Follow registry changes until `token` is cancelled.
    ///
    /// The subscription is taken before this returns, so no change made after
    /// the call is missed. If the listener falls behind, it reconciles every
    /// camera instead of replaying the lost changes.
    pub fn watch_registry(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let mut changes = self.registry.subscribe();
        let coordinator = Arc::clone(self);

        tokio::spawn(async move {
            info!("Watching camera registry for changes");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => {
                            coordinator.apply(&change).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                "Registry watcher missed {} changes, reconciling all cameras",
                                skipped
                            );
                            coordinator.reconcile_all().await;
                        }
                        Err(RecvError::Closed) => {
                            debug!("Registry change channel closed");
                            break;
                        }
                    },
                }
            }

            info!("Registry watcher stopped");
        })
    }
}

fn log_report(context: &str, report: &ReconcileReport) {
    if report.is_noop() {
        debug!("Reconcile ({}): no changes", context);
    } else {
        info!("Reconcile ({}): {}", context, report);
    }
}
