use super::{ComponentState, EpiguardApp, REGISTRY_WATCHER, SERVER, WORKERS};
use crate::error::{EpiguardError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const WATCHER_STOP_TIMEOUT: Duration = Duration::from_secs(2);

impl EpiguardApp {
    /// Stop all components in reverse start order. Returns the process exit
    /// code: 0 when everything stopped cleanly.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        // The server stops taking viewers before the workers go away. The
        // cancelled token has already ended every open stream body.
        if let Some(task) = self.server_task.take() {
            let result = self
                .stop_component(SERVER, SERVER_STOP_TIMEOUT, async move {
                    match task.await {
                        Ok(result) => result,
                        Err(e) => Err(EpiguardError::component(SERVER, e.to_string())),
                    }
                })
                .await;
            if let Err(e) = result {
                error!("Error stopping {}: {}", SERVER, e);
                exit_code = 1;
            }
        }

        if let Some(task) = self.watcher_task.take() {
            let result = self
                .stop_component(REGISTRY_WATCHER, WATCHER_STOP_TIMEOUT, async move {
                    task.await
                        .map_err(|e| EpiguardError::component(REGISTRY_WATCHER, e.to_string()))
                })
                .await;
            if let Err(e) = result {
                error!("Error stopping {}: {}", REGISTRY_WATCHER, e);
                exit_code = 1;
            }
        }

        let manager = std::sync::Arc::clone(&self.manager);
        let workers_timeout = self.workers_stop_timeout();
        let result = self
            .stop_component(WORKERS, workers_timeout, async move {
                manager.stop_all().await;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            error!("Error stopping {}: {}", WORKERS, e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Workers stop in parallel, each bounded by its own grace period
    fn workers_stop_timeout(&self) -> Duration {
        self.config.worker.stop_grace() + Duration::from_secs(2)
    }

    async fn stop_component<F>(&self, component: &str, limit: Duration, stop: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, stop).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                warn!("{} component stop timeout after {:?}", component, limit);
                Err(EpiguardError::component(
                    component,
                    format!("stop timed out after {:?}", limit),
                ))
            }
        }
    }
}
