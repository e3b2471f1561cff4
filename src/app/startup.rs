use super::{ComponentState, EpiguardApp, REGISTRY_WATCHER, SERVER, WORKERS};
use crate::error::{EpiguardError, Result};
use std::sync::Arc;
use tracing::{error, info};

impl EpiguardApp {
    /// Register all components as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing epiguard components");

        let mut states = self.component_states.lock().await;
        for component in [WORKERS, REGISTRY_WATCHER, SERVER] {
            states.insert(component.to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!(
            "All components initialized ({} cameras registered)",
            self.config.cameras.len()
        );
        Ok(())
    }

    /// Start workers for active cameras, follow the registry and serve HTTP
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting epiguard");

        if self.cancellation_token.is_cancelled() {
            return Err(EpiguardError::system("Application already shut down"));
        }

        // Workers first so the first viewers find frames
        self.set_component_state(WORKERS, ComponentState::Starting)
            .await;
        let report = self.coordinator.reconcile_all().await;
        info!("Initial reconciliation: {}", report);
        self.set_component_state(WORKERS, ComponentState::Running)
            .await;

        self.set_component_state(REGISTRY_WATCHER, ComponentState::Starting)
            .await;
        self.watcher_task = Some(
            self.coordinator
                .watch_registry(self.cancellation_token.child_token()),
        );
        self.set_component_state(REGISTRY_WATCHER, ComponentState::Running)
            .await;

        self.set_component_state(SERVER, ComponentState::Starting)
            .await;
        let listener = match self.server.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to start HTTP server: {}", e);
                self.set_component_state(SERVER, ComponentState::Failed)
                    .await;
                return Err(e);
            }
        };
        self.local_addr = listener.local_addr().ok();

        let server = Arc::clone(&self.server);
        let token = self.cancellation_token.child_token();
        self.server_task = Some(tokio::spawn(async move {
            let result = server.serve(listener, token).await;
            if let Err(e) = &result {
                error!("HTTP server error: {}", e);
            }
            result
        }));
        self.set_component_state(SERVER, ComponentState::Running)
            .await;

        info!(
            "Epiguard started: {} workers, HTTP on {}",
            self.manager.worker_count(),
            self.local_addr
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| self.server.address())
        );
        Ok(())
    }
}
