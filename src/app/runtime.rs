use super::{EpiguardApp, ShutdownReason};
use crate::error::{EpiguardError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

type SharedSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

/// Requests shutdown of a running [`EpiguardApp`]. Only the first request
/// is delivered.
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: SharedSender,
}

impl ShutdownTrigger {
    /// Returns false when a shutdown was already requested
    pub async fn trigger(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}

impl EpiguardApp {
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger {
            sender: Arc::clone(&self.shutdown_sender),
        }
    }

    /// Run until a signal or a shutdown request arrives, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Epiguard is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| EpiguardError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers();

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| EpiguardError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Epiguard shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self) {
        // SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let trigger = self.shutdown_trigger();
            let token = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };

                tokio::select! {
                    _ = token.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        trigger.trigger(ShutdownReason::Signal("SIGTERM".to_string())).await;
                    }
                }
            });
        }

        // SIGINT (Ctrl+C) - cross-platform
        let trigger = self.shutdown_trigger();
        let token = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = signal::ctrl_c() => match result {
                    Ok(()) => {
                        info!("Received SIGINT signal (Ctrl+C)");
                        trigger.trigger(ShutdownReason::Signal("SIGINT".to_string())).await;
                    }
                    Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
                },
            }
        });
    }
}
