use crate::{
    access::StreamAccess,
    config::ServerConfig,
    error::{EpiguardError, Result, StreamError},
};
use axum::{http::Method, routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::handlers::{
    alerts_handler, health_handler, mjpeg_stream_handler, root_handler, status_handler,
};
use super::stats::StreamStats;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) access: StreamAccess,
    pub(crate) keepalive: Duration,
    pub(crate) stats: Arc<StreamStats>,
    /// Cancelled when the server begins shutting down; ends open streams
    pub(crate) shutdown: CancellationToken,
}

/// HTTP front of the access layer: MJPEG streams, alerts and status
pub struct StreamServer {
    pub(crate) config: ServerConfig,
    pub(crate) access: StreamAccess,
    pub(crate) stats: Arc<StreamStats>,
}

impl StreamServer {
    pub fn new(config: ServerConfig, access: StreamAccess) -> Self {
        Self {
            config,
            access,
            stats: Arc::new(StreamStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.stats)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Routes with state attached. Streams opened through this router end
    /// only when their camera goes away.
    pub fn router(&self) -> Router {
        self.router_with_shutdown(CancellationToken::new())
    }

    /// Routes whose MJPEG streams finish as soon as `shutdown` is cancelled
    pub fn router_with_shutdown(&self, shutdown: CancellationToken) -> Router {
        let state = ServerState {
            access: self.access.clone(),
            keepalive: Duration::from_millis(self.config.stream_keepalive_ms),
            stats: Arc::clone(&self.stats),
            shutdown,
        };

        let router = Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/api/stream/:camera_id", get(mjpeg_stream_handler))
            .route("/api/stream/:camera_id/status", get(status_handler))
            .route("/api/stream/:camera_id/alerts", get(alerts_handler))
            .with_state(state);

        if self.config.cors_allow_any {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET])
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Bind the listening socket
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.address();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| StreamError::BindFailed {
                address: addr.clone(),
                source: e,
            })?;

        info!("HTTP server listening on {}", addr);
        Ok(listener)
    }

    /// Serve on `listener` until `shutdown` is cancelled
    pub async fn serve(&self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let app = self.router_with_shutdown(shutdown.clone());

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Bind and serve
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }
}

/// Stream server builder for configuration
#[derive(Default)]
pub struct StreamServerBuilder {
    config: Option<ServerConfig>,
    access: Option<StreamAccess>,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn access(mut self, access: StreamAccess) -> Self {
        self.access = Some(access);
        self
    }

    pub fn build(self) -> Result<StreamServer> {
        let config = self.config.ok_or_else(|| {
            EpiguardError::Stream(StreamError::StartupFailed {
                details: "Server configuration is required".to_string(),
            })
        })?;

        let access = self.access.ok_or_else(|| {
            EpiguardError::Stream(StreamError::StartupFailed {
                details: "Stream access layer is required".to_string(),
            })
        })?;

        Ok(StreamServer::new(config, access))
    }
}
