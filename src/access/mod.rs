//! Read side used by the HTTP layer.
//!
//! Everything here reads published state; nothing triggers capture or
//! inference. Any number of viewers can stream the same camera and they all
//! observe the one snapshot cell its worker writes.

mod status;
#[cfg(test)]
mod tests;

pub use status::StreamStatus;

use crate::error::AccessError;
use crate::manager::WorkerManager;
use crate::publisher::FramePublisher;
use crate::registry::CameraRegistry;
use crate::snapshot::{AlertSnapshot, FrameSnapshot};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// Frames of one camera, newest first available; ends when the camera is
/// deactivated or deleted
pub type FrameStream = Pin<Box<dyn Stream<Item = FrameSnapshot> + Send>>;

#[derive(Clone)]
pub struct StreamAccess {
    registry: Arc<dyn CameraRegistry>,
    manager: Arc<WorkerManager>,
    publisher: Arc<FramePublisher>,
}

impl StreamAccess {
    pub fn new(registry: Arc<dyn CameraRegistry>, manager: Arc<WorkerManager>) -> Self {
        let publisher = Arc::clone(manager.publisher());
        Self {
            registry,
            manager,
            publisher,
        }
    }

    /// Lazy sequence of frame snapshots, yielding whenever the published frame
    /// changes. The current frame, if any, is yielded first.
    ///
    /// A camera whose worker is starting or retrying is streamable: the
    /// sequence simply waits for the first frame.
    pub async fn open_stream(&self, camera_id: &str) -> Result<FrameStream, AccessError> {
        self.ensure_known(camera_id).await?;

        let mut rx = self
            .publisher
            .subscribe(camera_id)
            .ok_or_else(|| AccessError::unavailable(camera_id))?;

        debug!("Opened frame stream for camera {}", camera_id);

        let stream = async_stream::stream! {
            let current = rx.borrow_and_update().clone();
            if let Some(snapshot) = current {
                yield snapshot.frame.clone();
            }

            while rx.changed().await.is_ok() {
                let current = rx.borrow_and_update().clone();
                if let Some(snapshot) = current {
                    yield snapshot.frame.clone();
                }
            }
        };

        Ok(Box::pin(stream))
    }

    pub async fn get_alert_snapshot(&self, camera_id: &str) -> Result<AlertSnapshot, AccessError> {
        self.ensure_known(camera_id).await?;
        self.publisher
            .read_alerts(camera_id)
            .ok_or_else(|| AccessError::unavailable(camera_id))
    }

    /// Latest frame without subscribing
    pub async fn get_frame(&self, camera_id: &str) -> Result<FrameSnapshot, AccessError> {
        self.ensure_known(camera_id).await?;
        self.publisher
            .read_frame(camera_id)
            .ok_or_else(|| AccessError::unavailable(camera_id))
    }

    pub async fn get_stream_status(&self, camera_id: &str) -> Result<StreamStatus, AccessError> {
        self.ensure_known(camera_id).await?;

        let status = match self.manager.status(camera_id) {
            Some(worker) => {
                let has_frame = self.publisher.read(camera_id).is_some();
                StreamStatus::from_worker(&worker, has_frame)
            }
            None => StreamStatus::stopped(camera_id),
        };
        Ok(status)
    }

    /// Number of known cameras and of cameras with a worker
    pub async fn counts(&self) -> (usize, usize) {
        (self.registry.list().await.len(), self.manager.worker_count())
    }

    async fn ensure_known(&self, camera_id: &str) -> Result<(), AccessError> {
        match self.registry.get(camera_id).await {
            Some(_) => Ok(()),
            None => Err(AccessError::not_found(camera_id)),
        }
    }
}
