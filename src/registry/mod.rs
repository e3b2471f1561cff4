//! Source of truth for camera configuration.
//!
//! The coordinator only depends on the [`CameraRegistry`] trait; the
//! in-memory implementation backs the binary and the tests.

mod memory;

pub use memory::InMemoryCameraRegistry;

use crate::config::CameraConfig;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::broadcast;

/// Notification emitted after every successful registry mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Created(String),
    ConfigChanged(String),
    Activated(String),
    Deactivated(String),
    Deleted(String),
}

impl RegistryChange {
    pub fn camera_id(&self) -> &str {
        match self {
            RegistryChange::Created(id)
            | RegistryChange::ConfigChanged(id)
            | RegistryChange::Activated(id)
            | RegistryChange::Deactivated(id)
            | RegistryChange::Deleted(id) => id,
        }
    }
}

#[async_trait]
pub trait CameraRegistry: Send + Sync {
    /// Every camera, in creation order
    async fn list(&self) -> Vec<CameraConfig>;

    async fn list_active_configs(&self) -> Vec<CameraConfig> {
        self.list().await.into_iter().filter(|c| c.active).collect()
    }

    async fn get(&self, camera_id: &str) -> Option<CameraConfig>;

    fn subscribe(&self) -> broadcast::Receiver<RegistryChange>;
}

/// Fields of a camera to create
#[derive(Debug, Clone, Deserialize)]
pub struct NewCamera {
    pub name: String,
    pub source_url: String,
    #[serde(default)]
    pub target_fps: Option<u32>,
}

impl NewCamera {
    pub fn new<S: Into<String>>(name: S, source_url: S) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            target_fps: None,
        }
    }

    pub fn with_fps(mut self, target_fps: u32) -> Self {
        self.target_fps = Some(target_fps);
        self
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraUpdate {
    pub name: Option<String>,
    pub source_url: Option<String>,
    pub target_fps: Option<u32>,
    pub active: Option<bool>,
}
