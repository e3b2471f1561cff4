use super::{CameraRegistry, CameraUpdate, NewCamera, RegistryChange};
use crate::config::CameraConfig;
use crate::error::RegistryError;
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_TARGET_FPS: u32 = 5;

/// Camera registry held in memory, seeded from the configuration file
pub struct InMemoryCameraRegistry {
    cameras: RwLock<Vec<CameraConfig>>,
    changes: broadcast::Sender<RegistryChange>,
}

impl InMemoryCameraRegistry {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            cameras: RwLock::new(Vec::new()),
            changes,
        }
    }

    /// Registry pre-populated with `cameras`; no change events are emitted
    pub fn with_cameras(cameras: Vec<CameraConfig>) -> Result<Self, RegistryError> {
        let registry = Self::new();
        {
            let mut stored = registry.cameras.write();
            for camera in cameras {
                validate(&camera)?;
                ensure_unique_name(&stored, &camera.name, None)?;
                stored.push(camera);
            }
        }
        Ok(registry)
    }

    pub fn create(&self, new: NewCamera) -> Result<CameraConfig, RegistryError> {
        let camera = CameraConfig::new(
            uuid::Uuid::new_v4().to_string(),
            new.name.trim().to_string(),
            new.source_url,
            new.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        );
        validate(&camera)?;

        {
            let mut cameras = self.cameras.write();
            ensure_unique_name(&cameras, &camera.name, None)?;
            cameras.push(camera.clone());
        }

        info!("Created camera {} ({})", camera.id, camera.name);
        self.emit(RegistryChange::Created(camera.id.clone()));
        Ok(camera)
    }

    pub fn update(
        &self,
        camera_id: &str,
        update: CameraUpdate,
    ) -> Result<CameraConfig, RegistryError> {
        let (before, after) = {
            let mut cameras = self.cameras.write();
            let index = position(&cameras, camera_id)?;
            let before = cameras[index].clone();

            let mut after = before.clone();
            if let Some(name) = update.name {
                after.name = name.trim().to_string();
            }
            if let Some(source_url) = update.source_url {
                after.source_url = source_url;
            }
            if let Some(target_fps) = update.target_fps {
                after.target_fps = target_fps;
            }
            if let Some(active) = update.active {
                after.active = active;
            }

            validate(&after)?;
            ensure_unique_name(&cameras, &after.name, Some(camera_id))?;
            cameras[index] = after.clone();
            (before, after)
        };

        debug!("Updated camera {}: {:?} -> {:?}", camera_id, before, after);

        if before.source_url != after.source_url
            || before.target_fps != after.target_fps
            || before.name != after.name
        {
            self.emit(RegistryChange::ConfigChanged(camera_id.to_string()));
        }
        if before.active != after.active {
            self.emit(active_change(camera_id, after.active));
        }

        Ok(after)
    }

    pub fn set_active(&self, camera_id: &str, active: bool) -> Result<CameraConfig, RegistryError> {
        self.update(
            camera_id,
            CameraUpdate {
                active: Some(active),
                ..Default::default()
            },
        )
    }

    pub fn delete(&self, camera_id: &str) -> Result<CameraConfig, RegistryError> {
        let removed = {
            let mut cameras = self.cameras.write();
            let index = position(&cameras, camera_id)?;
            cameras.remove(index)
        };

        info!("Deleted camera {} ({})", removed.id, removed.name);
        self.emit(RegistryChange::Deleted(camera_id.to_string()));
        Ok(removed)
    }

    fn emit(&self, change: RegistryChange) {
        // Nobody listening is fine
        let _ = self.changes.send(change);
    }
}

impl Default for InMemoryCameraRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraRegistry for InMemoryCameraRegistry {
    async fn list(&self) -> Vec<CameraConfig> {
        self.cameras.read().clone()
    }

    async fn get(&self, camera_id: &str) -> Option<CameraConfig> {
        self.cameras.read().iter().find(|c| c.id == camera_id).cloned()
    }

    fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }
}

fn active_change(camera_id: &str, active: bool) -> RegistryChange {
    if active {
        RegistryChange::Activated(camera_id.to_string())
    } else {
        RegistryChange::Deactivated(camera_id.to_string())
    }
}

fn position(cameras: &[CameraConfig], camera_id: &str) -> Result<usize, RegistryError> {
    cameras
        .iter()
        .position(|c| c.id == camera_id)
        .ok_or_else(|| RegistryError::NotFound {
            camera_id: camera_id.to_string(),
        })
}

fn ensure_unique_name(
    cameras: &[CameraConfig],
    name: &str,
    except_id: Option<&str>,
) -> Result<(), RegistryError> {
    let taken = cameras
        .iter()
        .filter(|c| Some(c.id.as_str()) != except_id)
        .any(|c| c.name.eq_ignore_ascii_case(name));

    if taken {
        return Err(RegistryError::DuplicateName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn validate(camera: &CameraConfig) -> Result<(), RegistryError> {
    if camera.name.trim().is_empty() {
        return Err(RegistryError::InvalidConfig {
            details: "Camera name must not be empty".to_string(),
        });
    }

    camera.validate().map_err(|e| RegistryError::InvalidConfig {
        details: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_id_and_emits() {
        let registry = InMemoryCameraRegistry::new();
        let mut changes = registry.subscribe();

        let camera = registry.create(NewCamera::new("Gate", "fake://ok")).unwrap();
        assert!(uuid::Uuid::parse_str(&camera.id).is_ok());
        assert!(camera.active);
        assert_eq!(camera.target_fps, DEFAULT_TARGET_FPS);

        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Created(camera.id.clone()));
        assert_eq!(registry.get(&camera.id).await, Some(camera));
    }

    #[tokio::test]
    async fn test_names_are_unique_case_insensitively() {
        let registry = InMemoryCameraRegistry::new();
        let first = registry.create(NewCamera::new("Gate", "fake://a")).unwrap();
        let second = registry.create(NewCamera::new("Dock", "fake://b")).unwrap();

        assert_eq!(
            registry.create(NewCamera::new("gate", "fake://c")).unwrap_err(),
            RegistryError::DuplicateName {
                name: "gate".to_string()
            }
        );

        let rename = CameraUpdate {
            name: Some("GATE".to_string()),
            ..Default::default()
        };
        assert!(registry.update(&second.id, rename).is_err());

        // Renaming to its own name in another case is allowed
        let recase = CameraUpdate {
            name: Some("GATE".to_string()),
            ..Default::default()
        };
        assert_eq!(registry.update(&first.id, recase).unwrap().name, "GATE");
    }

    #[tokio::test]
    async fn test_update_emits_matching_changes() {
        let registry = InMemoryCameraRegistry::new();
        let camera = registry.create(NewCamera::new("Gate", "fake://a")).unwrap();
        let mut changes = registry.subscribe();

        let update = CameraUpdate {
            target_fps: Some(10),
            active: Some(false),
            ..Default::default()
        };
        let updated = registry.update(&camera.id, update).unwrap();
        assert_eq!(updated.target_fps, 10);
        assert!(!updated.active);

        assert_eq!(changes.recv().await.unwrap(), RegistryChange::ConfigChanged(camera.id.clone()));
        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Deactivated(camera.id.clone()));

        registry.set_active(&camera.id, true).unwrap();
        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Activated(camera.id.clone()));

        // No-op update emits nothing
        registry.set_active(&camera.id, true).unwrap();
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_updates_are_rejected() {
        let registry = InMemoryCameraRegistry::new();
        let camera = registry.create(NewCamera::new("Gate", "fake://a")).unwrap();

        let too_fast = CameraUpdate {
            target_fps: Some(120),
            ..Default::default()
        };
        assert!(matches!(
            registry.update(&camera.id, too_fast),
            Err(RegistryError::InvalidConfig { .. })
        ));
        assert_eq!(registry.get(&camera.id).await.unwrap().target_fps, DEFAULT_TARGET_FPS);

        assert!(matches!(
            registry.create(NewCamera::new("  ", "fake://b")),
            Err(RegistryError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_and_active_listing() {
        let registry = InMemoryCameraRegistry::with_cameras(vec![
            CameraConfig::new("c1", "Gate", "fake://a", 5),
            CameraConfig {
                active: false,
                ..CameraConfig::new("c2", "Dock", "fake://b", 5)
            },
        ])
        .unwrap();

        let active = registry.list_active_configs().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "c1");

        let mut changes = registry.subscribe();
        registry.delete("c1").unwrap();
        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Deleted("c1".to_string()));
        assert!(registry.get("c1").await.is_none());
        assert_eq!(
            registry.delete("c1").unwrap_err(),
            RegistryError::NotFound {
                camera_id: "c1".to_string()
            }
        );
    }

    #[test]
    fn test_seed_rejects_duplicate_names() {
        let result = InMemoryCameraRegistry::with_cameras(vec![
            CameraConfig::new("c1", "Gate", "fake://a", 5),
            CameraConfig::new("c2", "gate", "fake://b", 5),
        ]);
        assert!(result.is_err());
    }
}
