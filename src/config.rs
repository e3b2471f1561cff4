use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Lowest and highest detection rate a camera may request
pub const MIN_TARGET_FPS: u32 = 1;
pub const MAX_TARGET_FPS: u32 = 30;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EpiguardConfig {
    pub server: ServerConfig,
    pub worker: WorkerConfig,
    pub detector: DetectorConfig,
    /// Cameras seeded into the registry at startup
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Re-emit interval for MJPEG clients while the frame is unchanged
    #[serde(default = "default_stream_keepalive_ms")]
    pub stream_keepalive_ms: u64,

    /// Allow cross-origin requests from any dashboard host
    #[serde(default = "default_cors_allow_any")]
    pub cors_allow_any: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkerConfig {
    /// First retry delay after a source failure
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound for the retry delay
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Maximum time a single capture read may block
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Time a worker gets to release its source after a stop request
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// JPEG quality of annotated frames
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Frame size used for annotation (width, height)
    #[serde(default = "default_frame_size")]
    pub frame_size: (u32, u32),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Detections below this confidence are discarded
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// TrueType font used for box labels and panels
    #[serde(default = "default_font_path")]
    pub font_path: String,
}

/// A camera record as held by the camera registry
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Stable unique identifier; generated when omitted
    #[serde(default = "generate_camera_id")]
    pub id: String,

    pub name: String,

    /// Device index, file path, or RTSP/HTTP URL
    pub source_url: String,

    /// Detection rate (1-30)
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,

    #[serde(default = "default_camera_active")]
    pub active: bool,
}

impl CameraConfig {
    pub fn new<S: Into<String>>(id: S, name: S, source_url: S, target_fps: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source_url: source_url.into(),
            target_fps,
            active: true,
        }
    }

    /// Minimum spacing between two processed frames
    pub fn target_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.target_fps.clamp(MIN_TARGET_FPS, MAX_TARGET_FPS) as u64)
    }

    /// Whether moving from `self` to `other` needs a fresh worker
    pub fn requires_restart(&self, other: &CameraConfig) -> bool {
        self.source_url != other.source_url || self.target_fps != other.target_fps
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Message("Camera id must not be empty".to_string()));
        }

        if self.source_url.trim().is_empty() {
            return Err(ConfigError::Message(format!(
                "Camera '{}' source_url must not be empty",
                self.id
            )));
        }

        if !(MIN_TARGET_FPS..=MAX_TARGET_FPS).contains(&self.target_fps) {
            return Err(ConfigError::Message(format!(
                "Camera '{}' target_fps must be between {} and {}",
                self.id, MIN_TARGET_FPS, MAX_TARGET_FPS
            )));
        }

        Ok(())
    }
}

impl WorkerConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl EpiguardConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("epiguard.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port() as i64)?
            .set_default(
                "server.stream_keepalive_ms",
                default_stream_keepalive_ms() as i64,
            )?
            .set_default("server.cors_allow_any", default_cors_allow_any())?
            .set_default("worker.backoff_base_ms", default_backoff_base_ms() as i64)?
            .set_default("worker.backoff_max_ms", default_backoff_max_ms() as i64)?
            .set_default("worker.read_timeout_ms", default_read_timeout_ms() as i64)?
            .set_default("worker.stop_grace_ms", default_stop_grace_ms() as i64)?
            .set_default("worker.jpeg_quality", default_jpeg_quality() as i64)?
            .set_default(
                "worker.frame_size",
                vec![default_frame_size().0 as i64, default_frame_size().1 as i64],
            )?
            .set_default(
                "detector.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default("detector.font_path", default_font_path())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. EPIGUARD_SERVER__PORT=9090
            .add_source(
                Environment::with_prefix("EPIGUARD")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: EpiguardConfig = settings.try_deserialize()?;

        info!(
            "Configuration loaded successfully ({} seeded cameras)",
            config.cameras.len()
        );
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.server.stream_keepalive_ms == 0 {
            return Err(ConfigError::Message(
                "Stream keepalive must be greater than 0".to_string(),
            ));
        }

        if self.worker.backoff_base_ms == 0 {
            return Err(ConfigError::Message(
                "Worker backoff_base_ms must be greater than 0".to_string(),
            ));
        }

        if self.worker.backoff_max_ms < self.worker.backoff_base_ms {
            return Err(ConfigError::Message(
                "Worker backoff_max_ms must not be smaller than backoff_base_ms".to_string(),
            ));
        }

        if self.worker.read_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Worker read_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.worker.jpeg_quality == 0 || self.worker.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Worker jpeg_quality must be between 1 and 100".to_string(),
            ));
        }

        if self.worker.frame_size.0 == 0 || self.worker.frame_size.1 == 0 {
            return Err(ConfigError::Message(
                "Worker frame_size must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(ConfigError::Message(
                "Detector confidence_threshold must be between 0 and 1".to_string(),
            ));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for camera in &self.cameras {
            camera.validate()?;

            if !ids.insert(camera.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate camera id '{}'",
                    camera.id
                )));
            }

            if !names.insert(camera.name.to_lowercase()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate camera name '{}'",
                    camera.name
                )));
            }
        }

        Ok(())
    }
}

impl Default for EpiguardConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                ip: default_server_ip(),
                port: default_server_port(),
                stream_keepalive_ms: default_stream_keepalive_ms(),
                cors_allow_any: default_cors_allow_any(),
            },
            worker: WorkerConfig {
                backoff_base_ms: default_backoff_base_ms(),
                backoff_max_ms: default_backoff_max_ms(),
                read_timeout_ms: default_read_timeout_ms(),
                stop_grace_ms: default_stop_grace_ms(),
                jpeg_quality: default_jpeg_quality(),
                frame_size: default_frame_size(),
            },
            detector: DetectorConfig {
                confidence_threshold: default_confidence_threshold(),
                font_path: default_font_path(),
            },
            cameras: Vec::new(),
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    8000
}
fn default_stream_keepalive_ms() -> u64 {
    1000
}
fn default_cors_allow_any() -> bool {
    true
}

fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_read_timeout_ms() -> u64 {
    5000
}
fn default_stop_grace_ms() -> u64 {
    3000
}
fn default_jpeg_quality() -> u8 {
    80
}
fn default_frame_size() -> (u32, u32) {
    (640, 480)
}

fn default_confidence_threshold() -> f32 {
    0.5
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}

fn generate_camera_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
fn default_target_fps() -> u32 {
    5
}
fn default_camera_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EpiguardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.worker.backoff_base(), Duration::from_secs(1));
        assert!(config.cameras.is_empty());
    }

    #[test]
    fn test_target_interval() {
        let camera = CameraConfig::new("c1", "Gate", "fake://ok", 5);
        assert_eq!(camera.target_interval(), Duration::from_millis(200));

        let camera = CameraConfig::new("c2", "Dock", "fake://ok", 30);
        assert_eq!(camera.target_interval(), Duration::from_millis(33));
    }

    #[test]
    fn test_requires_restart() {
        let camera = CameraConfig::new("c1", "Gate", "fake://ok", 5);

        let mut renamed = camera.clone();
        renamed.name = "Main gate".to_string();
        assert!(!camera.requires_restart(&renamed));

        let mut faster = camera.clone();
        faster.target_fps = 10;
        assert!(camera.requires_restart(&faster));

        let mut moved = camera.clone();
        moved.source_url = "rtsp://10.0.0.5/stream".to_string();
        assert!(camera.requires_restart(&moved));
    }

    #[test]
    fn test_config_validation() {
        let mut config = EpiguardConfig::default();
        config.worker.backoff_max_ms = 10;
        assert!(config.validate().is_err());

        config.worker.backoff_max_ms = 30_000;
        assert!(config.validate().is_ok());

        config.cameras.push(CameraConfig::new("c1", "Gate", "0", 31));
        assert!(config.validate().is_err());

        config.cameras[0].target_fps = 5;
        assert!(config.validate().is_ok());

        config.cameras.push(CameraConfig::new("c2", "GATE", "1", 5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_with_cameras() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[worker]
backoff_base_ms = 250

[[cameras]]
id = "c1"
name = "Loading dock"
source_url = "rtsp://10.0.0.5/stream"
target_fps = 10

[[cameras]]
name = "Webcam"
source_url = "0"
active = false
"#
        )
        .unwrap();

        let config = EpiguardConfig::load_from_file(file.path()).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.ip, "0.0.0.0");
        assert_eq!(config.worker.backoff_base_ms, 250);
        assert_eq!(config.worker.backoff_max_ms, 30_000);
        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.cameras[0].id, "c1");
        assert_eq!(config.cameras[0].target_fps, 10);
        assert!(config.cameras[0].active);
        assert!(!config.cameras[1].id.is_empty());
        assert_eq!(config.cameras[1].target_fps, 5);
        assert!(!config.cameras[1].active);
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let rendered = toml::to_string_pretty(&EpiguardConfig::default()).unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("backoff_base_ms = 1000"));
    }
}
