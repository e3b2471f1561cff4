//! Video sources: parsing of `source_url` values and the capture capability
//! used by stream workers.
//!
//! A [`SourceOpener`] turns a camera's `source_url` into an exclusively owned
//! [`CaptureHandle`]. The handle is released when it is dropped, so a worker
//! that lets its handle go out of scope can never leak the device.

#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
pub mod mock;
mod synthetic;

use crate::error::SourceError;
use crate::frame::FrameData;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstCapture;
pub use mock::{MockSourceOpener, MockSourceStats};
pub use synthetic::SyntheticCapture;

/// Where frames for a camera come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUrl {
    /// Local capture device index (`/dev/videoN`)
    Device(u32),
    /// RTSP network stream
    Rtsp(String),
    /// HTTP(S) stream, e.g. an MJPEG endpoint
    Http(String),
    /// Video file on disk
    File(String),
    /// In-process test pattern (`fake://...`)
    Synthetic(String),
}

impl SourceUrl {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(index) = raw.parse::<u32>() {
                return SourceUrl::Device(index);
            }
        }

        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("fake://") {
            SourceUrl::Synthetic(raw["fake://".len()..].to_string())
        } else if lower.starts_with("rtsp://") || lower.starts_with("rtsps://") {
            SourceUrl::Rtsp(raw.to_string())
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceUrl::Http(raw.to_string())
        } else if lower.starts_with("file://") {
            SourceUrl::File(raw["file://".len()..].to_string())
        } else {
            SourceUrl::File(raw.to_string())
        }
    }

    /// Live sources produce frames on their own clock; files do not
    pub fn is_live(&self) -> bool {
        !matches!(self, SourceUrl::File(_))
    }
}

impl fmt::Display for SourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceUrl::Device(index) => write!(f, "device {}", index),
            SourceUrl::Rtsp(url) | SourceUrl::Http(url) => write!(f, "{}", url),
            SourceUrl::File(path) => write!(f, "file {}", path),
            SourceUrl::Synthetic(name) => write!(f, "fake://{}", name),
        }
    }
}

/// An open video source, owned by exactly one stream worker.
///
/// Dropping the handle releases the underlying device or connection.
#[async_trait]
pub trait CaptureHandle: Send {
    /// Read the freshest available frame. Frames that queued up since the
    /// previous read are discarded.
    async fn read_frame(&mut self) -> Result<FrameData, SourceError>;
}

/// Capability that opens capture handles for a `source_url`
#[async_trait]
pub trait SourceOpener: Send + Sync {
    async fn open(&self, source_url: &str) -> Result<Box<dyn CaptureHandle>, SourceError>;
}

/// Encoding parameters shared by all real sources
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub frame_size: (u32, u32),
    pub jpeg_quality: u8,
    pub read_timeout: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frame_size: (640, 480),
            jpeg_quality: 80,
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&crate::config::WorkerConfig> for CaptureSettings {
    fn from(config: &crate::config::WorkerConfig) -> Self {
        Self {
            frame_size: config.frame_size,
            jpeg_quality: config.jpeg_quality,
            read_timeout: config.read_timeout(),
        }
    }
}

/// Opens synthetic sources in-process and everything else through GStreamer
pub struct DefaultSourceOpener {
    settings: CaptureSettings,
}

impl DefaultSourceOpener {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl SourceOpener for DefaultSourceOpener {
    async fn open(&self, source_url: &str) -> Result<Box<dyn CaptureHandle>, SourceError> {
        let source = SourceUrl::parse(source_url);
        debug!("Opening video source: {}", source);

        match source {
            SourceUrl::Synthetic(name) => {
                let capture = SyntheticCapture::open(&name, self.settings.frame_size)?;
                Ok(Box::new(capture))
            }
            other => self.open_pipeline(source_url, other).await,
        }
    }
}

impl DefaultSourceOpener {
    #[cfg(all(feature = "camera", target_os = "linux"))]
    async fn open_pipeline(
        &self,
        source_url: &str,
        source: SourceUrl,
    ) -> Result<Box<dyn CaptureHandle>, SourceError> {
        let settings = self.settings.clone();
        let url = source_url.to_string();

        // Pipeline negotiation blocks until the source prerolls
        let open = move || GstCapture::open(&url, &source, &settings);
        let capture = tokio::task::spawn_blocking(open)
            .await
            .map_err(|e| SourceError::Open {
                source_url: source_url.to_string(),
                details: format!("open task failed: {}", e),
            })??;

        Ok(Box::new(capture))
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    async fn open_pipeline(
        &self,
        source_url: &str,
        source: SourceUrl,
    ) -> Result<Box<dyn CaptureHandle>, SourceError> {
        Err(SourceError::Unsupported {
            source_url: source_url.to_string(),
            reason: format!(
                "{} requires the `camera` feature on Linux",
                source
            ),
        })
    }
}
