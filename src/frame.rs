use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};

/// Pixel encoding of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// JPEG encoded, as produced by every capture pipeline
    Mjpeg,
    /// Packed 8-bit RGB
    Rgb24,
}

impl FrameFormat {
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }
}

/// A frame read from a capture source
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Per-source sequence number
    pub id: u64,
    pub timestamp: SystemTime,
    /// Monotonic capture time; orders frames of one camera
    pub captured_at: Instant,
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            captured_at: Instant::now(),
            data: data.into(),
            width,
            height,
            format,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// SOI and EOI markers present. Cheap sanity check for pipeline output.
    pub fn looks_like_jpeg(&self) -> bool {
        let data = self.data.as_ref();
        self.format.is_compressed()
            && data.len() >= 4
            && data.starts_with(&[0xFF, 0xD8])
            && data.ends_with(&[0xFF, 0xD9])
    }
}
