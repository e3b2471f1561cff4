//! Object detection capability consumed by stream workers.
//!
//! The model itself is opaque: anything that maps a frame to a list of
//! [`Detection`]s can be plugged in through the [`Detector`] trait.

pub mod mock;
mod taxonomy;

use crate::error::DetectorError;
use crate::frame::FrameData;
use serde::{Deserialize, Serialize};

pub use mock::ScriptedDetector;
pub use taxonomy::{ClassCategory, ClassInfo, ClassTaxonomy};

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Rescale from one frame size to another
    pub fn scaled(&self, from: (u32, u32), to: (u32, u32)) -> Self {
        if from.0 == 0 || from.1 == 0 {
            return *self;
        }
        let sx = to.0 as f32 / from.0 as f32;
        let sy = to.1 as f32 / from.1 as f32;
        Self::new(self.x1 * sx, self.y1 * sy, self.x2 * sx, self.y2 * sy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Detection {
    pub fn new(class_id: u32, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            class_id,
            bbox,
            confidence,
        }
    }
}

/// Frame in, detections out. Implementations must be callable from several
/// workers at once.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &FrameData) -> Result<Vec<Detection>, DetectorError>;

    fn name(&self) -> &str {
        "detector"
    }
}

/// Used when no model is configured: every frame is clean
#[derive(Debug, Default, Clone)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _frame: &FrameData) -> Result<Vec<Detection>, DetectorError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "null"
    }
}

/// Drop detections below `threshold`
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}
