use super::{Detection, Detector};
use crate::error::DetectorError;
use crate::frame::FrameData;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic detector for tests.
///
/// Queued results are returned one per call; once the queue is empty the
/// fallback result is returned for every frame.
#[derive(Debug)]
pub struct ScriptedDetector {
    queued: Mutex<VecDeque<Result<Vec<Detection>, DetectorError>>>,
    fallback: Mutex<Result<Vec<Detection>, DetectorError>>,
    calls: AtomicU64,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::always(Vec::new())
    }

    /// Return `detections` for every frame
    pub fn always(detections: Vec<Detection>) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Ok(detections)),
            calls: AtomicU64::new(0),
        }
    }

    /// Fail every frame
    pub fn failing(details: &str) -> Self {
        let detector = Self::new();
        detector.set_fallback(Err(DetectorError::Inference {
            details: details.to_string(),
        }));
        detector
    }

    pub fn push_result(&self, result: Result<Vec<Detection>, DetectorError>) {
        self.queued.lock().push_back(result);
    }

    pub fn set_fallback(&self, result: Result<Vec<Detection>, DetectorError>) {
        *self.fallback.lock() = result;
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, _frame: &FrameData) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(result) = self.queued.lock().pop_front() {
            return result;
        }
        self.fallback.lock().clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
