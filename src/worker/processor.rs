use crate::detector::{filter_by_confidence, ClassTaxonomy, Detector};
use crate::error::DetectorError;
use crate::frame::FrameData;
use crate::overlay::FrameAnnotator;
use crate::snapshot::{AlertSnapshot, FrameSnapshot};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Result of running one frame through detection and annotation
#[derive(Debug)]
pub enum ProcessOutcome {
    Detected {
        frame: FrameSnapshot,
        alerts: AlertSnapshot,
        detections: usize,
    },
    /// Detector failed; `frame` carries only the caption
    DetectorFailed {
        frame: FrameSnapshot,
        error: DetectorError,
    },
}

/// Detection, aggregation and annotation for a single frame. Shared by all
/// workers.
pub struct FrameProcessor {
    detector: Arc<dyn Detector>,
    taxonomy: ClassTaxonomy,
    annotator: FrameAnnotator,
    confidence_threshold: f32,
}

impl FrameProcessor {
    pub fn new(
        detector: Arc<dyn Detector>,
        taxonomy: ClassTaxonomy,
        annotator: FrameAnnotator,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            detector,
            taxonomy,
            annotator,
            confidence_threshold,
        }
    }

    pub fn taxonomy(&self) -> &ClassTaxonomy {
        &self.taxonomy
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Blocking: runs the model and the image encoder
    pub fn process(&self, frame: &FrameData, caption: &str) -> ProcessOutcome {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => filter_by_confidence(detections, self.confidence_threshold),
            Err(error) => {
                return ProcessOutcome::DetectorFailed {
                    frame: self.captioned_snapshot(frame, caption),
                    error,
                }
            }
        };

        let alerts = AlertSnapshot::aggregate(&detections, &self.taxonomy, Instant::now());

        let image = match self
            .annotator
            .annotate(frame, &detections, &alerts, &self.taxonomy, caption)
        {
            Ok(image) => image,
            Err(e) => {
                warn!("Failed to annotate frame {}: {}", frame.id, e);
                frame.data.clone()
            }
        };

        ProcessOutcome::Detected {
            frame: FrameSnapshot {
                image,
                frame_id: frame.id,
                width: frame.width,
                height: frame.height,
                captured_at: frame.captured_at,
            },
            alerts,
            detections: detections.len(),
        }
    }

    fn captioned_snapshot(&self, frame: &FrameData, caption: &str) -> FrameSnapshot {
        match self.annotator.caption_only(frame, caption) {
            Ok(image) => FrameSnapshot {
                image,
                ..raw_snapshot(frame)
            },
            Err(e) => {
                warn!("Failed to caption frame {}: {}", frame.id, e);
                raw_snapshot(frame)
            }
        }
    }

    /// Run [`process`](Self::process) on the blocking pool. A panicking
    /// detector is reported as a failure of this frame only.
    pub async fn process_blocking(
        self: &Arc<Self>,
        frame: FrameData,
        caption: String,
    ) -> ProcessOutcome {
        let processor = Arc::clone(self);
        let raw = raw_snapshot(&frame);

        match tokio::task::spawn_blocking(move || processor.process(&frame, &caption)).await {
            Ok(outcome) => outcome,
            Err(e) => ProcessOutcome::DetectorFailed {
                frame: raw,
                error: DetectorError::Panicked {
                    details: e.to_string(),
                },
            },
        }
    }
}

fn raw_snapshot(frame: &FrameData) -> FrameSnapshot {
    FrameSnapshot {
        image: frame.data.clone(),
        frame_id: frame.id,
        width: frame.width,
        height: frame.height,
        captured_at: frame.captured_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{BoundingBox, Detection, ScriptedDetector};
    use crate::frame::FrameFormat;

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn detect(&self, _frame: &FrameData) -> Result<Vec<Detection>, DetectorError> {
            panic!("model exploded");
        }
    }

    fn frame() -> FrameData {
        FrameData::new(3, vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9], 4, 4, FrameFormat::Mjpeg)
    }

    fn processor(detector: Arc<dyn Detector>) -> Arc<FrameProcessor> {
        Arc::new(FrameProcessor::new(
            detector,
            ClassTaxonomy::default(),
            FrameAnnotator::passthrough(),
            0.5,
        ))
    }

    #[tokio::test]
    async fn test_detections_are_filtered_and_aggregated() {
        let detector = ScriptedDetector::always(vec![
            Detection::new(6, BoundingBox::new(0.0, 0.0, 2.0, 2.0), 0.9),
            Detection::new(7, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.7),
            Detection::new(9, BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0.2),
        ]);

        match processor(Arc::new(detector)).process_blocking(frame(), "cam".into()).await {
            ProcessOutcome::Detected {
                frame,
                alerts,
                detections,
            } => {
                assert_eq!(frame.frame_id, 3);
                assert_eq!(detections, 2);
                assert_eq!(alerts.person_count, 1);
                assert_eq!(alerts.total_violations(), 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detector_error_keeps_raw_frame() {
        let outcome = processor(Arc::new(ScriptedDetector::failing("no model")))
            .process_blocking(frame(), "cam".into())
            .await;

        match outcome {
            ProcessOutcome::DetectorFailed { frame: snapshot, error } => {
                assert_eq!(snapshot.image, frame().data);
                assert!(matches!(error, DetectorError::Inference { .. }));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[cfg(feature = "annotation")]
    #[tokio::test]
    async fn test_detector_error_frame_is_resized() {
        use image::codecs::jpeg::JpegEncoder;
        use image::{Rgb, RgbImage};

        let img = RgbImage::from_pixel(64, 48, Rgb([10, 10, 10]));
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 80).encode_image(&img).unwrap();
        let source = FrameData::new(5, jpeg, 64, 48, FrameFormat::Mjpeg);

        let processor = Arc::new(FrameProcessor::new(
            Arc::new(ScriptedDetector::failing("no model")),
            ClassTaxonomy::default(),
            FrameAnnotator::new((128, 96), 80, "/nonexistent/font.ttf"),
            0.5,
        ));

        match processor.process_blocking(source, "Camera: Gate | FPS: 5".into()).await {
            ProcessOutcome::DetectorFailed { frame: snapshot, .. } => {
                assert_eq!(snapshot.frame_id, 5);
                let decoded = image::load_from_memory(&snapshot.image).unwrap();
                assert_eq!((decoded.width(), decoded.height()), (128, 96));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_detector_panic_is_contained() {
        let outcome = processor(Arc::new(PanickingDetector))
            .process_blocking(frame(), "cam".into())
            .await;

        assert!(matches!(
            outcome,
            ProcessOutcome::DetectorFailed {
                error: DetectorError::Panicked { .. },
                ..
            }
        ));
    }
}
