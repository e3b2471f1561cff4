use crate::detector::{ClassCategory, ClassTaxonomy, Detection};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Latest annotated frame of a camera
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    /// Encoded image (JPEG)
    pub image: Bytes,
    /// Source frame sequence number
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture time of the source frame
    pub captured_at: Instant,
}

/// Detections of one class that denote a missing PPE item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationCount {
    pub class_id: u32,
    pub count: u32,
}

/// Compliance summary of the latest processed frame.
///
/// Serializes to the wire format polled by the dashboard:
/// `{person_count, epi_count, has_violations, violations: [{class_id, count}]}`.
#[derive(Debug, Clone, Serialize)]
pub struct AlertSnapshot {
    pub person_count: u32,
    pub epi_count: u32,
    pub has_violations: bool,
    /// Ordered by class id
    pub violations: Vec<ViolationCount>,
    #[serde(skip)]
    pub computed_at: Instant,
}

impl AlertSnapshot {
    /// Snapshot with no people, no PPE and no violations
    pub fn empty(computed_at: Instant) -> Self {
        Self {
            person_count: 0,
            epi_count: 0,
            has_violations: false,
            violations: Vec::new(),
            computed_at,
        }
    }

    /// Partition detections into people, present PPE items and violations.
    ///
    /// Class ids missing from the taxonomy are counted as violations so that
    /// newly trained classes show up before they are mapped.
    pub fn aggregate(
        detections: &[Detection],
        taxonomy: &ClassTaxonomy,
        computed_at: Instant,
    ) -> Self {
        let mut person_count = 0;
        let mut epi_count = 0;
        let mut violations: BTreeMap<u32, u32> = BTreeMap::new();

        for detection in detections {
            match taxonomy.category(detection.class_id) {
                ClassCategory::Person => person_count += 1,
                ClassCategory::PpeItem => epi_count += 1,
                ClassCategory::Violation | ClassCategory::Unmapped => {
                    *violations.entry(detection.class_id).or_insert(0) += 1;
                }
            }
        }

        let violations: Vec<ViolationCount> = violations
            .into_iter()
            .map(|(class_id, count)| ViolationCount { class_id, count })
            .collect();

        Self {
            person_count,
            epi_count,
            has_violations: !violations.is_empty(),
            violations,
            computed_at,
        }
    }

    pub fn total_violations(&self) -> u32 {
        self.violations.iter().map(|v| v.count).sum()
    }
}
