//! Last-value publication of frames and alerts.
//!
//! Each camera id owns an isolated [`SnapshotCell`]. The cell is written by a
//! single stream worker and read by any number of viewers. Frame and alert
//! snapshots are swapped together, so a reader never sees a frame from one
//! detection pass next to alerts from another.

use crate::error::AccessError;
use crate::snapshot::{AlertSnapshot, FrameSnapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, trace};

/// A frame together with the alerts computed for it
#[derive(Debug, Clone)]
pub struct PublishedSnapshot {
    /// Increases by one on every publish of the owning cell
    pub sequence: u64,
    pub frame: FrameSnapshot,
    /// `None` until the detector has succeeded at least once
    pub alerts: Option<AlertSnapshot>,
}

pub type SnapshotReceiver = watch::Receiver<Option<Arc<PublishedSnapshot>>>;

/// Per-camera last-value cell
#[derive(Debug)]
pub struct SnapshotCell {
    camera_id: String,
    tx: watch::Sender<Option<Arc<PublishedSnapshot>>>,
    sequence: AtomicU64,
}

impl SnapshotCell {
    pub fn new<S: Into<String>>(camera_id: S) -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            camera_id: camera_id.into(),
            tx,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Atomically replace both snapshots
    pub fn publish(&self, frame: FrameSnapshot, alerts: AlertSnapshot) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.tx.send_replace(Some(Arc::new(PublishedSnapshot {
            sequence,
            frame,
            alerts: Some(alerts),
        })));

        trace!("Published snapshot {} for camera {}", sequence, self.camera_id);
        sequence
    }

    /// Replace the frame but keep the alerts of the last successful pass
    pub fn publish_frame(&self, frame: FrameSnapshot) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.tx.send_modify(|slot| {
            let alerts = slot.as_ref().and_then(|s| s.alerts.clone());
            *slot = Some(Arc::new(PublishedSnapshot {
                sequence,
                frame,
                alerts,
            }));
        });

        trace!(
            "Published frame-only snapshot {} for camera {}",
            sequence,
            self.camera_id
        );
        sequence
    }

    /// Current pair, if anything has been published since the last clear
    pub fn read(&self) -> Option<Arc<PublishedSnapshot>> {
        self.tx.borrow().clone()
    }

    /// Drop the published pair; reads report "not available" afterwards
    pub fn clear(&self) {
        self.tx.send_replace(None);
        debug!("Cleared snapshots for camera {}", self.camera_id);
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Index of snapshot cells by camera id. Cells are added and removed only by
/// the worker manager; viewers only read.
#[derive(Debug, Default)]
pub struct FramePublisher {
    cells: RwLock<HashMap<String, Arc<SnapshotCell>>>,
}

impl FramePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cell for a camera, creating it on first use. Existing cells are
    /// reused so open viewer streams survive a worker restart.
    pub fn register(&self, camera_id: &str) -> Arc<SnapshotCell> {
        if let Some(cell) = self.cells.read().get(camera_id) {
            return Arc::clone(cell);
        }

        let mut cells = self.cells.write();
        Arc::clone(
            cells
                .entry(camera_id.to_string())
                .or_insert_with(|| Arc::new(SnapshotCell::new(camera_id))),
        )
    }

    /// Remove a camera's cell. Viewer streams end once the owning worker has
    /// released its reference too.
    pub fn remove(&self, camera_id: &str) -> bool {
        match self.cells.write().remove(camera_id) {
            Some(cell) => {
                cell.clear();
                debug!("Removed snapshot cell for camera {}", camera_id);
                true
            }
            None => false,
        }
    }

    pub fn cell(&self, camera_id: &str) -> Option<Arc<SnapshotCell>> {
        self.cells.read().get(camera_id).cloned()
    }

    pub fn publish(
        &self,
        camera_id: &str,
        frame: FrameSnapshot,
        alerts: AlertSnapshot,
    ) -> Result<u64, AccessError> {
        let cell = self
            .cell(camera_id)
            .ok_or_else(|| AccessError::unavailable(camera_id))?;
        Ok(cell.publish(frame, alerts))
    }

    pub fn read(&self, camera_id: &str) -> Option<Arc<PublishedSnapshot>> {
        self.cell(camera_id).and_then(|cell| cell.read())
    }

    pub fn read_frame(&self, camera_id: &str) -> Option<FrameSnapshot> {
        self.read(camera_id).map(|s| s.frame.clone())
    }

    pub fn read_alerts(&self, camera_id: &str) -> Option<AlertSnapshot> {
        self.read(camera_id).and_then(|s| s.alerts.clone())
    }

    pub fn clear(&self, camera_id: &str) {
        if let Some(cell) = self.cell(camera_id) {
            cell.clear();
        }
    }

    pub fn subscribe(&self, camera_id: &str) -> Option<SnapshotReceiver> {
        self.cell(camera_id).map(|cell| cell.subscribe())
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.cells.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Instant;

    fn frame(id: u64) -> FrameSnapshot {
        FrameSnapshot {
            image: Bytes::from(vec![id as u8; 8]),
            frame_id: id,
            width: 2,
            height: 2,
            captured_at: Instant::now(),
        }
    }

    fn alerts(people: u32) -> AlertSnapshot {
        let mut snapshot = AlertSnapshot::empty(Instant::now());
        snapshot.person_count = people;
        snapshot
    }

    #[test]
    fn test_reads_before_publish_are_unavailable() {
        let publisher = FramePublisher::new();
        assert!(publisher.read_frame("c1").is_none());

        publisher.register("c1");
        assert!(publisher.read_frame("c1").is_none());
        assert!(publisher.read_alerts("c1").is_none());
        assert_eq!(
            publisher.publish("c2", frame(0), alerts(0)).unwrap_err(),
            AccessError::unavailable("c2")
        );
    }

    #[test]
    fn test_publish_swaps_pair() {
        let publisher = FramePublisher::new();
        publisher.register("c1");

        assert_eq!(publisher.publish("c1", frame(1), alerts(1)).unwrap(), 1);
        assert_eq!(publisher.publish("c1", frame(2), alerts(2)).unwrap(), 2);

        let snapshot = publisher.read("c1").unwrap();
        assert_eq!(snapshot.sequence, 2);
        assert_eq!(snapshot.frame.frame_id, 2);
        assert_eq!(snapshot.alerts.as_ref().unwrap().person_count, 2);
    }

    #[test]
    fn test_frame_only_publish_keeps_alerts() {
        let cell = SnapshotCell::new("c1");
        cell.publish_frame(frame(1));
        assert!(cell.read().unwrap().alerts.is_none());

        cell.publish(frame(2), alerts(3));
        cell.publish_frame(frame(3));

        let snapshot = cell.read().unwrap();
        assert_eq!(snapshot.frame.frame_id, 3);
        assert_eq!(snapshot.alerts.as_ref().unwrap().person_count, 3);
    }

    #[test]
    fn test_clear_and_remove() {
        let publisher = FramePublisher::new();
        let cell = publisher.register("c1");
        cell.publish(frame(1), alerts(1));

        publisher.clear("c1");
        assert!(publisher.read("c1").is_none());

        cell.publish(frame(2), alerts(1));
        assert!(publisher.remove("c1"));
        assert!(publisher.cell("c1").is_none());
        assert!(!publisher.remove("c1"));
    }

    #[test]
    fn test_register_reuses_cell() {
        let publisher = FramePublisher::new();
        let first = publisher.register("c1");
        let second = publisher.register("c1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(publisher.camera_ids(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_monotonic_sequences() {
        let publisher = Arc::new(FramePublisher::new());
        let cell = publisher.register("c1");

        let mut readers = Vec::new();
        for _ in 0..8 {
            let publisher = Arc::clone(&publisher);
            readers.push(tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..500 {
                    if let Some(snapshot) = publisher.read("c1") {
                        assert!(snapshot.sequence >= last);
                        assert_eq!(snapshot.frame.frame_id, snapshot.sequence);
                        last = snapshot.sequence;
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for id in 1..=500u64 {
            cell.publish(frame(id), alerts(0));
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }
}
