use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Viewer-side counters of the HTTP server
#[derive(Debug, Default)]
pub struct StreamStats {
    active_connections: AtomicU64,
    total_connections: AtomicU64,
    frames_streamed: AtomicU64,
    bytes_streamed: AtomicU64,
    keepalive_frames: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStatsSnapshot {
    pub active_connections: u64,
    pub total_connections: u64,
    pub frames_streamed: u64,
    pub bytes_streamed: u64,
    pub keepalive_frames: u64,
}

impl StreamStats {
    /// Count a new viewer until the returned guard is dropped
    pub fn connect(self: &Arc<Self>) -> ConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            stats: Arc::clone(self),
        }
    }

    pub fn record_frame(&self, bytes: usize, keepalive: bool) {
        self.frames_streamed.fetch_add(1, Ordering::Relaxed);
        self.bytes_streamed.fetch_add(bytes as u64, Ordering::Relaxed);
        if keepalive {
            self.keepalive_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            frames_streamed: self.frames_streamed.load(Ordering::Relaxed),
            bytes_streamed: self.bytes_streamed.load(Ordering::Relaxed),
            keepalive_frames: self.keepalive_frames.load(Ordering::Relaxed),
        }
    }
}

/// Held by a streaming response body for as long as the viewer is connected
pub struct ConnectionGuard {
    stats: Arc<StreamStats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.active_connections.fetch_sub(1, Ordering::Relaxed);
    }
}
