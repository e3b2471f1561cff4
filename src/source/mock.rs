//! Scriptable source for tests: counts opens, reads and live handles, and
//! fails on demand.

use super::{CaptureHandle, SourceOpener};
use crate::error::SourceError;
use crate::frame::{FrameData, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Minimal JPEG payload (SOI, APP0 stub, EOI)
const MOCK_JPEG: &[u8] = &[
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0xFF, 0xD9,
];

/// Counters observed by tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockSourceStats {
    pub opens: u64,
    pub open_failures: u64,
    pub reads: u64,
    pub read_failures: u64,
    pub live_handles: u64,
}

#[derive(Debug, Default)]
struct MockScript {
    fail_next_opens: u32,
    fail_next_reads: u32,
    always_fail_open: bool,
    hang_reads: bool,
    opened_urls: Vec<String>,
}

#[derive(Debug, Default)]
struct MockShared {
    script: Mutex<MockScript>,
    opens: AtomicU64,
    open_failures: AtomicU64,
    reads: AtomicU64,
    read_failures: AtomicU64,
    live_handles: AtomicU64,
}

/// Opener whose handles are driven by a shared script
#[derive(Debug, Clone, Default)]
pub struct MockSourceOpener {
    shared: Arc<MockShared>,
}

impl MockSourceOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` open attempts
    pub fn fail_next_opens(&self, count: u32) {
        self.shared.script.lock().fail_next_opens = count;
    }

    /// Fail the next `count` reads across all handles
    pub fn fail_next_reads(&self, count: u32) {
        self.shared.script.lock().fail_next_reads = count;
    }

    pub fn always_fail_open(&self, fail: bool) {
        self.shared.script.lock().always_fail_open = fail;
    }

    /// Make reads block until the reader is cancelled
    pub fn hang_reads(&self, hang: bool) {
        self.shared.script.lock().hang_reads = hang;
    }

    /// Every URL passed to `open`, in order
    pub fn opened_urls(&self) -> Vec<String> {
        self.shared.script.lock().opened_urls.clone()
    }

    pub fn stats(&self) -> MockSourceStats {
        MockSourceStats {
            opens: self.shared.opens.load(Ordering::SeqCst),
            open_failures: self.shared.open_failures.load(Ordering::SeqCst),
            reads: self.shared.reads.load(Ordering::SeqCst),
            read_failures: self.shared.read_failures.load(Ordering::SeqCst),
            live_handles: self.shared.live_handles.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl SourceOpener for MockSourceOpener {
    async fn open(&self, source_url: &str) -> Result<Box<dyn CaptureHandle>, SourceError> {
        let fail = {
            let mut script = self.shared.script.lock();
            script.opened_urls.push(source_url.to_string());

            if script.always_fail_open {
                true
            } else if script.fail_next_opens > 0 {
                script.fail_next_opens -= 1;
                true
            } else {
                false
            }
        };

        if fail {
            self.shared.open_failures.fetch_add(1, Ordering::SeqCst);
            return Err(SourceError::Open {
                source_url: source_url.to_string(),
                details: "mock open failure".to_string(),
            });
        }

        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        self.shared.live_handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockCapture {
            shared: Arc::clone(&self.shared),
            frame_counter: 0,
        }))
    }
}

struct MockCapture {
    shared: Arc<MockShared>,
    frame_counter: u64,
}

#[async_trait]
impl CaptureHandle for MockCapture {
    async fn read_frame(&mut self) -> Result<FrameData, SourceError> {
        self.shared.reads.fetch_add(1, Ordering::SeqCst);

        let (hang, fail) = {
            let mut script = self.shared.script.lock();
            let fail = if script.fail_next_reads > 0 {
                script.fail_next_reads -= 1;
                true
            } else {
                false
            };
            (script.hang_reads, fail)
        };

        if hang {
            std::future::pending::<()>().await;
        }

        if fail {
            self.shared.read_failures.fetch_add(1, Ordering::SeqCst);
            return Err(SourceError::Read {
                details: "mock read failure".to_string(),
            });
        }

        let frame_id = self.frame_counter;
        self.frame_counter += 1;
        Ok(FrameData::new(
            frame_id,
            MOCK_JPEG.to_vec(),
            2,
            2,
            FrameFormat::Mjpeg,
        ))
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        self.shared.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
