pub mod access;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod frame;
pub mod manager;
pub mod overlay;
pub mod publisher;
pub mod registry;
pub mod snapshot;
pub mod source;
pub mod worker;

#[cfg(feature = "streaming")]
pub mod app;

#[cfg(feature = "streaming")]
pub mod streaming;

#[cfg(test)]
mod test_support;

pub use access::{FrameStream, StreamAccess, StreamStatus};
pub use config::{CameraConfig, EpiguardConfig};
pub use coordinator::DetectionCoordinator;
pub use detector::{ClassTaxonomy, Detection, Detector, NullDetector};
pub use error::{EpiguardError, Result};
pub use frame::{FrameData, FrameFormat};
pub use manager::{ReconcileReport, WorkerManager};
pub use publisher::{FramePublisher, PublishedSnapshot};
pub use registry::{CameraRegistry, InMemoryCameraRegistry, RegistryChange};
pub use snapshot::{AlertSnapshot, FrameSnapshot, ViolationCount};
pub use source::{CaptureHandle, DefaultSourceOpener, SourceOpener};
pub use worker::{LifecycleState, WorkerStatus};

#[cfg(feature = "streaming")]
pub use app::{ComponentState, EpiguardApp, ShutdownReason};

#[cfg(feature = "streaming")]
pub use streaming::{StreamServer, StreamServerBuilder, StreamStats};
