use super::types::{ComponentState, ShutdownReason};
use crate::access::StreamAccess;
use crate::config::EpiguardConfig;
use crate::coordinator::DetectionCoordinator;
use crate::detector::{ClassTaxonomy, Detector, NullDetector};
use crate::error::Result;
use crate::manager::WorkerManager;
use crate::overlay::FrameAnnotator;
use crate::publisher::FramePublisher;
use crate::registry::InMemoryCameraRegistry;
use crate::source::{CaptureSettings, DefaultSourceOpener, SourceOpener};
use crate::streaming::{StreamServer, StreamServerBuilder};
use crate::worker::{BackoffPolicy, FrameProcessor, WorkerContext};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TRANSITION_CHANNEL_CAPACITY: usize = 256;

/// Owns every long-lived component of the service
pub struct EpiguardApp {
    pub(super) config: EpiguardConfig,
    pub(super) registry: Arc<InMemoryCameraRegistry>,
    pub(super) manager: Arc<WorkerManager>,
    pub(super) coordinator: Arc<DetectionCoordinator>,
    pub(super) server: Arc<StreamServer>,

    // Background tasks
    pub(super) watcher_task: Option<JoinHandle<()>>,
    pub(super) server_task: Option<JoinHandle<Result<()>>>,
    pub(super) local_addr: Option<SocketAddr>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl EpiguardApp {
    /// Build the service with real capture sources and the configured detector
    pub fn new(config: EpiguardConfig) -> Result<Self> {
        let opener = Arc::new(DefaultSourceOpener::new(CaptureSettings::from(
            &config.worker,
        )));
        Self::with_components(config, opener, Arc::new(NullDetector))
    }

    /// Build the service around an explicit source opener and detector
    pub fn with_components(
        config: EpiguardConfig,
        opener: Arc<dyn SourceOpener>,
        detector: Arc<dyn Detector>,
    ) -> Result<Self> {
        let registry = Arc::new(InMemoryCameraRegistry::with_cameras(
            config.cameras.clone(),
        )?);

        let annotator = FrameAnnotator::new(
            config.worker.frame_size,
            config.worker.jpeg_quality,
            &config.detector.font_path,
        );
        let processor = Arc::new(FrameProcessor::new(
            detector,
            ClassTaxonomy::ppe_default(),
            annotator,
            config.detector.confidence_threshold,
        ));

        let (transitions, _) = broadcast::channel(TRANSITION_CHANNEL_CAPACITY);
        let ctx = WorkerContext {
            opener,
            processor,
            backoff: BackoffPolicy::from(&config.worker),
            read_timeout: config.worker.read_timeout(),
            stop_grace: config.worker.stop_grace(),
            transitions,
        };

        let publisher = Arc::new(FramePublisher::new());
        let manager = Arc::new(WorkerManager::new(ctx, publisher));
        let coordinator = Arc::new(DetectionCoordinator::new(
            registry.clone(),
            Arc::clone(&manager),
        ));

        let access = StreamAccess::new(registry.clone(), Arc::clone(&manager));
        let server = StreamServerBuilder::new()
            .config(config.server.clone())
            .access(access)
            .build()?;

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            registry,
            manager,
            coordinator,
            server: Arc::new(server),
            watcher_task: None,
            server_task: None,
            local_addr: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &EpiguardConfig {
        &self.config
    }

    /// Registry for camera CRUD; mutations are picked up by the watcher
    pub fn registry(&self) -> &Arc<InMemoryCameraRegistry> {
        &self.registry
    }

    pub fn manager(&self) -> &Arc<WorkerManager> {
        &self.manager
    }

    pub fn coordinator(&self) -> &Arc<DetectionCoordinator> {
        &self.coordinator
    }

    /// Address the HTTP server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}
