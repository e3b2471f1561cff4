use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpiguardError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Stream server error: {0}")]
    Stream(#[from] StreamError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl EpiguardError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether the system can keep running after this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            EpiguardError::Source(_) | EpiguardError::Detector(_) => true,
            EpiguardError::Access(_) | EpiguardError::Registry(_) => true,
            EpiguardError::Stream(StreamError::ConnectionLost { .. }) => true,
            EpiguardError::Component { .. } => true,
            EpiguardError::Config(_)
            | EpiguardError::Io(_)
            | EpiguardError::Serialization(_)
            | EpiguardError::Stream(_)
            | EpiguardError::System { .. } => false,
        }
    }
}

/// Failures opening or reading a video source. These drive the worker's
/// retry cycle and are never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Failed to open source '{source_url}': {details}")]
    Open { source_url: String, details: String },

    #[error("Failed to read frame: {details}")]
    Read { details: String },

    #[error("No frame received within {timeout:?}")]
    ReadTimeout { timeout: Duration },

    #[error("Source reached end of stream")]
    EndOfStream,

    #[error("Unsupported source '{source_url}': {reason}")]
    Unsupported { source_url: String, reason: String },
}

impl SourceError {
    /// True when the failure happened while opening rather than mid-stream
    pub fn is_open_failure(&self) -> bool {
        matches!(self, SourceError::Open { .. } | SourceError::Unsupported { .. })
    }
}

/// Per-frame model invocation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("Inference failed: {details}")]
    Inference { details: String },

    #[error("Detector task panicked: {details}")]
    Panicked { details: String },
}

/// Typed results surfaced to Access Layer callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Camera '{camera_id}' not found")]
    NotFound { camera_id: String },

    #[error("Camera '{camera_id}' has no active stream")]
    Unavailable { camera_id: String },
}

impl AccessError {
    pub fn not_found<S: Into<String>>(camera_id: S) -> Self {
        Self::NotFound {
            camera_id: camera_id.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(camera_id: S) -> Self {
        Self::Unavailable {
            camera_id: camera_id.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Camera '{camera_id}' not found")]
    NotFound { camera_id: String },

    #[error("A camera named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Invalid camera configuration: {details}")]
    InvalidConfig { details: String },
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Client connection lost: {details}")]
    ConnectionLost { details: String },
}

pub type Result<T> = std::result::Result<T, EpiguardError>;
