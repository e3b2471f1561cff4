mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::EpiguardApp;
pub use runtime::ShutdownTrigger;
pub use types::{ComponentState, ShutdownReason};

/// Component names used in the state table
pub(crate) const REGISTRY_WATCHER: &str = "registry_watcher";
pub(crate) const WORKERS: &str = "workers";
pub(crate) const SERVER: &str = "server";
