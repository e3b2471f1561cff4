use serde::Serialize;
use std::fmt;

/// What a reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub started: Vec<String>,
    pub stopped: Vec<String>,
    pub restarted: Vec<String>,
    pub unchanged: Vec<String>,
}

impl ReconcileReport {
    /// True when no worker was started, stopped or restarted
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.stopped.is_empty() && self.restarted.is_empty()
    }

    pub fn merge(&mut self, other: ReconcileReport) {
        self.started.extend(other.started);
        self.stopped.extend(other.stopped);
        self.restarted.extend(other.restarted);
        self.unchanged.extend(other.unchanged);
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "started {:?}, stopped {:?}, restarted {:?}, unchanged {}",
            self.started,
            self.stopped,
            self.restarted,
            self.unchanged.len()
        )
    }
}
