mod job;
mod engine;
mod router;

#[cfg(test)]
mod testing;

pub use job::{JobQueue, JobStatus, ReplicationJob};
pub use engine::{DrainReport, ReplicationEngine};
pub use router::{Lookup, RetrievalRouter};

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub replication_factor: usize,
    pub replication_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Config {
    pub fn replication_interval(&self) -> Duration {
        Duration::from_millis(self.replication_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

pub type Result<T> = std::result::Result<T, ReplicationError>;

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Network error: {0}")]
    Network(#[from] network::NetworkError),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Target node unavailable: {0}")]
    TargetUnavailable(String),

    #[error("No reachable copy of {0}")]
    SourceUnavailable(String),
}
