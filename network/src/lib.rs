mod registry;
mod health;
mod client;

pub use registry::{generate_node_id, NodeRegistry};
pub use health::{HealthMonitor, ProbeSummary};
pub use client::{with_timeout, HttpPeerClient, PeerClient};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use chrono::{DateTime, Utc};

/// A participant in the store, including the local process itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageNode {
    pub id: String,
    pub endpoint: String,
    pub available: bool,
    pub last_heartbeat: DateTime<Utc>,
    pub capacity: u64,
    pub used: u64,
    pub replication_factor: usize,
}

impl StorageNode {
    pub fn new(id: String, endpoint: String, replication_factor: usize) -> Self {
        Self {
            id,
            endpoint,
            available: true,
            last_heartbeat: Utc::now(),
            capacity: 0,
            used: 0,
            replication_factor,
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub node_id: String,
    pub capacity: u64,
    pub used: u64,
}

/// Body of `POST /object/{id}`, bincode encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaPayload {
    pub record: storage::StoredFile,
    pub data: bytes::Bytes,
}

impl ReplicaPayload {
    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| NetworkError::Protocol(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| NetworkError::Protocol(e.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: String,
    pub endpoint: String,
    pub replication_factor: usize,
    pub heartbeat_interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Config {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
