mod server;
mod handlers;
mod error;

pub use server::Server;
pub use error::{ApiError, ApiResult};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;

use network::{HealthReport, ReplicaPayload};
use storage::{StoreStats, StoredFile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node_ip: IpAddr,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.node_ip, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub path: String,
    pub data: Bytes,
    pub mime_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferSummary {
    pub records: usize,
    pub objects: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterPeerRequest {
    pub node_id: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

/// Everything the HTTP layer needs from a running node.
///
/// The `*_replica` and `read_local` methods back the node-to-node routes and
/// only ever touch this node's own holdings.
#[async_trait]
pub trait ObjectService: Send + Sync + 'static {
    async fn health(&self) -> HealthReport;

    async fn read_local(&self, id: &str) -> ApiResult<Option<Bytes>>;

    async fn accept_replica(&self, payload: ReplicaPayload) -> ApiResult<()>;

    async fn drop_replica(&self, id: &str) -> ApiResult<bool>;

    async fn store(&self, request: StoreRequest) -> ApiResult<StoredFile>;

    async fn retrieve(&self, id: &str) -> ApiResult<Option<Bytes>>;

    async fn record(&self, id: &str) -> Option<StoredFile>;

    async fn remove(&self, id: &str) -> ApiResult<bool>;

    async fn register_peer(&self, node_id: &str, endpoint: &str) -> ApiResult<()>;

    async fn stats(&self) -> StoreStats;

    async fn backup(&self, path: &Path) -> ApiResult<TransferSummary>;

    async fn restore(&self, path: &Path) -> ApiResult<TransferSummary>;
}
