use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StoreError};

/// A statically known peer, given on the command line as `id=url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub node_id: String,
    pub endpoint: String,
}

impl std::str::FromStr for PeerConfig {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        let (node_id, endpoint) = s
            .split_once('=')
            .ok_or_else(|| StoreError::InvalidConfig(format!("Peer '{}' is not of the form id=url", s)))?;

        let node_id = node_id.trim();
        let endpoint = endpoint.trim();
        if node_id.is_empty() || endpoint.is_empty() {
            return Err(StoreError::InvalidConfig(format!("Peer '{}' has an empty id or url", s)));
        }

        Ok(Self {
            node_id: node_id.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node_ip: IpAddr,
    pub port: u16,
    /// Base URL peers use to reach this node. Derived from ip and port when
    /// unset.
    pub endpoint: Option<String>,
    pub peers: Vec<PeerConfig>,
    pub storage_path: PathBuf,
    pub max_storage_size: u64,
    pub replication_factor: usize,
    pub heartbeat_interval_ms: u64,
    pub replication_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn new(node_ip: IpAddr, port: u16) -> Self {
        Self {
            node_ip,
            port,
            endpoint: None,
            peers: Vec::new(),
            storage_path: PathBuf::from("./data/storage"),
            max_storage_size: 100 * 1024 * 1024 * 1024, // 100 GiB
            replication_factor: 3,
            heartbeat_interval_ms: 30_000,
            replication_interval_ms: 5_000,
            request_timeout_ms: 5_000,
            max_body_bytes: 256 * 1024 * 1024,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.node_ip, self.port)
    }

    pub fn public_endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.bind_address()),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.storage_path.join("catalog.bin")
    }

    pub fn validate(&self) -> Result<()> {
        if self.replication_factor == 0 {
            return Err(StoreError::InvalidConfig(
                "replication factor must be at least 1".to_string(),
            ));
        }

        if self.heartbeat_interval_ms == 0 || self.replication_interval_ms == 0 {
            return Err(StoreError::InvalidConfig(
                "heartbeat and replication intervals must be non-zero".to_string(),
            ));
        }

        if self.request_timeout_ms == 0 || self.request_timeout_ms >= self.heartbeat_interval_ms {
            return Err(StoreError::InvalidConfig(format!(
                "request timeout ({} ms) must be non-zero and shorter than the heartbeat interval ({} ms)",
                self.request_timeout_ms, self.heartbeat_interval_ms
            )));
        }

        Ok(())
    }

    pub(crate) fn network_config(&self, node_id: &str) -> network::Config {
        network::Config {
            node_id: node_id.to_string(),
            endpoint: self.public_endpoint(),
            replication_factor: self.replication_factor,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            request_timeout_ms: self.request_timeout_ms,
        }
    }
}

impl From<Config> for replication::Config {
    fn from(config: Config) -> Self {
        replication::Config {
            replication_factor: config.replication_factor,
            replication_interval_ms: config.replication_interval_ms,
            request_timeout_ms: config.request_timeout_ms,
        }
    }
}

impl From<Config> for api::Config {
    fn from(config: Config) -> Self {
        api::Config {
            node_ip: config.node_ip,
            port: config.port,
            max_body_bytes: config.max_body_bytes,
        }
    }
}
