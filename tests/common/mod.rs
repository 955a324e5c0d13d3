#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use replistore::api::ObjectService;
use replistore::network::{HealthReport, NetworkError, PeerClient, ReplicaPayload};
use replistore::{Config, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Up,
    /// Refuses connections immediately.
    Down,
    /// Accepts and never answers.
    Hang,
}

/// In-process stand-in for the HTTP transport. Endpoints are `mem://<name>`
/// and calls go straight to the target node's service methods.
#[derive(Default)]
pub struct MockCluster {
    nodes: Mutex<HashMap<String, Arc<Node>>>,
    states: Mutex<HashMap<String, PeerState>>,
}

impl MockCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_state(&self, name: &str, state: PeerState) {
        self.states.lock().unwrap().insert(endpoint(name), state);
    }

    fn attach(&self, name: &str, node: Arc<Node>) {
        self.nodes.lock().unwrap().insert(endpoint(name), node);
        self.set_state(name, PeerState::Up);
    }

    async fn reach(&self, endpoint: &str) -> Result<Arc<Node>, NetworkError> {
        let state = self
            .states
            .lock()
            .unwrap()
            .get(endpoint)
            .copied()
            .unwrap_or(PeerState::Down);

        match state {
            PeerState::Up => self
                .nodes
                .lock()
                .unwrap()
                .get(endpoint)
                .cloned()
                .ok_or_else(|| NetworkError::ConnectionFailed(endpoint.to_string())),
            PeerState::Down => Err(NetworkError::ConnectionFailed(endpoint.to_string())),
            PeerState::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(NetworkError::ConnectionFailed(endpoint.to_string()))
            }
        }
    }
}

fn protocol(err: impl std::fmt::Display) -> NetworkError {
    NetworkError::Protocol(err.to_string())
}

#[async_trait]
impl PeerClient for MockCluster {
    async fn health(&self, endpoint: &str) -> replistore::network::Result<HealthReport> {
        let node = self.reach(endpoint).await?;
        Ok(ObjectService::health(node.as_ref()).await)
    }

    async fn fetch(&self, endpoint: &str, object_id: &str) -> replistore::network::Result<Option<Bytes>> {
        let node = self.reach(endpoint).await?;
        node.read_local(object_id).await.map_err(protocol)
    }

    async fn replicate(&self, endpoint: &str, payload: &ReplicaPayload) -> replistore::network::Result<()> {
        let node = self.reach(endpoint).await?;
        if !payload.record.verify(&payload.data) {
            return Err(NetworkError::UnexpectedStatus { status: 400, url: endpoint.to_string() });
        }
        node.accept_replica(payload.clone()).await.map_err(protocol)
    }

    async fn delete(&self, endpoint: &str, object_id: &str) -> replistore::network::Result<bool> {
        let node = self.reach(endpoint).await?;
        node.drop_replica(object_id).await.map_err(protocol)
    }
}

pub fn endpoint(name: &str) -> String {
    format!("mem://{}", name)
}

pub fn test_config(name: &str, storage: &std::path::Path, factor: usize) -> Config {
    let mut config = Config::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    config.endpoint = Some(endpoint(name));
    config.storage_path = storage.to_path_buf();
    config.replication_factor = factor;
    config.heartbeat_interval_ms = 1_000;
    config.replication_interval_ms = 50;
    config.request_timeout_ms = 100;
    config
}

pub struct TestNode {
    pub name: String,
    pub dir: tempfile::TempDir,
    pub node: Arc<Node>,
}

/// Creates one node per name, all sharing `cluster` and registered with each
/// other.
pub async fn spawn_cluster(cluster: &Arc<MockCluster>, names: &[&str], factor: usize) -> Vec<TestNode> {
    let mut nodes = Vec::new();
    for name in names {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::with_peer_client(test_config(name, dir.path(), factor), cluster.clone())
            .await
            .unwrap();
        let node = Arc::new(node);
        cluster.attach(name, node.clone());
        nodes.push(TestNode { name: name.to_string(), dir, node });
    }

    for a in &nodes {
        for b in &nodes {
            if a.node.id() != b.node.id() {
                a.node.register_peer(b.node.id(), &endpoint(&b.name)).await.unwrap();
            }
        }
    }
    nodes
}
