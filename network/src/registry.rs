use tokio::sync::RwLock;
use chrono::Utc;

use crate::StorageNode;

pub fn generate_node_id() -> String {
    format!("node-{:016x}", rand::random::<u64>())
}

/// Known storage nodes in registration order. The local node is always the
/// first entry.
///
/// Nodes are never removed; they are only marked unavailable. `available`
/// is only changed through `mark_available` / `mark_unavailable`, which the
/// health monitor drives.
pub struct NodeRegistry {
    local_id: String,
    replication_factor: usize,
    nodes: RwLock<Vec<StorageNode>>,
}

impl NodeRegistry {
    pub fn new(local: StorageNode) -> Self {
        Self {
            local_id: local.id.clone(),
            replication_factor: local.replication_factor,
            nodes: RwLock::new(vec![local]),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn replication_factor(&self) -> usize {
        self.replication_factor
    }

    /// Adds a peer as available with zero capacity until its first probe.
    /// Re-registering a known id only updates the endpoint. Returns true
    /// when the node is new.
    pub async fn register(&self, node_id: &str, endpoint: &str) -> bool {
        let mut nodes = self.nodes.write().await;

        if let Some(node) = nodes.iter_mut().find(|n| n.id == node_id) {
            if node.endpoint != endpoint {
                tracing::info!("Node {} endpoint changed {} -> {}", node_id, node.endpoint, endpoint);
                node.endpoint = endpoint.to_string();
            }
            return false;
        }

        nodes.push(StorageNode::new(
            node_id.to_string(),
            endpoint.to_string(),
            self.replication_factor,
        ));
        tracing::info!("Registered node {} at {}", node_id, endpoint);
        true
    }

    pub async fn get(&self, node_id: &str) -> Option<StorageNode> {
        self.nodes.read().await.iter().find(|n| n.id == node_id).cloned()
    }

    pub async fn is_available(&self, node_id: &str) -> bool {
        self.nodes
            .read()
            .await
            .iter()
            .any(|n| n.id == node_id && n.available)
    }

    pub async fn snapshot(&self) -> Vec<StorageNode> {
        self.nodes.read().await.clone()
    }

    /// Every node except the local one, in registration order.
    pub async fn peers(&self) -> Vec<StorageNode> {
        self.nodes
            .read()
            .await
            .iter()
            .filter(|n| n.id != self.local_id)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn available_count(&self) -> usize {
        self.nodes.read().await.iter().filter(|n| n.available).count()
    }

    /// Records a successful probe. Returns the previous availability, or
    /// `None` for an unknown node.
    pub async fn mark_available(&self, node_id: &str, capacity: u64, used: u64) -> Option<bool> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.iter_mut().find(|n| n.id == node_id)?;

        let was_available = node.available;
        node.available = true;
        node.last_heartbeat = Utc::now();
        node.capacity = capacity;
        node.used = used;
        Some(was_available)
    }

    /// Records a failed probe. Capacity and usage keep their last known
    /// values.
    pub async fn mark_unavailable(&self, node_id: &str) -> Option<bool> {
        let mut nodes = self.nodes.write().await;
        let node = nodes.iter_mut().find(|n| n.id == node_id)?;

        let was_available = node.available;
        node.available = false;
        Some(was_available)
    }

    pub async fn refresh_local(&self, capacity: u64, used: u64) {
        let local_id = self.local_id.clone();
        self.mark_available(&local_id, capacity, used).await;
    }
}
