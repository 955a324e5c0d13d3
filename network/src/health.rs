use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;

use crate::{with_timeout, NodeRegistry, PeerClient, StorageNode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub probed: usize,
    pub available: usize,
    pub unavailable: usize,
}

/// Probes every remote node and records the outcome in the registry.
///
/// Probes run concurrently and each one is bounded by `probe_timeout`, so a
/// dead peer costs at most one timeout and never holds back the others.
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    client: Arc<dyn PeerClient>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<NodeRegistry>, client: Arc<dyn PeerClient>, probe_timeout: Duration) -> Self {
        Self {
            registry,
            client,
            probe_timeout,
        }
    }

    pub async fn probe_once(&self) -> ProbeSummary {
        let peers = self.registry.peers().await;
        let outcomes = join_all(peers.iter().map(|peer| self.probe(peer))).await;

        let available = outcomes.iter().filter(|ok| **ok).count();
        ProbeSummary {
            probed: outcomes.len(),
            available,
            unavailable: outcomes.len() - available,
        }
    }

    async fn probe(&self, node: &StorageNode) -> bool {
        let result = with_timeout(
            self.probe_timeout,
            &format!("health probe of {}", node.id),
            self.client.health(&node.endpoint),
        )
        .await;

        match result {
            Ok(report) => {
                if let Some(false) = self.registry.mark_available(&node.id, report.capacity, report.used).await {
                    tracing::info!("Node {} is reachable again", node.id);
                }
                true
            }
            Err(e) => {
                if let Some(true) = self.registry.mark_unavailable(&node.id).await {
                    tracing::warn!("Node {} unavailable: {}", node.id, e);
                } else {
                    tracing::debug!("Node {} still unavailable: {}", node.id, e);
                }
                false
            }
        }
    }
}
