use std::sync::Arc;
use std::time::Duration;
use bytes::Bytes;

use network::{with_timeout, NodeRegistry, PeerClient};
use storage::{FileCatalog, LocalObjectStore, StoredFile};

use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Bytes),
    /// No record exists for the id.
    Unknown,
    /// A record exists but no replica could be read.
    Unreachable,
}

impl Lookup {
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Lookup::Found(bytes) => Some(bytes),
            Lookup::Unknown | Lookup::Unreachable => None,
        }
    }
}

/// Local-first reads with fallback to replica holders.
pub struct RetrievalRouter {
    local: Arc<LocalObjectStore>,
    catalog: Arc<FileCatalog>,
    registry: Arc<NodeRegistry>,
    client: Arc<dyn PeerClient>,
    fetch_timeout: Duration,
}

impl RetrievalRouter {
    pub fn new(
        local: Arc<LocalObjectStore>,
        catalog: Arc<FileCatalog>,
        registry: Arc<NodeRegistry>,
        client: Arc<dyn PeerClient>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            local,
            catalog,
            registry,
            client,
            fetch_timeout,
        }
    }

    pub async fn lookup(&self, file_id: &str) -> Result<Lookup> {
        let Some(record) = self.catalog.get(file_id).await else {
            return Ok(Lookup::Unknown);
        };

        if let Some(bytes) = self.local.get(file_id).await? {
            return Ok(Lookup::Found(bytes));
        }

        match self.fetch_from_replicas(&record).await {
            Some(bytes) => {
                if let Err(e) = self.local.put_with_id(file_id, &bytes).await {
                    tracing::warn!("Failed to cache {} locally: {}", file_id, e);
                }
                Ok(Lookup::Found(bytes))
            }
            None => {
                tracing::warn!("No reachable replica for {} ({} known)", file_id, record.replicas.len());
                Ok(Lookup::Unreachable)
            }
        }
    }

    async fn fetch_from_replicas(&self, record: &StoredFile) -> Option<Bytes> {
        let local_id = self.registry.local_id();

        for node_id in record.replicas.iter().filter(|id| id.as_str() != local_id) {
            let Some(node) = self.registry.get(node_id).await else { continue };
            if !node.available {
                continue;
            }

            let result = with_timeout(
                self.fetch_timeout,
                &format!("fetch {} from {}", record.id, node_id),
                self.client.fetch(&node.endpoint, &record.id),
            )
            .await;

            match result {
                Ok(Some(bytes)) if record.verify(&bytes) => {
                    tracing::debug!("Fetched {} from {}", record.id, node_id);
                    return Some(bytes);
                }
                Ok(Some(_)) => {
                    tracing::warn!("Replica of {} on {} failed hash verification", record.id, node_id);
                }
                Ok(None) => {
                    tracing::debug!("Node {} does not hold {}", node_id, record.id);
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch {} from {}: {}", record.id, node_id, e);
                }
            }
        }

        None
    }
}
