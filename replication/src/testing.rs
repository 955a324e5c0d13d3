use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;

use network::{HealthReport, NetworkError, NodeRegistry, PeerClient, ReplicaPayload, StorageNode};
use storage::{FileCatalog, LocalObjectStore, StoredFile};

use crate::{Config, ReplicationEngine, RetrievalRouter};

pub const LOCAL_NODE: &str = "node-local";

#[derive(Debug, Clone, Copy)]
pub enum PeerBehaviour {
    Healthy,
    Slow,
    Down,
    Hang,
}

/// In-memory peers keyed by node id. Endpoints are `http://<node id>`.
#[derive(Default)]
pub struct MockPeers {
    behaviour: Mutex<HashMap<String, PeerBehaviour>>,
    objects: Mutex<HashMap<(String, String), Bytes>>,
    fetches: AtomicUsize,
    replications: AtomicUsize,
}

impl MockPeers {
    pub fn set_behaviour(&self, node_id: &str, behaviour: PeerBehaviour) {
        self.behaviour.lock().unwrap().insert(node_id.to_string(), behaviour);
    }

    pub fn put_object(&self, node_id: &str, object_id: &str, data: &[u8]) {
        self.objects
            .lock()
            .unwrap()
            .insert((node_id.to_string(), object_id.to_string()), Bytes::copy_from_slice(data));
    }

    pub fn object(&self, node_id: &str, object_id: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(node_id.to_string(), object_id.to_string()))
            .cloned()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn replicate_calls(&self) -> usize {
        self.replications.load(Ordering::SeqCst)
    }

    async fn gate(&self, endpoint: &str) -> Result<String, NetworkError> {
        let node_id = endpoint.trim_start_matches("http://").to_string();
        let behaviour = self
            .behaviour
            .lock()
            .unwrap()
            .get(&node_id)
            .copied()
            .unwrap_or(PeerBehaviour::Down);

        match behaviour {
            PeerBehaviour::Healthy => Ok(node_id),
            PeerBehaviour::Slow => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(node_id)
            }
            PeerBehaviour::Down => Err(NetworkError::ConnectionFailed(endpoint.to_string())),
            PeerBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(NetworkError::ConnectionFailed(endpoint.to_string()))
            }
        }
    }
}

#[async_trait]
impl PeerClient for MockPeers {
    async fn health(&self, endpoint: &str) -> network::Result<HealthReport> {
        let node_id = self.gate(endpoint).await?;
        Ok(HealthReport { node_id, capacity: 1 << 30, used: 0 })
    }

    async fn fetch(&self, endpoint: &str, object_id: &str) -> network::Result<Option<Bytes>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let node_id = self.gate(endpoint).await?;
        Ok(self.object(&node_id, object_id))
    }

    async fn replicate(&self, endpoint: &str, payload: &ReplicaPayload) -> network::Result<()> {
        self.replications.fetch_add(1, Ordering::SeqCst);
        let node_id = self.gate(endpoint).await?;
        self.put_object(&node_id, &payload.record.id, &payload.data);
        Ok(())
    }

    async fn delete(&self, endpoint: &str, object_id: &str) -> network::Result<bool> {
        let node_id = self.gate(endpoint).await?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .remove(&(node_id, object_id.to_string()))
            .is_some())
    }
}

pub struct Fixture {
    _dir: tempfile::TempDir,
    pub local: Arc<LocalObjectStore>,
    pub catalog: Arc<FileCatalog>,
    pub registry: Arc<NodeRegistry>,
    pub peers: Arc<MockPeers>,
    pub router: Arc<RetrievalRouter>,
    pub engine: Arc<ReplicationEngine>,
}

impl Fixture {
    pub async fn new(factor: usize, peers: &[(&str, PeerBehaviour)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let local = Arc::new(LocalObjectStore::new(dir.path()).await.unwrap());
        let catalog = Arc::new(FileCatalog::new());
        let registry = Arc::new(NodeRegistry::new(StorageNode::new(
            LOCAL_NODE.to_string(),
            format!("http://{}", LOCAL_NODE),
            factor,
        )));

        let mock = Arc::new(MockPeers::default());
        for (node_id, behaviour) in peers {
            registry.register(node_id, &format!("http://{}", node_id)).await;
            mock.set_behaviour(node_id, *behaviour);
        }

        let config = Config {
            replication_factor: factor,
            replication_interval_ms: 50,
            request_timeout_ms: 100,
        };

        let client: Arc<dyn PeerClient> = mock.clone();
        let router = Arc::new(RetrievalRouter::new(
            local.clone(),
            catalog.clone(),
            registry.clone(),
            client.clone(),
            config.request_timeout(),
        ));
        let engine = Arc::new(ReplicationEngine::new(
            config,
            catalog.clone(),
            registry.clone(),
            router.clone(),
            client,
        ));

        Self {
            _dir: dir,
            local,
            catalog,
            registry,
            peers: mock,
            router,
            engine,
        }
    }

    pub async fn store_local(&self, data: &[u8]) -> String {
        let id = self.local.put(data).await.unwrap();
        self.catalog
            .insert(StoredFile::new(
                id.clone(),
                "test.bin".to_string(),
                data,
                None,
                HashMap::new(),
                LOCAL_NODE.to_string(),
            ))
            .await;
        id
    }
}
