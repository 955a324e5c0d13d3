use crate::backup::{BackupManager, BackupReport, RestoreReport};
use crate::config::Config;
use crate::error::{Result, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use api::{ApiError, ApiResult, ObjectService, StoreRequest, TransferSummary};
use network::{
    generate_node_id, with_timeout, HealthMonitor, HealthReport, HttpPeerClient, NodeRegistry,
    PeerClient, ProbeSummary, ReplicaPayload, StorageNode,
};
use replication::{DrainReport, Lookup, ReplicationEngine, RetrievalRouter};
use storage::{FileCatalog, LocalObjectStore, StoreStats, StoredFile};

const NODE_ID_FILE: &str = "node_id";

/// One member of the store: local bytes, the file catalog, the view of the
/// other nodes, and the two background loops that keep replicas moving.
pub struct Node {
    config: Config,
    local: Arc<LocalObjectStore>,
    catalog: Arc<FileCatalog>,
    registry: Arc<NodeRegistry>,
    client: Arc<dyn PeerClient>,
    router: Arc<RetrievalRouter>,
    engine: Arc<ReplicationEngine>,
    health: Arc<HealthCycle>,
    backups: BackupManager,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Node {
    pub async fn new(config: Config) -> Result<Self> {
        let client = HttpPeerClient::new(config.request_timeout())?;
        Self::with_peer_client(config, Arc::new(client)).await
    }

    /// Builds a node that talks to peers through `client` instead of HTTP.
    pub async fn with_peer_client(config: Config, client: Arc<dyn PeerClient>) -> Result<Self> {
        config.validate()?;
        system::prepare_storage_dir(&config.storage_path)?;

        let node_id = load_or_create_node_id(&config.storage_path).await?;
        let network_config = config.network_config(&node_id);
        info!("Initializing node {} at {}", node_id, network_config.endpoint);

        let local = Arc::new(LocalObjectStore::new(&config.storage_path).await?);
        let catalog = Arc::new(FileCatalog::load(config.catalog_path()).await?);
        if !catalog.is_empty().await {
            info!("Loaded {} file record(s) from {}", catalog.len().await, config.catalog_path().display());
        }

        let registry = Arc::new(NodeRegistry::new(StorageNode::new(
            node_id.clone(),
            network_config.endpoint.clone(),
            network_config.replication_factor,
        )));
        for peer in &config.peers {
            if peer.node_id == node_id {
                warn!("Ignoring configured peer {} with this node's own id", peer.node_id);
                continue;
            }
            registry.register(&peer.node_id, &peer.endpoint).await;
        }

        let router = Arc::new(RetrievalRouter::new(
            local.clone(),
            catalog.clone(),
            registry.clone(),
            client.clone(),
            network_config.request_timeout(),
        ));

        let engine = Arc::new(ReplicationEngine::new(
            config.clone().into(),
            catalog.clone(),
            registry.clone(),
            router.clone(),
            client.clone(),
        ));

        let health = Arc::new(HealthCycle {
            local: local.clone(),
            registry: registry.clone(),
            monitor: HealthMonitor::new(registry.clone(), client.clone(), network_config.request_timeout()),
            engine: engine.clone(),
            max_storage_size: config.max_storage_size,
            interval: network_config.heartbeat_interval(),
        });
        health.refresh_local().await;

        let backups = BackupManager::new(local.clone(), catalog.clone(), registry.clone());
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            local,
            catalog,
            registry,
            client,
            router,
            engine,
            health,
            backups,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        self.registry.local_id()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Writes `data` locally, records it with this node as the only replica
    /// and queues replication toward the target factor.
    pub async fn store(
        &self,
        path: impl Into<String>,
        data: &[u8],
        mime_type: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<StoredFile> {
        let id = self.local.put(data).await?;
        let record = StoredFile::new(id.clone(), path.into(), data, mime_type, metadata, self.id().to_string());

        self.catalog.insert(record.clone()).await;
        let queued = self.engine.schedule(&id).await;

        debug!("Stored {} ({} bytes), {} replication job(s) queued", id, record.size, queued);
        Ok(record)
    }

    /// Local copy first, then each available replica holder. `None` covers
    /// both an unknown id and a known file with no reachable copy.
    pub async fn retrieve(&self, id: &str) -> Result<Option<Bytes>> {
        Ok(self.lookup(id).await?.into_bytes())
    }

    pub async fn lookup(&self, id: &str) -> Result<Lookup> {
        Ok(self.router.lookup(id).await?)
    }

    pub async fn record(&self, id: &str) -> Option<StoredFile> {
        self.catalog.get(id).await
    }

    /// Deletes the file everywhere this node can reach. Remote deletes are
    /// best effort; a second call returns false.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let Some(record) = self.catalog.get(id).await else {
            return Ok(false);
        };

        self.engine.cancel(id).await;

        let mut holders = Vec::new();
        for replica in &record.replicas {
            if replica == self.id() {
                continue;
            }
            match self.registry.get(replica).await {
                Some(node) if node.available => holders.push(node),
                _ => debug!("Skipping remote delete of {} on unavailable node {}", id, replica),
            }
        }

        let timeout = self.config.request_timeout();
        let deletes = holders.iter().map(|node| async move {
            let what = format!("delete of {} on {}", id, node.id);
            with_timeout(timeout, &what, self.client.delete(&node.endpoint, id)).await
        });
        for (node, result) in holders.iter().zip(join_all(deletes).await) {
            if let Err(e) = result {
                warn!("Remote delete of {} on {} failed: {}", id, node.id, e);
            }
        }

        self.local.delete(id).await?;
        let removed = self.catalog.remove(id).await.is_some();
        if removed {
            info!("Removed {}", id);
        }
        Ok(removed)
    }

    pub async fn register_peer(&self, node_id: &str, endpoint: &str) -> Result<()> {
        if node_id == self.id() {
            return Err(StoreError::InvalidConfig(format!("{} is this node's own id", node_id)));
        }
        self.registry.register(node_id, endpoint).await;
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        crate::stats::collect(&self.catalog, &self.registry, &self.engine).await
    }

    pub async fn backup(&self, dir: &Path) -> Result<BackupReport> {
        self.backups.backup(dir).await
    }

    pub async fn restore(&self, dir: &Path) -> Result<RestoreReport> {
        self.backups.restore(dir).await
    }

    /// Runs one drain pass immediately instead of waiting for the timer.
    pub async fn replicate_now(&self) -> DrainReport {
        self.engine.drain_once().await
    }

    pub async fn reconcile(&self) -> usize {
        self.engine.reconcile().await
    }

    /// Runs one health cycle immediately: refresh the local entry, probe
    /// peers, then reconcile.
    pub async fn check_health(&self) -> ProbeSummary {
        self.health.run_once().await
    }

    /// Spawns the health and replication loops. Calling it again while they
    /// run has no effect.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }

        self.shutdown_tx.send_replace(false);
        info!("Starting node {} background tasks", self.id());

        tasks.push(tokio::spawn(self.health.clone().run(self.shutdown_tx.subscribe())));
        tasks.push(tokio::spawn(self.engine.clone().run(self.shutdown_tx.subscribe())));
    }

    /// Stops the background loops, waits for them and persists the catalog.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx.send_replace(true);

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Background task ended abnormally: {}", e);
            }
        }

        self.catalog.persist(self.config.catalog_path()).await?;
        info!("Node {} stopped, catalog saved", self.id());
        Ok(())
    }

    /// Serves the HTTP API and runs the background loops until ctrl-c.
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        self.start().await;

        let server = api::Server::new(self.config.clone().into(), self.clone());
        let served = server
            .start_with_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for ctrl-c: {}", e);
                    return;
                }
                info!("Shutdown requested");
            })
            .await;

        self.shutdown().await?;
        served.map_err(|e| StoreError::System(e.to_string()))
    }
}

/// Periodic liveness pass: refresh the local entry, probe every peer, then
/// schedule whatever fell below target.
struct HealthCycle {
    local: Arc<LocalObjectStore>,
    registry: Arc<NodeRegistry>,
    monitor: HealthMonitor,
    engine: Arc<ReplicationEngine>,
    max_storage_size: u64,
    interval: std::time::Duration,
}

impl HealthCycle {
    async fn refresh_local(&self) {
        let capacity = system::effective_capacity(self.local.storage_path(), self.max_storage_size);
        let used = match self.local.used_bytes().await {
            Ok(used) => used,
            Err(e) => {
                warn!("Could not measure local usage: {}", e);
                0
            }
        };
        self.registry.refresh_local(capacity, used).await;
    }

    async fn run_once(&self) -> ProbeSummary {
        self.refresh_local().await;
        let summary = self.monitor.probe_once().await;
        let queued = self.engine.reconcile().await;

        debug!(
            "Health cycle: {} probed, {} available, {} unavailable, {} job(s) queued",
            summary.probed, summary.available, summary.unavailable, queued
        );
        summary
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Health loop started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Health loop stopped");
    }
}

async fn load_or_create_node_id(storage_path: &Path) -> Result<String> {
    let path = storage_path.join(NODE_ID_FILE);

    match tokio::fs::read_to_string(&path).await {
        Ok(id) if !id.trim().is_empty() => return Ok(id.trim().to_string()),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let id = generate_node_id();
    tokio::fs::write(&path, &id).await?;
    info!("Generated node id {}", id);
    Ok(id)
}

#[async_trait]
impl ObjectService for Node {
    async fn health(&self) -> HealthReport {
        let local = self.registry.get(self.id()).await;
        HealthReport {
            node_id: self.id().to_string(),
            capacity: local.as_ref().map(|n| n.capacity).unwrap_or(0),
            used: local.as_ref().map(|n| n.used).unwrap_or(0),
        }
    }

    async fn read_local(&self, id: &str) -> ApiResult<Option<Bytes>> {
        Ok(self.local.get(id).await?)
    }

    async fn accept_replica(&self, payload: ReplicaPayload) -> ApiResult<()> {
        let ReplicaPayload { record, data } = payload;
        self.local.put_with_id(&record.id, &data).await?;

        let id = record.id.clone();
        if self.catalog.insert_if_absent(record).await {
            debug!("Accepted replica of {} ({} bytes)", id, data.len());
        }
        Ok(())
    }

    async fn drop_replica(&self, id: &str) -> ApiResult<bool> {
        self.engine.cancel(id).await;
        let deleted = self.local.delete(id).await?;
        let forgotten = self.catalog.remove(id).await.is_some();
        Ok(deleted || forgotten)
    }

    async fn store(&self, request: StoreRequest) -> ApiResult<StoredFile> {
        Ok(Node::store(self, request.path, &request.data, request.mime_type, request.metadata).await?)
    }

    async fn retrieve(&self, id: &str) -> ApiResult<Option<Bytes>> {
        Ok(Node::retrieve(self, id).await?)
    }

    async fn record(&self, id: &str) -> Option<StoredFile> {
        Node::record(self, id).await
    }

    async fn remove(&self, id: &str) -> ApiResult<bool> {
        Ok(Node::remove(self, id).await?)
    }

    async fn register_peer(&self, node_id: &str, endpoint: &str) -> ApiResult<()> {
        Ok(Node::register_peer(self, node_id, endpoint).await?)
    }

    async fn stats(&self) -> StoreStats {
        Node::stats(self).await
    }

    async fn backup(&self, path: &Path) -> ApiResult<TransferSummary> {
        let report = Node::backup(self, path).await?;
        Ok(TransferSummary {
            records: report.records,
            objects: report.objects,
            skipped: report.missing,
        })
    }

    async fn restore(&self, path: &Path) -> ApiResult<TransferSummary> {
        let report = Node::restore(self, path).await.map_err(ApiError::from)?;
        Ok(TransferSummary {
            records: report.records,
            objects: report.objects,
            skipped: report.skipped,
        })
    }
}
