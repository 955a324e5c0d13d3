use network::NodeRegistry;
use replication::ReplicationEngine;
use storage::{FileCatalog, StoreStats};

/// Aggregates over the current catalog, registry and job queue. Each source
/// is snapshotted separately, so the figures are not one atomic view.
pub async fn collect(
    catalog: &FileCatalog,
    registry: &NodeRegistry,
    engine: &ReplicationEngine,
) -> StoreStats {
    let files = catalog.snapshot().await;

    let total_size = files.iter().map(|f| f.size).sum();
    let total_replicas: usize = files.iter().map(|f| f.replicas.len()).sum();
    let average_replication_factor = if files.is_empty() {
        0.0
    } else {
        total_replicas as f64 / files.len() as f64
    };

    StoreStats {
        total_files: files.len(),
        total_size,
        nodes: registry.len().await,
        available_nodes: registry.available_count().await,
        replication_jobs: engine.job_count().await,
        average_replication_factor,
    }
}
