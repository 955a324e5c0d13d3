use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use network::{with_timeout, NodeRegistry, PeerClient, ReplicaPayload};
use storage::FileCatalog;

use crate::job::{JobQueue, ReplicationJob};
use crate::router::{Lookup, RetrievalRouter};
use crate::{Config, ReplicationError, Result};

#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub completed: usize,
    pub failed: usize,
    pub purged: usize,
    /// Failed jobs as they looked when they were dropped.
    pub failures: Vec<ReplicationJob>,
}

/// Drives every object this node originated toward the target replica
/// count.
///
/// `schedule` turns a replica deficit into pending jobs; `drain_once` runs
/// them. Failed jobs are dropped without retry. The next `reconcile` sees
/// the deficit again and schedules fresh jobs.
pub struct ReplicationEngine {
    config: Config,
    catalog: Arc<FileCatalog>,
    registry: Arc<NodeRegistry>,
    router: Arc<RetrievalRouter>,
    client: Arc<dyn PeerClient>,
    queue: JobQueue,
    cursor: AtomicUsize,
}

impl ReplicationEngine {
    pub fn new(
        config: Config,
        catalog: Arc<FileCatalog>,
        registry: Arc<NodeRegistry>,
        router: Arc<RetrievalRouter>,
        client: Arc<dyn PeerClient>,
    ) -> Self {
        Self {
            config,
            catalog,
            registry,
            router,
            client,
            queue: JobQueue::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn target_factor(&self) -> usize {
        self.config.replication_factor
    }

    /// Enqueues jobs for `file_id` if it is below target. Only objects this
    /// node originated are scheduled here; holders of copies leave the
    /// decision to the origin. Returns the number of jobs added.
    pub async fn schedule(&self, file_id: &str) -> usize {
        let Some(record) = self.catalog.get(file_id).await else {
            return 0;
        };

        let local_id = self.registry.local_id();
        if record.origin() != Some(local_id) || record.replicas.len() >= self.config.replication_factor {
            return 0;
        }

        let mut candidates: Vec<String> = self
            .registry
            .peers()
            .await
            .into_iter()
            .filter(|node| node.available && !record.has_replica(&node.id))
            .map(|node| node.id)
            .collect();

        // Rotate the starting point so the first registered peers are not
        // always the ones picked.
        if !candidates.is_empty() {
            let offset = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
            candidates.rotate_left(offset);
        }

        let added = self
            .queue
            .enqueue_up_to_target(&record, local_id, &candidates, self.config.replication_factor)
            .await;

        if added > 0 {
            tracing::debug!(
                "Scheduled {} replication job(s) for {} ({} of {} replicas)",
                added,
                file_id,
                record.replicas.len(),
                self.config.replication_factor
            );
        }
        added
    }

    /// Schedules every under-replicated object.
    pub async fn reconcile(&self) -> usize {
        let mut added = 0;
        for record in self.catalog.snapshot().await {
            if record.replicas.len() < self.config.replication_factor {
                added += self.schedule(&record.id).await;
            }
        }
        added
    }

    pub async fn cancel(&self, file_id: &str) -> usize {
        self.queue.cancel(file_id).await
    }

    pub async fn jobs(&self) -> Vec<ReplicationJob> {
        self.queue.snapshot().await
    }

    pub async fn job_count(&self) -> usize {
        self.queue.len().await
    }

    /// One drain pass: runs every pending job once, concurrently, then
    /// purges finished jobs. Jobs already in progress from an overlapping
    /// pass are left alone.
    pub async fn drain_once(&self) -> DrainReport {
        let claimed = self.queue.claim_pending().await;
        let mut report = DrainReport::default();

        if claimed.is_empty() {
            return report;
        }

        let outcomes = join_all(claimed.iter().map(|job| self.execute(job))).await;

        for (job, outcome) in claimed.into_iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    self.queue.complete(&job.file_id, &job.target_node).await;
                    report.completed += 1;
                    tracing::info!("Replicated {} to {}", job.file_id, job.target_node);
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!("Replication of {} to {} failed: {}", job.file_id, job.target_node, error);
                    self.queue.fail(&job.file_id, &job.target_node, error.clone()).await;
                    report.failed += 1;
                    report.failures.push(ReplicationJob {
                        status: crate::JobStatus::Failed,
                        error: Some(error),
                        ..job
                    });
                }
            }
        }

        report.purged = self.queue.purge_finished().await;
        report
    }

    async fn execute(&self, job: &ReplicationJob) -> Result<()> {
        let record = self
            .catalog
            .get(&job.file_id)
            .await
            .ok_or_else(|| ReplicationError::FileNotFound(job.file_id.clone()))?;

        if self.registry.get(&job.source_node).await.is_none() {
            return Err(ReplicationError::UnknownNode(job.source_node.clone()));
        }

        let target = self
            .registry
            .get(&job.target_node)
            .await
            .ok_or_else(|| ReplicationError::UnknownNode(job.target_node.clone()))?;

        if !target.available {
            return Err(ReplicationError::TargetUnavailable(target.id));
        }

        let data = match self.router.lookup(&job.file_id).await? {
            Lookup::Found(data) => data,
            Lookup::Unknown => return Err(ReplicationError::FileNotFound(job.file_id.clone())),
            Lookup::Unreachable => return Err(ReplicationError::SourceUnavailable(job.file_id.clone())),
        };

        let payload = ReplicaPayload { record, data };
        with_timeout(
            self.config.request_timeout(),
            &format!("replicate {} to {}", job.file_id, target.id),
            self.client.replicate(&target.endpoint, &payload),
        )
        .await?;

        if !self.catalog.add_replica(&job.file_id, &job.target_node).await
            && !self.catalog.contains(&job.file_id).await
        {
            // Removed while the transfer was in flight; the target's copy
            // would otherwise be orphaned.
            let what = format!("delete orphaned {} on {}", job.file_id, target.id);
            if let Err(e) = with_timeout(
                self.config.request_timeout(),
                &what,
                self.client.delete(&target.endpoint, &job.file_id),
            )
            .await
            {
                tracing::warn!("Failed to {}: {}", what, e);
            }
            return Err(ReplicationError::FileNotFound(job.file_id.clone()));
        }
        Ok(())
    }

    /// Runs drain passes on the configured interval until `shutdown` flips
    /// to true or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.replication_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Replication loop started (every {:?}, factor {})",
            self.config.replication_interval(),
            self.config.replication_factor
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.drain_once().await;
                    if report.completed + report.failed > 0 {
                        tracing::info!(
                            "Drain pass: {} completed, {} failed, {} purged",
                            report.completed,
                            report.failed,
                            report.purged
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Replication loop stopped");
    }
}
