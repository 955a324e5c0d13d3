use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use storage::StoredFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Copy of one object to one target node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationJob {
    pub file_id: String,
    pub source_node: String,
    pub target_node: String,
    pub status: JobStatus,
    /// 0 until the transfer finishes, then 100.
    pub progress: u8,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReplicationJob {
    pub fn new(file_id: String, source_node: String, target_node: String) -> Self {
        Self {
            file_id,
            source_node,
            target_node,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            created_at: Utc::now(),
        }
    }

    fn is_running(&self, file_id: &str, target_node: &str) -> bool {
        self.status == JobStatus::InProgress && self.file_id == file_id && self.target_node == target_node
    }
}

/// Active replication jobs.
///
/// At most one job exists per (file, target) pair. Moving a job from
/// `Pending` to `InProgress` happens under the queue lock, which is what
/// keeps two drain passes from running the same pair concurrently.
#[derive(Default)]
pub struct JobQueue {
    jobs: Mutex<Vec<ReplicationJob>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues jobs for `record` until replicas plus outstanding jobs reach
    /// `target_factor`, taking targets from `candidates` in order. Candidates
    /// already holding a replica, or with any job for this file still in the
    /// queue (finished but unpurged included), are skipped.
    pub async fn enqueue_up_to_target(
        &self,
        record: &StoredFile,
        source_node: &str,
        candidates: &[String],
        target_factor: usize,
    ) -> usize {
        let mut jobs = self.jobs.lock().await;

        let file_jobs: Vec<&ReplicationJob> = jobs
            .iter()
            .filter(|job| job.file_id == record.id)
            .collect();

        // A completed job whose replica is not in `record` yet means the
        // caller read the record before the append landed.
        let outstanding = file_jobs
            .iter()
            .filter(|job| job.status != JobStatus::Failed && !record.has_replica(&job.target_node))
            .count();

        let needed = target_factor.saturating_sub(record.replicas.len() + outstanding);
        if needed == 0 {
            return 0;
        }

        let selected: Vec<String> = candidates
            .iter()
            .filter(|node| {
                !record.has_replica(node) && !file_jobs.iter().any(|job| &job.target_node == *node)
            })
            .take(needed)
            .cloned()
            .collect();

        for target in &selected {
            jobs.push(ReplicationJob::new(
                record.id.clone(),
                source_node.to_string(),
                target.clone(),
            ));
        }

        selected.len()
    }

    /// Marks every pending job in progress and returns them.
    pub async fn claim_pending(&self) -> Vec<ReplicationJob> {
        let mut jobs = self.jobs.lock().await;

        jobs.iter_mut()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| {
                job.status = JobStatus::InProgress;
                job.progress = 0;
                job.clone()
            })
            .collect()
    }

    pub async fn complete(&self, file_id: &str, target_node: &str) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|job| job.is_running(file_id, target_node)) {
            job.status = JobStatus::Completed;
            job.progress = 100;
        }
    }

    pub async fn fail(&self, file_id: &str, target_node: &str, error: String) {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|job| job.is_running(file_id, target_node)) {
            job.status = JobStatus::Failed;
            job.error = Some(error);
        }
    }

    /// Drops completed and failed jobs. Failed jobs are not retried.
    pub async fn purge_finished(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|job| !job.status.is_finished());
        before - jobs.len()
    }

    /// Drops pending jobs for a file that no longer exists.
    pub async fn cancel(&self, file_id: &str) -> usize {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|job| !(job.file_id == file_id && job.status == JobStatus::Pending));
        before - jobs.len()
    }

    pub async fn snapshot(&self) -> Vec<ReplicationJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn record(replicas: &[&str]) -> StoredFile {
        let mut record = StoredFile::new(
            "file-1".to_string(),
            "a.bin".to_string(),
            b"abc",
            None,
            HashMap::new(),
            replicas[0].to_string(),
        );
        record.replicas = replicas.iter().map(|r| r.to_string()).collect();
        record
    }

    fn candidates(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test]
    async fn test_enqueue_respects_target_and_existing_replicas() {
        let queue = JobQueue::new();
        let record = record(&["local", "b"]);

        let added = queue
            .enqueue_up_to_target(&record, "local", &candidates(&["b", "c", "d"]), 3)
            .await;

        assert_eq!(added, 1);
        let jobs = queue.snapshot().await;
        assert_eq!(jobs[0].target_node, "c");
        assert_eq!(jobs[0].source_node, "local");
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_enqueue_twice_adds_nothing_the_second_time() {
        let queue = JobQueue::new();
        let record = record(&["local"]);
        let peers = candidates(&["b", "c"]);

        assert_eq!(queue.enqueue_up_to_target(&record, "local", &peers, 3).await, 2);
        assert_eq!(queue.enqueue_up_to_target(&record, "local", &peers, 3).await, 0);
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let queue = JobQueue::new();
        queue
            .enqueue_up_to_target(&record(&["local"]), "local", &candidates(&["b", "c"]), 3)
            .await;

        let first = queue.claim_pending().await;
        let second = queue.claim_pending().await;

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert!(first.iter().all(|job| job.status == JobStatus::InProgress));
    }

    #[tokio::test]
    async fn test_complete_fail_and_purge() {
        let queue = JobQueue::new();
        queue
            .enqueue_up_to_target(&record(&["local"]), "local", &candidates(&["b", "c"]), 3)
            .await;
        queue.claim_pending().await;

        queue.complete("file-1", "b").await;
        queue.fail("file-1", "c", "connection refused".to_string()).await;

        let jobs = queue.snapshot().await;
        assert_eq!(jobs[0].progress, 100);
        assert_eq!(jobs[1].error.as_deref(), Some("connection refused"));

        assert_eq!(queue.purge_finished().await, 2);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_cancel_only_drops_pending() {
        let queue = JobQueue::new();
        queue
            .enqueue_up_to_target(&record(&["local"]), "local", &candidates(&["b"]), 3)
            .await;
        queue.claim_pending().await;
        queue
            .enqueue_up_to_target(&record(&["local"]), "local", &candidates(&["b", "c"]), 3)
            .await;

        assert_eq!(queue.cancel("file-1").await, 1);
        let jobs = queue.snapshot().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::InProgress);
    }

    #[tokio::test]
    async fn test_stale_record_does_not_requeue_unpurged_target() {
        let queue = JobQueue::new();
        let stale = record(&["local"]);
        let peers = candidates(&["b"]);

        assert_eq!(queue.enqueue_up_to_target(&stale, "local", &peers, 2).await, 1);
        queue.claim_pending().await;
        queue.complete("file-1", "b").await;

        // Record read before the replica append, queue not yet purged.
        assert_eq!(queue.enqueue_up_to_target(&stale, "local", &peers, 2).await, 0);
        assert!(queue.claim_pending().await.is_empty());

        assert_eq!(queue.purge_finished().await, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_unpurged_failure_blocks_target_but_frees_a_slot() {
        let queue = JobQueue::new();
        let record = record(&["local"]);

        queue.enqueue_up_to_target(&record, "local", &candidates(&["b"]), 2).await;
        queue.claim_pending().await;
        queue.fail("file-1", "b", "timeout".to_string()).await;

        let added = queue
            .enqueue_up_to_target(&record, "local", &candidates(&["b", "c"]), 2)
            .await;
        assert_eq!(added, 1);
        let jobs = queue.snapshot().await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].target_node, "c");
    }

    #[tokio::test]
    async fn test_complete_ignores_finished_jobs() {
        let queue = JobQueue::new();
        let record = record(&["local"]);

        queue.enqueue_up_to_target(&record, "local", &candidates(&["b"]), 2).await;
        queue.complete("file-1", "b").await;

        // Not claimed yet, so nothing is running to complete.
        let jobs = queue.snapshot().await;
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }
}
