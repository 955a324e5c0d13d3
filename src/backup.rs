use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use network::{NodeRegistry, StorageNode};
use storage::{validate_object_id, FileCatalog, LocalObjectStore, StoredFile};

use crate::error::{Result, StoreError};

const MANIFEST_FILE: &str = "manifest.json";
const OBJECTS_DIR: &str = "objects";

/// `manifest.json` at the root of a backup directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    pub node_id: String,
    pub files: Vec<StoredFile>,
    /// Registry at backup time. Restore does not read it back.
    pub nodes: Vec<StorageNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupReport {
    pub records: usize,
    pub objects: usize,
    /// Records whose bytes were not in the local store.
    pub missing: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub records: usize,
    pub objects: usize,
    /// Objects absent from the backup or failing the hash check.
    pub skipped: usize,
}

pub struct BackupManager {
    local: Arc<LocalObjectStore>,
    catalog: Arc<FileCatalog>,
    registry: Arc<NodeRegistry>,
}

impl BackupManager {
    pub fn new(local: Arc<LocalObjectStore>, catalog: Arc<FileCatalog>, registry: Arc<NodeRegistry>) -> Self {
        Self {
            local,
            catalog,
            registry,
        }
    }

    /// Copies every locally held object plus the full catalog into `dir`.
    /// Objects only held by peers are recorded but not fetched.
    pub async fn backup(&self, dir: &Path) -> Result<BackupReport> {
        let objects_dir = dir.join(OBJECTS_DIR);
        tokio::fs::create_dir_all(&objects_dir)
            .await
            .map_err(|e| StoreError::Backup(format!("cannot create {}: {}", objects_dir.display(), e)))?;

        let files = self.catalog.snapshot().await;
        let mut report = BackupReport {
            records: files.len(),
            ..Default::default()
        };

        for record in &files {
            match self.local.get(&record.id).await? {
                Some(data) => {
                    tokio::fs::write(objects_dir.join(&record.id), &data).await?;
                    report.objects += 1;
                }
                None => report.missing += 1,
            }
        }

        let manifest = BackupManifest {
            created_at: Utc::now(),
            node_id: self.registry.local_id().to_string(),
            files,
            nodes: self.registry.snapshot().await,
        };
        write_manifest(dir, &manifest).await?;

        info!(
            "Backup written to {}: {} records, {} objects, {} not held locally",
            dir.display(),
            report.records,
            report.objects,
            report.missing
        );
        Ok(report)
    }

    /// Merges a backup into the catalog and local store. Records overwrite
    /// existing entries with the same id. Peers are not contacted.
    pub async fn restore(&self, dir: &Path) -> Result<RestoreReport> {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            return Err(StoreError::Backup(format!("backup directory {} not found", dir.display())));
        }

        let manifest = read_manifest(dir).await?;
        let objects_dir = dir.join(OBJECTS_DIR);
        let mut report = RestoreReport::default();
        let mut records = Vec::with_capacity(manifest.files.len());

        for record in manifest.files {
            if validate_object_id(&record.id).is_err() {
                warn!("Skipping backup entry with invalid id {:?}", record.id);
                report.skipped += 1;
                continue;
            }
            records.push(record);
        }

        for record in &records {
            let data = match tokio::fs::read(objects_dir.join(&record.id)).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !record.verify(&data) {
                warn!("Skipping {} from backup: content does not match recorded hash", record.id);
                report.skipped += 1;
                continue;
            }

            self.local.put_with_id(&record.id, &data).await?;
            report.objects += 1;
        }

        report.records = self.catalog.merge(records).await;

        info!(
            "Restored from {} (taken on {} at {}): {} records, {} objects, {} skipped",
            dir.display(),
            manifest.node_id,
            manifest.created_at,
            report.records,
            report.objects,
            report.skipped
        );
        Ok(report)
    }
}

pub async fn read_manifest(dir: &Path) -> Result<BackupManifest> {
    let path = dir.join(MANIFEST_FILE);
    let raw = tokio::fs::read(&path).await.map_err(|e| {
        StoreError::Backup(format!("cannot read manifest {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

async fn write_manifest(dir: &Path, manifest: &BackupManifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    let final_path = dir.join(MANIFEST_FILE);
    let temp_path: PathBuf = dir.join(format!(".{}.{}.tmp", MANIFEST_FILE, uuid::Uuid::new_v4().simple()));

    tokio::fs::write(&temp_path, &json).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
