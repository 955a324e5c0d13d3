use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tokio::sync::RwLock;
use chrono::Utc;

use crate::Result;
use crate::object::{ObjectId, StoredFile};

/// In-memory map of every known `StoredFile`.
///
/// The lock is only held for the map operation itself; callers that need to
/// iterate take a `snapshot` and work on the clone.
#[derive(Default)]
pub struct FileCatalog {
    records: RwLock<HashMap<ObjectId, StoredFile>>,
}

impl FileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog written by `persist`. A missing file yields an empty
    /// catalog.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        let records: Vec<StoredFile> = bincode::deserialize(&bytes)?;
        tracing::info!("Loaded {} catalog records from {:?}", records.len(), path);

        Ok(Self {
            records: RwLock::new(records.into_iter().map(|r| (r.id.clone(), r)).collect()),
        })
    }

    pub async fn persist<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let records = self.snapshot().await;
        let encoded = bincode::serialize(&records)?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &encoded).await?;
        fs::rename(&temp_path, path).await?;

        tracing::debug!("Persisted {} catalog records to {:?}", records.len(), path);
        Ok(())
    }

    pub async fn insert(&self, record: StoredFile) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// Returns false when a record with the same id is already present.
    pub async fn insert_if_absent(&self, record: StoredFile) -> bool {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return false;
        }
        records.insert(record.id.clone(), record);
        true
    }

    pub async fn get(&self, id: &str) -> Option<StoredFile> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.records.read().await.contains_key(id)
    }

    pub async fn remove(&self, id: &str) -> Option<StoredFile> {
        self.records.write().await.remove(id)
    }

    /// Appends `node_id` to the record's replica list. Returns false when
    /// the record is gone or already lists the node.
    pub async fn add_replica(&self, id: &str, node_id: &str) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(id) {
            Some(record) if !record.has_replica(node_id) => {
                record.replicas.push(node_id.to_string());
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    pub async fn snapshot(&self) -> Vec<StoredFile> {
        self.records.read().await.values().cloned().collect()
    }

    /// Inserts every record, replacing existing ones with the same id.
    pub async fn merge(&self, incoming: Vec<StoredFile>) -> usize {
        let mut records = self.records.write().await;
        let count = incoming.len();
        for record in incoming {
            records.insert(record.id.clone(), record);
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}
