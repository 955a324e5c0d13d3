mod engine;
mod object;
mod catalog;

pub use engine::LocalObjectStore;
pub use object::{compute_hash, generate_object_id, validate_object_id, ObjectId, StoredFile, DEFAULT_MIME_TYPE};
pub use catalog::FileCatalog;

use serde::{Deserialize, Serialize};

/// Point-in-time aggregate over the catalog, registry and replication queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_files: usize,
    pub total_size: u64,
    pub nodes: usize,
    pub available_nodes: usize,
    pub replication_jobs: usize,
    pub average_replication_factor: f64,
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid object: {0}")]
    InvalidObject(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
