use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use chrono::{DateTime, Utc};
use uuid::Uuid;
use std::collections::HashMap;

use crate::{Result, StorageError};

pub type ObjectId = String;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const MAX_OBJECT_ID_LEN: usize = 128;

/// Catalog record for one stored object.
///
/// `id` is allocated at store time and never derived from the content, so
/// storing the same bytes twice yields two independent records. `hash` is
/// only used to verify copies moving between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: ObjectId,
    pub path: String,
    pub hash: String,
    pub size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Nodes known to hold a copy. The first entry is the node that
    /// performed the original write.
    pub replicas: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl StoredFile {
    pub fn new(
        id: ObjectId,
        path: String,
        data: &[u8],
        mime_type: Option<String>,
        metadata: HashMap<String, String>,
        origin_node: String,
    ) -> Self {
        let now = Utc::now();

        Self {
            id,
            path,
            hash: compute_hash(data),
            size: data.len() as u64,
            mime_type: mime_type.unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            created_at: now,
            updated_at: now,
            replicas: vec![origin_node],
            metadata,
        }
    }

    pub fn origin(&self) -> Option<&str> {
        self.replicas.first().map(String::as_str)
    }

    pub fn has_replica(&self, node_id: &str) -> bool {
        self.replicas.iter().any(|replica| replica == node_id)
    }

    pub fn verify(&self, data: &[u8]) -> bool {
        data.len() as u64 == self.size && compute_hash(data) == self.hash
    }
}

pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn generate_object_id() -> ObjectId {
    Uuid::new_v4().to_string()
}

/// Ids end up as file names, so anything arriving over the network is
/// restricted to a conservative character set.
pub fn validate_object_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_OBJECT_ID_LEN {
        return Err(StorageError::InvalidObject(format!("invalid id length: {}", id.len())));
    }

    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(StorageError::InvalidObject(format!("invalid characters in id: {}", id)));
    }

    Ok(())
}
