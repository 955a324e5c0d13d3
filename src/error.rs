use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),

    #[error("Replication failure: {0}")]
    ReplicationFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("System error: {0}")]
    System(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::StorageIo(err.to_string())
    }
}

impl From<storage::StorageError> for StoreError {
    fn from(err: storage::StorageError) -> Self {
        match err {
            storage::StorageError::Serialization(msg) => StoreError::Serialization(msg),
            other => StoreError::StorageIo(other.to_string()),
        }
    }
}

impl From<network::NetworkError> for StoreError {
    fn from(err: network::NetworkError) -> Self {
        StoreError::NodeUnreachable(err.to_string())
    }
}

impl From<replication::ReplicationError> for StoreError {
    fn from(err: replication::ReplicationError) -> Self {
        match err {
            replication::ReplicationError::Storage(e) => e.into(),
            other => StoreError::ReplicationFailure(other.to_string()),
        }
    }
}

impl From<system::SystemError> for StoreError {
    fn from(err: system::SystemError) -> Self {
        StoreError::System(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for api::ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NodeUnreachable(msg) => api::ApiError::Unreachable(msg),
            StoreError::InvalidConfig(msg) => api::ApiError::InvalidRequest(msg),
            StoreError::Backup(msg) => api::ApiError::InvalidRequest(msg),
            other => api::ApiError::Storage(other.to_string()),
        }
    }
}
