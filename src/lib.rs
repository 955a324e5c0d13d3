pub mod backup;
pub mod config;
pub mod error;
pub mod node;
pub mod stats;

pub use backup::{BackupManager, BackupManifest, BackupReport, RestoreReport};
pub use config::{Config, PeerConfig};
pub use error::{Result, StoreError};
pub use node::Node;

// Re-export key types from workspace crates
pub use api;
pub use network;
pub use replication;
pub use storage;
pub use system;
