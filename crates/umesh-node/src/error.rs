//! Error types for the node runtime.

use umesh_mesh::MeshError;

/// Errors that can occur during node operation.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("node not started")]
    NotStarted,
    #[error("node already running")]
    AlreadyRunning,
}
