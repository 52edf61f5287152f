use thiserror::Error;
use wasmvm_types::Checksum;

/// Errors that can occur in code store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Code not found: {0}")]
    NotFound(Checksum),

    #[error("Stored code corrupted: expected {expected}, got {actual}")]
    Corrupted { expected: Checksum, actual: Checksum },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
