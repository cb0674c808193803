//! Upload error types.

use chunklift_registry::RegistryError;
use chunklift_storage::StorageError;
use chunklift_transfer::TransferError;

/// Input rejected before any chunk is transferred.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("file is {size} bytes, the limit is {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("no owner is signed in")]
    MissingOwner,

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("invalid upload configuration: {0}")]
    InvalidConfig(String),
}

/// Errors produced by the upload flow.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("chunk {index} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        index: u32,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("worker task failed: {0}")]
    Join(String),
}
