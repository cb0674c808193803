//! Reassembly error types.

use chunklift_registry::RegistryError;
use chunklift_storage::StorageError;

/// Errors produced while reassembling one queue item.
#[derive(Debug, thiserror::Error)]
pub enum ReassemblyError {
    #[error("failed to download chunk {index}: {source}")]
    Download {
        index: u32,
        #[source]
        source: StorageError,
    },

    #[error("failed to merge chunk {index}: {source}")]
    Merge {
        index: u32,
        #[source]
        source: StorageError,
    },

    #[error("checksum mismatch for chunk {index}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        index: u32,
        expected: String,
        actual: String,
    },

    #[error("merged size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("failed to publish merged file: {0}")]
    Finalize(#[source] StorageError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}
