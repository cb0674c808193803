//! Storage error types.

use std::io::ErrorKind;

/// Errors produced by an [`ObjectStore`](crate::ObjectStore).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage operation timed out")]
    Timeout,
}

impl StorageError {
    /// Returns `true` if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Unavailable(_) | StorageError::Timeout => true,
            StorageError::Io(e) => matches!(
                e.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
            ),
            StorageError::NotFound(_)
            | StorageError::AlreadyExists(_)
            | StorageError::InvalidPath(_)
            | StorageError::SizeMismatch { .. } => false,
        }
    }

    /// Maps an I/O error on `path` to `NotFound` where applicable.
    pub(crate) fn from_io(err: std::io::Error, path: &str) -> Self {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io(err)
        }
    }
}
