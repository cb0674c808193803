//! Chunk planning, payload reading, checksums and progress tracking.
//!
//! A file is split by [`plan`] into contiguous [`ChunkSpec`] ranges. Each
//! range is read by a [`ChunkReader`] into a [`Chunk`] carrying its SHA-256,
//! and stored at the deterministic path given by [`chunk_path`].

mod chunked;
mod plan;
mod progress;
mod types;
mod validation;

pub use chunked::{ChunkReader, StreamingChecksum, calculate_file_checksum, checksum_bytes};
pub use plan::plan;
pub use progress::{ProgressTracker, SpeedCalculator};
pub use types::{Chunk, ChunkSpec};
pub use validation::{chunk_path, staging_path, validate_upload_path};

/// Default chunk size: 50 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}
