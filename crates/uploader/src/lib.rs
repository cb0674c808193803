//! Client side of a chunked upload.
//!
//! [`Uploader::upload_file`] validates a local file, registers a job, splits
//! the file into fixed-size chunks and pushes them to object storage through
//! a bounded worker pool. Once every chunk is stored the job is queued for
//! server-side reassembly.
//!
//! # Pipeline
//!
//! 1. **Validate**: owner, file size and name are checked before any I/O on chunks
//! 2. **Register**: a `pending` job is created, then moved to `processing`
//! 3. **Transfer**: [`UploadScheduler`] runs `max_concurrent_uploads` workers,
//!    each sending chunks through a retrying [`ChunkTransport`]
//! 4. **Queue**: the job is enqueued for reassembly with per-chunk checksums

pub mod config;
pub mod content_type;
pub mod error;
pub mod scheduler;
pub mod transport;
pub mod types;
pub mod uploader;

pub use config::UploadConfig;
pub use content_type::detect_content_type;
pub use error::{UploadError, ValidationError};
pub use scheduler::{ChunkDone, ScheduledRun, UploadScheduler};
pub use transport::{ChunkTransport, RetryPolicy};
pub use types::UploadEvent;
pub use uploader::Uploader;

#[cfg(test)]
mod testing;
