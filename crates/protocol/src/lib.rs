//! Record types shared by the upload client and the reassembly service.
//!
//! Everything here is plain data with serde derives; the registry crate
//! persists these records and the uploader/reassembler crates mutate them
//! only through the registry contract.

pub mod progress;
pub mod types;

pub use progress::{ProgressSnapshot, UploadStatus};
pub use types::{
    JobStatus, ProcessingQueueItem, QueueStatus, UploadJob, UploadMetadata,
};
