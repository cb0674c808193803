//! Upload job registry and processing queue.
//!
//! The upload client records one [`UploadJob`](chunklift_protocol::UploadJob)
//! per upload and, once every chunk is stored, one
//! [`ProcessingQueueItem`](chunklift_protocol::ProcessingQueueItem). The
//! reassembler claims queue items through [`ProcessingQueue::claim_queue_item`],
//! which hands each item to exactly one worker at a time under a lease.

mod error;
mod memory;
mod traits;

pub use error::RegistryError;
pub use memory::MemoryRegistry;
pub use traits::{
    FailureOutcome, JobRegistry, NewJob, ProcessingQueue, QueueConfig, RegistryFuture,
};
