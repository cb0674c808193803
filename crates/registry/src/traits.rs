//! Registry and queue contracts.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chunklift_protocol::{
    JobStatus, ProcessingQueueItem, QueueStatus, UploadJob, UploadMetadata,
};

use crate::error::RegistryError;

/// Boxed future returned by registry operations.
pub type RegistryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RegistryError>> + Send + 'a>>;

/// Fields supplied by the client when it registers an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub file_name: String,
    pub file_size: u64,
    pub upload_path: String,
    pub owner_id: String,
}

/// Claim and retry limits for the processing queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Failed attempts after which an item is terminally failed.
    pub max_attempts: u32,
    /// How long a claim stays valid without a progress report.
    pub lease_duration: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lease_duration: Duration::from_secs(10 * 60),
        }
    }
}

/// Result of recording a failed processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Attempts consumed so far, including this one.
    pub attempts: u32,
    /// `true` if the item will not be claimed again.
    pub terminal: bool,
}

/// Persistent record of upload jobs.
pub trait JobRegistry: Send + Sync {
    /// Registers a new `pending` job and returns its id.
    fn create_job(&self, job: NewJob) -> RegistryFuture<'_, String>;

    /// Moves a job forward to `status`.
    ///
    /// Idempotent: a status that does not rank above the recorded one is
    /// ignored, so late or duplicate updates never regress a job.
    fn update_job_status<'a>(
        &'a self,
        job_id: &'a str,
        status: JobStatus,
        error: Option<String>,
    ) -> RegistryFuture<'a, ()>;

    fn get_job<'a>(&'a self, job_id: &'a str) -> RegistryFuture<'a, Option<UploadJob>>;

    /// Lists jobs, optionally filtered by status, oldest first.
    fn list_jobs(&self, status: Option<JobStatus>) -> RegistryFuture<'_, Vec<UploadJob>>;
}

/// Queue of fully uploaded jobs awaiting reassembly.
pub trait ProcessingQueue: Send + Sync {
    /// Records that every chunk of `job_id` is stored and returns the item id.
    fn enqueue_processing<'a>(
        &'a self,
        job_id: &'a str,
        upload_path: &'a str,
        total_chunks: u32,
        metadata: UploadMetadata,
    ) -> RegistryFuture<'a, String>;

    /// Atomically hands one eligible item to `worker_id`, or `None` if idle.
    fn claim_queue_item<'a>(
        &'a self,
        worker_id: &'a str,
    ) -> RegistryFuture<'a, Option<ProcessingQueueItem>>;

    /// Persists the merge offset of a claimed item and renews its lease.
    fn record_merge_progress<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
        merged_chunks: u32,
        merged_bytes: u64,
    ) -> RegistryFuture<'a, ()>;

    /// Extends the lease of a claimed item without changing its progress.
    ///
    /// Fails with [`RegistryError::LeaseLost`] once another worker has taken
    /// the item over, so callers use it as an ownership check before touching
    /// shared staging state.
    fn renew_lease<'a>(&'a self, item_id: &'a str, worker_id: &'a str) -> RegistryFuture<'a, ()>;

    /// Marks a claimed item as completed.
    fn complete_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
    ) -> RegistryFuture<'a, ()>;

    /// Records a failed attempt on a claimed item.
    fn fail_queue_item<'a>(
        &'a self,
        item_id: &'a str,
        worker_id: &'a str,
        error: String,
    ) -> RegistryFuture<'a, FailureOutcome>;

    fn get_queue_item<'a>(
        &'a self,
        item_id: &'a str,
    ) -> RegistryFuture<'a, Option<ProcessingQueueItem>>;

    /// Lists items, optionally filtered by status, oldest first.
    fn list_queue_items(
        &self,
        status: Option<QueueStatus>,
    ) -> RegistryFuture<'_, Vec<ProcessingQueueItem>>;
}
