//! Events emitted by the uploader.

use chunklift_protocol::ProgressSnapshot;

/// Event emitted during an upload.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// Progress update after a state change or chunk completion.
    Progress(ProgressSnapshot),
    /// Every chunk is stored and the job is queued for reassembly.
    Completed { job_id: String, queue_item_id: String },
    /// The upload failed; the job has been marked failed.
    Failed { job_id: String, error: String },
}
