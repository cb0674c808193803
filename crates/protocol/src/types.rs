use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an upload job.
///
/// Transitions only move forward: `pending < processing < {completed, failed}`.
/// Both terminal states share the highest rank, so one terminal state never
/// replaces the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    /// Returns `true` if moving from `self` to `next` advances the job.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Returns `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One file upload attempt, owned by the client session that created it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadJob {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub upload_path: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// State of a processing queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Descriptive metadata the client attaches when it enqueues a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub file_name: String,
    pub file_size: u64,
    pub content_type: String,
    pub chunk_size: u64,
    /// Hex SHA-256 per chunk, indexed by chunk index. Empty means unverified.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_checksums: Vec<String>,
}

impl UploadMetadata {
    /// Expected checksum for chunk `index`, if one was recorded.
    pub fn checksum_for(&self, index: u32) -> Option<&str> {
        self.chunk_checksums
            .get(index as usize)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }
}

/// Server-side record signalling that every chunk of a job is uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingQueueItem {
    pub id: String,
    pub job_id: String,
    pub upload_path: String,
    pub total_chunks: u32,
    pub metadata: UploadMetadata,
    pub status: QueueStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Number of chunks already appended to the staging artifact.
    #[serde(default)]
    pub merged_chunks: u32,
    /// Length of the staging artifact after `merged_chunks` chunks.
    #[serde(default)]
    pub merged_bytes: u64,
}

impl ProcessingQueueItem {
    /// Returns `true` if the item is held by a worker whose lease ran out.
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Processing
            && self.lease_expires_at.is_some_and(|at| at <= now)
    }

    /// Returns `true` once every chunk has been appended to the staging artifact.
    pub fn fully_merged(&self) -> bool {
        self.merged_chunks >= self.total_chunks
    }
}
