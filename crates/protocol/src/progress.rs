use serde::{Deserialize, Serialize};

/// Client-visible state of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Error,
    Cancelled,
}

/// Point-in-time view of an upload, recomputed on every chunk completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    /// 0.0 to 100.0.
    pub percentage: f64,
    /// Number of chunks confirmed so far.
    pub current_chunk: u32,
    pub total_chunks: u32,
    pub status: UploadStatus,
    #[serde(default)]
    pub bytes_per_second: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Returns `true` if no further snapshots will follow.
    pub fn is_final(&self) -> bool {
        matches!(
            self.status,
            UploadStatus::Completed | UploadStatus::Error | UploadStatus::Cancelled
        )
    }
}
