//! Registry error types.

/// Errors produced by the job registry and processing queue.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("queue item not found: {0}")]
    ItemNotFound(String),

    #[error("queue item {item_id} is no longer held by {worker_id}")]
    LeaseLost { item_id: String, worker_id: String },
}
