//! Chunk transport with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use chunklift_storage::{ObjectStore, PutOptions, StorageError};
use chunklift_transfer::Chunk;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::UploadError;

/// Fixed backoff schedule for chunk retries.
///
/// A policy with `n` delays allows `n + 1` attempts in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }

    pub fn max_attempts(&self) -> u32 {
        self.delays.len() as u32 + 1
    }

    /// Returns the delay before retrying after failed `attempt` (1-based),
    /// or `None` once attempts are exhausted.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return None;
        }
        self.delays.get(attempt as usize - 1).copied()
    }
}

/// Sends single chunks to object storage.
///
/// Every attempt is bounded by `attempt_timeout`. Timeouts and transient
/// storage errors are retried following the [`RetryPolicy`]; any other
/// storage error fails the chunk immediately. Writes are upserts, so a
/// retried or repeated chunk overwrites its earlier copy.
pub struct ChunkTransport {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    options: PutOptions,
}

impl ChunkTransport {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            store,
            policy,
            attempt_timeout,
            options: PutOptions {
                upsert: true,
                content_type: Some("application/octet-stream".into()),
            },
        }
    }

    /// Stores `chunk` at `destination`, returning the number of attempts used.
    ///
    /// Cancelling `cancel` aborts the in-flight attempt and any backoff sleep
    /// with [`UploadError::Cancelled`].
    pub async fn send(
        &self,
        chunk: &Chunk,
        destination: &str,
        cancel: &CancellationToken,
    ) -> Result<u32, UploadError> {
        let index = chunk.index();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                r = tokio::time::timeout(
                    self.attempt_timeout,
                    self.store.put_object(destination, &chunk.data, &self.options),
                ) => r,
            };

            let err = match outcome {
                Ok(Ok(())) => {
                    debug!(chunk = index, attempt, bytes = chunk.size(), path = %destination, "chunk stored");
                    return Ok(attempt);
                }
                Ok(Err(e)) => e,
                Err(_) => StorageError::Timeout,
            };

            let delay = if err.is_transient() {
                self.policy.delay_for_attempt(attempt)
            } else {
                None
            };

            let Some(delay) = delay else {
                error!(chunk = index, attempts = attempt, error = %err, "chunk upload failed");
                return Err(UploadError::ChunkFailed {
                    index,
                    attempts: attempt,
                    source: err,
                });
            };

            warn!(
                chunk = index,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "chunk upload failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(UploadError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
