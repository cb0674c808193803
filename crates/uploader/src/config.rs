//! Upload parameters.

use std::time::Duration;

use chunklift_transfer::DEFAULT_CHUNK_SIZE;

use crate::error::ValidationError;
use crate::transport::RetryPolicy;

/// Default number of chunks in flight at once.
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 3;

/// Default largest accepted file: 5 GiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Parameters for [`Uploader`](crate::Uploader).
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Size of every chunk except the last.
    pub chunk_size: u64,
    /// Worker pool size.
    pub max_concurrent_uploads: usize,
    /// Backoff before each retry; the length bounds the number of retries.
    pub retry_delays: Vec<Duration>,
    /// Hard limit on a single chunk transfer attempt.
    pub upload_timeout: Duration,
    pub max_file_size: u64,
    /// Pause a worker takes after each chunk, for rate-limited backends.
    pub inter_chunk_delay: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            retry_delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ],
            upload_timeout: Duration::from_secs(5 * 60),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            inter_chunk_delay: Duration::ZERO,
        }
    }
}

impl UploadConfig {
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrent_uploads(mut self, workers: usize) -> Self {
        self.max_concurrent_uploads = workers;
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn with_max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = max;
        self
    }

    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Returns the retry policy described by `retry_delays`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_delays.clone())
    }

    /// Rejects parameters that would make an upload impossible.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.chunk_size == 0 {
            return Err(ValidationError::InvalidConfig(
                "chunk size must be greater than zero".into(),
            ));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(ValidationError::InvalidConfig(
                "at least one concurrent upload is required".into(),
            ));
        }
        if self.upload_timeout.is_zero() {
            return Err(ValidationError::InvalidConfig(
                "upload timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
