use std::collections::VecDeque;
use std::time::Duration;

use chunklift_protocol::{ProgressSnapshot, UploadStatus};
use tokio::time::Instant;

/// Callback invoked with every new snapshot.
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Aggregates chunk completions of one upload into progress snapshots.
///
/// The tracker is owned by a single task; concurrent workers report to that
/// task over a channel instead of sharing the tracker. Once the upload reaches
/// a final status further updates are ignored, so a failed or cancelled upload
/// never climbs again.
pub struct ProgressTracker {
    total_bytes: u64,
    total_chunks: u32,
    bytes_uploaded: u64,
    chunks_done: u32,
    status: UploadStatus,
    error: Option<String>,
    speed: SpeedCalculator,
    callbacks: Vec<ProgressCallback>,
}

impl ProgressTracker {
    /// Creates a pending tracker for an upload of `total_bytes` in `total_chunks`.
    pub fn new(total_bytes: u64, total_chunks: u32) -> Self {
        Self {
            total_bytes,
            total_chunks,
            bytes_uploaded: 0,
            chunks_done: 0,
            status: UploadStatus::Pending,
            error: None,
            speed: SpeedCalculator::new(None, None),
            callbacks: Vec::new(),
        }
    }

    /// Registers a progress callback.
    pub fn on_progress(&mut self, callback: ProgressCallback) {
        self.callbacks.push(callback);
    }

    /// Marks the upload as in progress.
    pub fn start(&mut self) -> ProgressSnapshot {
        if self.status == UploadStatus::Pending {
            self.status = UploadStatus::Uploading;
        }
        self.publish()
    }

    /// Records one confirmed chunk of `bytes` length.
    ///
    /// The upload stays `uploading` after its last chunk; only
    /// [`complete`](Self::complete) makes it final, so a failure in a later
    /// step can still be reported.
    pub fn record_chunk(&mut self, bytes: u64) -> ProgressSnapshot {
        if self.is_final() {
            return self.snapshot();
        }
        self.status = UploadStatus::Uploading;
        self.bytes_uploaded = (self.bytes_uploaded + bytes).min(self.total_bytes);
        self.chunks_done = (self.chunks_done + 1).min(self.total_chunks);
        self.speed.add_sample(bytes);
        self.publish()
    }

    /// Marks the upload as completed.
    pub fn complete(&mut self) -> ProgressSnapshot {
        if !self.is_final() {
            self.status = UploadStatus::Completed;
            self.bytes_uploaded = self.total_bytes;
            self.chunks_done = self.total_chunks;
        }
        self.publish()
    }

    /// Switches to the error state without advancing progress.
    pub fn fail(&mut self, error: &str) -> ProgressSnapshot {
        if !self.is_final() {
            self.status = UploadStatus::Error;
            self.error = Some(error.to_string());
        }
        self.publish()
    }

    /// Switches to the cancelled state.
    pub fn cancel(&mut self) -> ProgressSnapshot {
        if !self.is_final() {
            self.status = UploadStatus::Cancelled;
        }
        self.snapshot()
    }

    /// Returns the current snapshot without notifying callbacks.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let percentage = match (self.status, self.total_bytes) {
            (UploadStatus::Completed, _) => 100.0,
            (_, 0) => 0.0,
            _ => self.bytes_uploaded as f64 / self.total_bytes as f64 * 100.0,
        };
        ProgressSnapshot {
            bytes_uploaded: self.bytes_uploaded,
            total_bytes: self.total_bytes,
            percentage,
            current_chunk: self.chunks_done,
            total_chunks: self.total_chunks,
            status: self.status,
            bytes_per_second: self.speed.bytes_per_second(),
            error: self.error.clone(),
        }
    }

    fn is_final(&self) -> bool {
        matches!(
            self.status,
            UploadStatus::Completed | UploadStatus::Error | UploadStatus::Cancelled
        )
    }

    fn publish(&self) -> ProgressSnapshot {
        let snapshot = self.snapshot();
        for cb in &self.callbacks {
            cb(&snapshot);
        }
        snapshot
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    samples: VecDeque<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            max_samples: max_samples.unwrap_or(100),
            window_size: window_size.unwrap_or(Duration::from_secs(5)),
        }
    }

    /// Records a sample of `bytes` transferred at the current instant.
    pub fn add_sample(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample {
            bytes,
            timestamp: now,
        });

        // Prune samples outside the window.
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.timestamp) > self.window_size {
                self.samples.pop_front();
            } else {
                break;
            }
        }

        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Returns the average speed in bytes/second within the window.
    ///
    /// Returns 0.0 if fewer than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = self.samples.iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}
