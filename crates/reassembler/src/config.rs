use std::time::Duration;

/// Parameters for [`ReassemblerPool`](crate::ReassemblerPool).
#[derive(Debug, Clone)]
pub struct ReassemblerConfig {
    /// Number of concurrent reassembly workers.
    pub workers: usize,
    /// Wait between claims when the queue is empty.
    pub poll_interval: Duration,
    /// Copy buffer size used when streaming chunks into the staging object.
    pub buffer_size: usize,
    /// How often a worker renews its claim while streaming a chunk. Keep it
    /// well below the queue's lease duration.
    pub lease_renewal: Duration,
}

impl Default for ReassemblerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_secs(2),
            buffer_size: 64 * 1024,
            lease_renewal: Duration::from_secs(60),
        }
    }
}

impl ReassemblerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_lease_renewal(mut self, interval: Duration) -> Self {
        self.lease_renewal = interval;
        self
    }
}
