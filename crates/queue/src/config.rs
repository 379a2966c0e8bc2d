use std::time::Duration;

/// Tuning knobs for the worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls when nothing was due.
    pub poll_interval: Duration,
    /// Deliveries per job before it is dropped: the first run plus one retry.
    pub max_attempts: u32,
    /// Jobs claimed per poll.
    pub batch_size: usize,
    /// Base delay for exponential back-off between deliveries.
    pub retry_base_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: 2,
            batch_size: 16,
            retry_base_delay: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Delay before the next delivery after `attempts` failed ones.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        self.retry_base_delay * 2u32.saturating_pow(attempts.saturating_sub(1))
    }
}
