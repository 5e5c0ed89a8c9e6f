//! Assembly configuration.

/// Tuning knobs for one assembly run.
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    /// Records loaded (and compared) per batch. Larger is faster but holds
    /// more of the corpus in memory at once.
    pub batch_size: usize,
    /// Threads in the pair-comparison pool. 1 runs inline.
    pub workers: usize,
    /// Refinement links buffered before a flush to the store.
    pub flush_threshold: usize,
    /// Attempts per flush before the run aborts as resumable.
    pub flush_retries: u32,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            workers: 1,
            flush_threshold: 10_000,
            flush_retries: 3,
        }
    }
}

impl AssemblyConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold.max(1);
        self
    }

    pub fn with_flush_retries(mut self, flush_retries: u32) -> Self {
        self.flush_retries = flush_retries;
        self
    }
}
