//! Rayon thread pool configuration for scenario batches.

use rayon::ThreadPoolBuilder;
use tracing::warn;

/// How many worker threads a batch runs on.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPool {
    /// 0 means the global Rayon pool (one thread per core).
    pub workers: usize,
}

impl WorkerPool {
    pub fn with_workers(n: usize) -> Self {
        Self { workers: n }
    }

    /// Runs `f` on a pool of this size. A pool that fails to build falls back to the global one.
    pub fn install<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        if self.workers == 0 {
            return f();
        }
        match ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(f),
            Err(err) => {
                warn!(workers = self.workers, %err, "falling back to the global rayon pool");
                f()
            }
        }
    }
}
