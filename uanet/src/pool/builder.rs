use super::{JobHandler, JobPool};

use std::thread;

/// Builder for a [`JobPool`].
///
/// # Examples
///
/// ```rust
/// use uanet::{Connection, Job, JobPoolBuilder};
///
/// let pool = JobPoolBuilder::new()
///     .worker_threads(2)
///     .build(|job: Job| {
///         if let Job::DeferredFree { connection } = job {
///             Connection::free(connection);
///         }
///     });
///
/// pool.wait_idle();
/// ```
pub struct JobPoolBuilder {
    worker_threads: usize,
}

impl JobPoolBuilder {
    /// Defaults to one worker per logical CPU, or `1` if unknown.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self { worker_threads }
    }

    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Starts the workers, each calling `handler` for the jobs it picks up.
    pub fn build(self, handler: impl JobHandler + 'static) -> JobPool {
        JobPool::new(self.worker_threads, handler)
    }
}

impl Default for JobPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
