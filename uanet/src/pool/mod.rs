//! Worker pool for the jobs of a server layer.
//!
//! The pool runs [`Job`]s on a fixed set of threads, concurrently and in
//! no particular order, with one exception that makes connection release
//! safe:
//!
//! > A [`Job::DeferredFree`] runs only after every job dispatched before
//! > it, in the same batch or an earlier one, has completed.
//!
//! Since a connection is only referenced by jobs emitted up to and
//! including its deferred free, no job can still be using the connection
//! when the free runs. The pool does not count references itself; the
//! ordering rule is the whole mechanism.

mod builder;
mod injector;
mod worker;

pub use builder::JobPoolBuilder;

use injector::Injector;
use worker::Worker;

use crate::job::Job;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Application side of the job contract.
pub trait JobHandler: Send + Sync {
    fn handle(&self, job: Job);
}

impl<F> JobHandler for F
where
    F: Fn(Job) + Send + Sync,
{
    fn handle(&self, job: Job) {
        self(job)
    }
}

/// A fixed-size pool of worker threads honoring the deferred free rule.
///
/// Dropping the pool lets outstanding jobs finish, then joins the workers.
pub struct JobPool {
    injector: Arc<Injector>,
    handles: Vec<JoinHandle<()>>,
}

impl JobPool {
    pub(crate) fn new(threads: usize, handler: impl JobHandler + 'static) -> Self {
        let injector = Arc::new(Injector::new());
        let handler: Arc<dyn JobHandler> = Arc::new(handler);

        let handles = (0..threads)
            .map(|id| {
                let worker = Worker::new(id, injector.clone(), handler.clone());
                thread::spawn(move || worker.run())
            })
            .collect();

        Self { injector, handles }
    }

    /// Shorthand for [`JobPoolBuilder::new`].
    pub fn builder() -> JobPoolBuilder {
        JobPoolBuilder::new()
    }

    /// Queues a batch returned by the server layer, in order.
    pub fn dispatch(&self, jobs: Vec<Job>) {
        self.injector.push_batch(jobs);
    }

    /// Blocks until every dispatched job, deferred ones included, has run.
    pub fn wait_idle(&self) {
        self.injector.wait_idle();
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.injector.shutdown();

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
