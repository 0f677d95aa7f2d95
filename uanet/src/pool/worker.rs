use super::JobHandler;
use super::injector::Injector;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// A worker thread of the [`JobPool`](super::JobPool).
///
/// Runs jobs until the injector reports shutdown with no work left. A
/// panicking handler is contained to the job that raised it, so the
/// completion accounting that deferred frees rely on stays intact.
pub(crate) struct Worker {
    id: usize,
    injector: Arc<Injector>,
    handler: Arc<dyn JobHandler>,
}

impl Worker {
    pub(crate) fn new(id: usize, injector: Arc<Injector>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            id,
            injector,
            handler,
        }
    }

    pub(crate) fn run(&self) {
        while let Some(scheduled) = self.injector.pop() {
            let handler = &self.handler;
            let job = scheduled.job;

            if panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job))).is_err() {
                error!(worker = self.id, "job handler panicked");
            }

            self.injector.complete(scheduled.seq);
        }
    }
}
