use crate::job::Job;

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Condvar, Mutex};

/// A job ready to run, with the sequence number it must report on
/// completion. Deferred jobs carry none: nothing waits on them.
pub(crate) struct Scheduled {
    pub(crate) seq: Option<u64>,
    pub(crate) job: Job,
}

struct State {
    /// Jobs any worker may pick up, in dispatch order.
    ready: VecDeque<Scheduled>,

    /// Deferred jobs and their barrier: the number of jobs issued before
    /// them. Barriers never decrease along the queue.
    delayed: VecDeque<(u64, Job)>,

    /// Sequence numbers issued but not completed yet.
    in_flight: BTreeSet<u64>,

    /// Next sequence number to issue.
    next_seq: u64,

    /// Jobs dispatched and not completed, deferred ones included.
    outstanding: usize,

    shutdown: bool,
}

impl State {
    /// Moves every deferred job whose predecessors are all done to the
    /// ready queue. Returns whether anything moved.
    fn release_delayed(&mut self) -> bool {
        let low_water = self.in_flight.first().copied().unwrap_or(self.next_seq);
        let mut released = false;

        while let Some(&(barrier, _)) = self.delayed.front() {
            if barrier > low_water {
                break;
            }

            if let Some((_, job)) = self.delayed.pop_front() {
                self.ready.push_back(Scheduled { seq: None, job });
                released = true;
            }
        }

        released
    }
}

/// Shared queue between the dispatching thread and the workers.
///
/// Besides handing out jobs, it enforces the deferred free rule: a
/// [`Job::DeferredFree`] only becomes runnable once every job dispatched
/// before it has completed.
pub(crate) struct Injector {
    state: Mutex<State>,

    /// Signalled when jobs become ready or on shutdown.
    available: Condvar,

    /// Signalled when the last outstanding job completes.
    idle: Condvar,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            state: Mutex::new(State {
                ready: VecDeque::new(),
                delayed: VecDeque::new(),
                in_flight: BTreeSet::new(),
                next_seq: 0,
                outstanding: 0,
                shutdown: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        }
    }

    /// Queues a batch in order.
    pub(crate) fn push_batch(&self, jobs: Vec<Job>) {
        if jobs.is_empty() {
            return;
        }

        let mut state = self.state.lock().unwrap();

        for job in jobs {
            state.outstanding += 1;

            if job.is_deferred() {
                let barrier = state.next_seq;
                state.delayed.push_back((barrier, job));
            } else {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.in_flight.insert(seq);
                state.ready.push_back(Scheduled {
                    seq: Some(seq),
                    job,
                });
            }
        }

        state.release_delayed();
        drop(state);

        self.available.notify_all();
    }

    /// Blocks until a job is ready. Returns `None` once shutdown has been
    /// requested and no work is left.
    pub(crate) fn pop(&self) -> Option<Scheduled> {
        let mut state = self.state.lock().unwrap();

        loop {
            if let Some(scheduled) = state.ready.pop_front() {
                return Some(scheduled);
            }

            if state.shutdown && state.outstanding == 0 {
                return None;
            }

            state = self.available.wait(state).unwrap();
        }
    }

    /// Records completion of a job handed out by [`pop`](Self::pop).
    pub(crate) fn complete(&self, seq: Option<u64>) {
        let mut state = self.state.lock().unwrap();

        if let Some(seq) = seq {
            state.in_flight.remove(&seq);
        }
        state.outstanding -= 1;

        let released = state.release_delayed();
        let drained = state.outstanding == 0;
        let shutdown = state.shutdown;
        drop(state);

        if released || (drained && shutdown) {
            self.available.notify_all();
        }
        if drained {
            self.idle.notify_all();
        }
    }

    /// Blocks until every dispatched job has completed.
    pub(crate) fn wait_idle(&self) {
        let mut state = self.state.lock().unwrap();

        while state.outstanding > 0 {
            state = self.idle.wait(state).unwrap();
        }
    }

    /// Lets workers exit once the remaining work is done.
    pub(crate) fn shutdown(&self) {
        self.state.lock().unwrap().shutdown = true;
        self.available.notify_all();
    }
}
