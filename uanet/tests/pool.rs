use uanet::client::connect;
use uanet::{BufferOrigin, Connection, ConnectionConfig, ConnectionId, Job, JobPoolBuilder};

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Open client connections to a local listener, shared the way the server
/// layer shares its connections with jobs.
fn connections(n: usize) -> (TcpListener, Vec<Arc<Connection>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
    let url = format!("opc.tcp://{}", listener.local_addr().unwrap());

    let connections = (0..n)
        .map(|_| Arc::new(connect(ConnectionConfig::default(), &url)))
        .collect();

    (listener, connections)
}

fn message(connection: &Arc<Connection>, delay_ms: u8) -> Job {
    Job::Message {
        connection: connection.clone(),
        message: vec![delay_ms],
        origin: BufferOrigin::Allocated,
    }
}

fn retire(connection: Arc<Connection>) -> Vec<Job> {
    vec![
        Job::Detach {
            connection: connection.clone(),
        },
        Job::DeferredFree { connection },
    ]
}

/// Records every violation of "no job of a connection runs during or after
/// its deferred free".
#[derive(Default)]
struct Tracker {
    running: Mutex<HashMap<ConnectionId, usize>>,
    freed: Mutex<Vec<ConnectionId>>,
    violations: Mutex<Vec<String>>,
}

impl Tracker {
    fn handle(&self, job: Job) {
        let id = job.connection().id();

        if self.freed.lock().unwrap().contains(&id) {
            self.violations
                .lock()
                .unwrap()
                .push(format!("{job:?} ran after the free"));
        }

        match job {
            Job::Message { message, .. } => {
                *self.running.lock().unwrap().entry(id).or_default() += 1;
                thread::sleep(Duration::from_millis(message[0] as u64));
                *self.running.lock().unwrap().entry(id).or_default() -= 1;
            }
            Job::Detach { .. } => {}
            Job::DeferredFree { connection } => {
                let running = self.running.lock().unwrap().get(&id).copied().unwrap_or(0);
                if running != 0 {
                    self.violations
                        .lock()
                        .unwrap()
                        .push(format!("{id} freed with {running} jobs running"));
                }

                self.freed.lock().unwrap().push(id);
                if !Connection::free(connection) {
                    self.violations
                        .lock()
                        .unwrap()
                        .push(format!("{id} still referenced at free"));
                }
            }
        }
    }
}

#[test]
fn test_deferred_free_waits_for_earlier_jobs() {
    let (_listener, connections) = connections(8);
    let ids: Vec<_> = connections.iter().map(|c| c.id()).collect();

    let tracker = Arc::new(Tracker::default());
    let pool = {
        let tracker = tracker.clone();
        JobPoolBuilder::new()
            .worker_threads(4)
            .build(move |job: Job| tracker.handle(job))
    };

    // Each connection gets slow messages spread over several batches; its
    // retirement lands in the same batch as fresh work for the others.
    let mut connections: Vec<Option<Arc<Connection>>> =
        connections.into_iter().map(Some).collect();

    for round in 0..connections.len() {
        let mut batch = Vec::new();

        for (i, slot) in connections.iter().enumerate() {
            if let Some(connection) = slot {
                let delay = ((i * 7 + round * 3) % 11) as u8;
                batch.push(message(connection, delay));
                batch.push(message(connection, delay / 2));
            }
        }

        if let Some(connection) = connections[round].take() {
            batch.extend(retire(connection));
        }

        pool.dispatch(batch);
    }

    pool.wait_idle();

    let violations = tracker.violations.lock().unwrap();
    assert!(violations.is_empty(), "{violations:?}");

    let mut freed = tracker.freed.lock().unwrap().clone();
    freed.sort();
    assert_eq!(freed, ids);
}

#[test]
fn test_free_waits_for_other_connections() {
    let (_listener, mut connections) = connections(2);
    let slow = connections.remove(0);
    let freed = connections.remove(0);

    let events = Arc::new(Mutex::new(Vec::new()));
    let pool = {
        let events = events.clone();
        JobPoolBuilder::new()
            .worker_threads(2)
            .build(move |job: Job| match job {
                Job::Message { .. } => {
                    thread::sleep(Duration::from_millis(100));
                    events.lock().unwrap().push("slow done");
                }
                Job::Detach { .. } => {}
                Job::DeferredFree { connection } => {
                    events.lock().unwrap().push("free");
                    assert!(Connection::free(connection));
                }
            })
    };

    pool.dispatch(vec![message(&slow, 0)]);
    pool.dispatch(retire(freed));
    pool.wait_idle();

    assert_eq!(*events.lock().unwrap(), vec!["slow done", "free"]);
}

#[test]
fn test_later_jobs_do_not_hold_back_free() {
    let (_listener, mut connections) = connections(2);
    let freed = connections.remove(0);
    let later = connections.remove(0);

    let events = Arc::new(Mutex::new(Vec::new()));
    let pool = {
        let events = events.clone();
        JobPoolBuilder::new()
            .worker_threads(2)
            .build(move |job: Job| match job {
                Job::Message { .. } => {
                    thread::sleep(Duration::from_millis(200));
                    events.lock().unwrap().push("later done");
                }
                Job::Detach { .. } => {}
                Job::DeferredFree { connection } => {
                    events.lock().unwrap().push("free");
                    drop(connection);
                }
            })
    };

    let mut batch = retire(freed);
    batch.push(message(&later, 0));
    pool.dispatch(batch);
    pool.wait_idle();

    assert_eq!(*events.lock().unwrap(), vec!["free", "later done"]);
}

#[test]
fn test_handler_panic_does_not_block_free() {
    let (_listener, mut connections) = connections(1);
    let connection = connections.remove(0);

    let freed = Arc::new(AtomicUsize::new(0));
    let pool = {
        let freed = freed.clone();
        JobPoolBuilder::new()
            .worker_threads(1)
            .build(move |job: Job| match job {
                Job::Message { .. } => panic!("handler failure"),
                Job::Detach { .. } => {}
                Job::DeferredFree { connection } => {
                    if Connection::free(connection) {
                        freed.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
    };

    let mut batch = vec![message(&connection, 0), message(&connection, 0)];
    batch.extend(retire(connection));
    pool.dispatch(batch);
    pool.wait_idle();

    assert_eq!(freed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_runs_outstanding_jobs() {
    let (_listener, connections) = connections(4);

    let handled = Arc::new(AtomicUsize::new(0));
    let pool = {
        let handled = handled.clone();
        JobPoolBuilder::new()
            .worker_threads(2)
            .build(move |job: Job| {
                if let Job::Message { message, .. } = &job {
                    thread::sleep(Duration::from_millis(message[0] as u64));
                }
                handled.fetch_add(1, Ordering::SeqCst);
            })
    };

    let mut batch = Vec::new();
    for connection in connections {
        batch.push(message(&connection, 5));
        batch.extend(retire(connection));
    }
    pool.dispatch(batch);
    drop(pool);

    assert_eq!(handled.load(Ordering::SeqCst), 12);
}

#[test]
fn test_wait_idle_on_empty_pool() {
    let pool = JobPoolBuilder::new()
        .worker_threads(1)
        .build(|_job: Job| {});

    pool.dispatch(Vec::new());
    pool.wait_idle();
}
