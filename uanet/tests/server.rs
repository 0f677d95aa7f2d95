use uanet::{
    BufferOrigin, Completed, Connection, ConnectionConfig, ConnectionId, ConnectionState, Job,
    MessageFramer, NetworkError, ServerNetworkLayer, ServerNetworkLayerBuilder,
};

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const CYCLE: Duration = Duration::from_millis(20);

fn started() -> (ServerNetworkLayer, SocketAddr) {
    let mut layer = ServerNetworkLayerBuilder::new(0).build();
    layer.start().expect("Failed to start network layer");

    let port = layer.local_addr().expect("Failed to get local address").port();
    (layer, SocketAddr::from(([127, 0, 0, 1], port)))
}

/// Runs poll cycles, collecting jobs, until `done` holds.
fn poll_until(layer: &mut ServerNetworkLayer, mut done: impl FnMut(&[Job]) -> bool) -> Vec<Job> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut jobs = Vec::new();

    while Instant::now() < deadline {
        jobs.extend(layer.get_jobs(CYCLE));
        if done(&jobs) {
            return jobs;
        }
    }

    panic!("timed out polling, collected {jobs:?}");
}

/// Connects a peer and polls until the layer has accepted it.
fn connect_peer(layer: &mut ServerNetworkLayer, addr: SocketAddr) -> TcpStream {
    let before = layer.connection_count();
    let stream = TcpStream::connect(addr).expect("Failed to connect to layer");

    let deadline = Instant::now() + Duration::from_secs(5);
    while layer.connection_count() == before {
        assert!(Instant::now() < deadline, "peer was never accepted");
        assert!(layer.get_jobs(CYCLE).is_empty());
    }

    stream
}

/// Sends one byte and returns the connection it arrived on.
fn connection_of(layer: &mut ServerNetworkLayer, peer: &mut TcpStream) -> Arc<Connection> {
    peer.write_all(&[0xff]).expect("Failed to write to stream");

    let jobs = poll_until(layer, |jobs| !jobs.is_empty());
    match jobs.into_iter().next() {
        Some(Job::Message { connection, .. }) => connection,
        other => panic!("expected a message job, got {other:?}"),
    }
}

#[test]
fn test_get_jobs_before_start_is_empty() {
    let mut layer = ServerNetworkLayerBuilder::new(0).build();

    assert!(!layer.is_listening());
    assert!(layer.local_addr().is_none());
    assert!(layer.get_jobs(Duration::ZERO).is_empty());
}

#[test]
fn test_discovery_url() {
    let layer = ServerNetworkLayer::builder(4840).build();

    assert!(layer.discovery_url().starts_with("opc.tcp://"));
    assert!(layer.discovery_url().ends_with(":4840"));
}

#[test]
fn test_start_twice_fails() {
    let (mut layer, _) = started();

    assert!(matches!(layer.start(), Err(NetworkError::Internal { .. })));
    assert!(layer.is_listening());
}

// Windows lets a second SO_REUSEADDR socket take a bound port.
#[cfg(unix)]
#[test]
fn test_bind_conflict_fails() {
    let (_first, addr) = started();

    let mut second = ServerNetworkLayerBuilder::new(addr.port()).build();
    let err = second.start().expect_err("second bind should fail");

    assert!(matches!(err, NetworkError::Internal { .. }));
    assert!(!second.is_listening());
}

#[test]
fn test_idle_cycle_produces_nothing() {
    let (mut layer, _) = started();

    let start = Instant::now();
    let jobs = layer.get_jobs(Duration::from_millis(30));

    assert!(jobs.is_empty());
    assert_eq!(jobs.capacity(), 0);
    assert!(start.elapsed() >= Duration::from_millis(25));
}

#[test]
fn test_message_job_carries_payload() {
    let (mut layer, addr) = started();
    let mut peer = connect_peer(&mut layer, addr);
    assert_eq!(layer.connection_count(), 1);

    peer.write_all(&[0x01, 0x02, 0x03, 0x04])
        .expect("Failed to write to stream");

    let jobs = poll_until(&mut layer, |jobs| !jobs.is_empty());
    assert_eq!(jobs.len(), 1);

    match &jobs[0] {
        Job::Message {
            connection,
            message,
            origin,
        } => {
            assert_eq!(message, &[0x01, 0x02, 0x03, 0x04]);
            assert_eq!(*origin, BufferOrigin::NetworkLayer);
            assert_eq!(connection.state(), ConnectionState::Opening);
            assert_eq!(connection.peer_addr(), Some(peer.local_addr().unwrap()));
            assert!(layer.contains(connection.id()));
        }
        other => panic!("expected a message job, got {other:?}"),
    }
}

#[test]
fn test_reply_reaches_peer() {
    let (mut layer, addr) = started();
    let mut peer = connect_peer(&mut layer, addr);
    let connection = connection_of(&mut layer, &mut peer);

    connection
        .send(b"pong".to_vec())
        .expect("Failed to send reply");

    let mut buffer = [0; 4];
    peer.read_exact(&mut buffer)
        .expect("Failed to read from stream");
    assert_eq!(&buffer, b"pong");
}

#[test]
fn test_peer_close_detaches_and_frees() {
    let (mut layer, addr) = started();
    let mut peer = connect_peer(&mut layer, addr);
    let id = connection_of(&mut layer, &mut peer).id();

    drop(peer);

    let jobs = poll_until(&mut layer, |jobs| !jobs.is_empty());
    assert_eq!(jobs.len(), 2);

    match (&jobs[0], &jobs[1]) {
        (Job::Detach { connection: a }, Job::DeferredFree { connection: b }) => {
            assert_eq!(a.id(), id);
            assert_eq!(b.id(), id);
            assert!(a.is_closed());
        }
        other => panic!("expected detach then free, got {other:?}"),
    }

    assert_eq!(layer.connection_count(), 0);
    assert!(!layer.contains(id));
}

#[test]
fn test_table_after_cycle() {
    let (mut layer, addr) = started();
    let mut first = connect_peer(&mut layer, addr);
    let mut second = connect_peer(&mut layer, addr);
    let closing = connection_of(&mut layer, &mut first).id();
    let staying = connection_of(&mut layer, &mut second).id();

    drop(first);
    let _third = TcpStream::connect(addr).expect("Failed to connect to layer");

    let mut freed = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while freed.is_empty() || layer.connection_count() != 2 {
        assert!(Instant::now() < deadline, "table never settled");

        let before = layer.connection_count();
        let jobs = layer.get_jobs(CYCLE);
        let removed = jobs
            .iter()
            .filter(|job| matches!(job, Job::DeferredFree { .. }))
            .count();

        // At most one accept per cycle, minus every detected closure.
        assert!(layer.connection_count() <= before + 1 - removed);
        assert!(layer.connection_count() + removed >= before);

        freed.extend(jobs.iter().filter_map(|job| match job {
            Job::DeferredFree { connection } => Some(connection.id()),
            _ => None,
        }));
    }

    assert_eq!(freed, vec![closing]);
    assert!(layer.contains(staying));
    assert!(!layer.contains(closing));
}

#[test]
fn test_close_is_idempotent_across_threads() {
    let (mut layer, addr) = started();
    let mut peer = connect_peer(&mut layer, addr);
    let connection = connection_of(&mut layer, &mut peer);

    let barrier = Arc::new(Barrier::new(8));
    let performed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let connection = connection.clone();
            let barrier = barrier.clone();
            let performed = performed.clone();

            thread::spawn(move || {
                barrier.wait();
                if connection.close() {
                    performed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(performed.load(Ordering::SeqCst), 1);
    assert!(connection.is_closed());
    assert!(!connection.close());

    // The close only shut the socket down: the table still holds it until
    // the next cycle notices.
    assert!(layer.contains(connection.id()));

    let jobs = poll_until(&mut layer, |jobs| !jobs.is_empty());
    assert_eq!(jobs.len(), 2);
    assert!(matches!(&jobs[0], Job::Detach { connection: c } if c.id() == connection.id()));
    assert!(matches!(&jobs[1], Job::DeferredFree { connection: c } if c.id() == connection.id()));
    assert!(!layer.contains(connection.id()));

    let mut buffer = [0; 1];
    assert_eq!(peer.read(&mut buffer).expect("Failed to read EOF"), 0);
}

#[test]
fn test_worker_receive_keeps_descriptor_until_retired() {
    let (mut layer, addr) = started();
    let mut peer = connect_peer(&mut layer, addr);
    let connection = connection_of(&mut layer, &mut peer);
    let id = connection.id();

    drop(peer);

    let worker = {
        let connection = connection.clone();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                match connection.receive(None) {
                    Ok(buffer) if buffer.is_empty() && Instant::now() < deadline => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    result => return result,
                }
            }
        })
    };

    let result = worker.join().expect("Thread panicked");
    assert!(matches!(result, Err(NetworkError::ConnectionClosed)));
    assert!(connection.is_closed());
    assert!(layer.contains(id));

    // The old descriptor is still open, so the next accepted peer cannot
    // be given the same number.
    let mut next = TcpStream::connect(addr).expect("Failed to connect to layer");

    let mut freed = false;
    let deadline = Instant::now() + Duration::from_secs(5);
    while !freed || layer.connection_count() != 1 {
        assert!(Instant::now() < deadline, "table never settled");

        for job in layer.get_jobs(CYCLE) {
            match job {
                Job::Detach { connection } if connection.id() == id => {}
                Job::DeferredFree { connection } if connection.id() == id => freed = true,
                other => panic!("unexpected job {other:?}"),
            }
        }
    }
    assert!(!layer.contains(id));

    let replacement = connection_of(&mut layer, &mut next);
    assert_ne!(replacement.id(), id);
    assert!(layer.contains(replacement.id()));
}

#[test]
fn test_send_after_close_fails() {
    let (mut layer, addr) = started();
    let mut peer = connect_peer(&mut layer, addr);
    let connection = connection_of(&mut layer, &mut peer);

    assert!(connection.close());

    assert!(matches!(
        connection.send(vec![1, 2, 3]),
        Err(NetworkError::ConnectionClosed)
    ));
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[test]
fn test_send_buffer_bounded_by_remote_config() {
    let (mut layer, addr) = started();
    let mut peer = connect_peer(&mut layer, addr);
    let connection = connection_of(&mut layer, &mut peer);

    assert!(matches!(
        connection.get_send_buffer(1),
        Err(NetworkError::CommunicationError { requested: 1, limit: 0 })
    ));

    connection.set_remote_config(ConnectionConfig {
        recv_buffer_size: 8192,
        ..ConnectionConfig::default()
    });

    let buffer = connection.get_send_buffer(100).expect("Failed to get buffer");
    assert_eq!(buffer.len(), 100);
    connection.release_send_buffer(buffer);

    assert!(matches!(
        connection.get_send_buffer(8193),
        Err(NetworkError::CommunicationError {
            requested: 8193,
            limit: 8192
        })
    ));
}

#[test]
fn test_stop_retires_every_connection() {
    let (mut layer, addr) = started();
    let mut peers: Vec<TcpStream> = (0..3).map(|_| connect_peer(&mut layer, addr)).collect();
    assert_eq!(layer.connection_count(), 3);

    let jobs = layer.stop();
    assert_eq!(jobs.len(), 6);

    let mut ids = Vec::new();
    for pair in jobs.chunks(2) {
        match pair {
            [Job::Detach { connection: a }, Job::DeferredFree { connection: b }] => {
                assert_eq!(a.id(), b.id());
                assert!(a.is_closed());
                ids.push(a.id());
            }
            other => panic!("expected detach then free, got {other:?}"),
        }
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);

    assert_eq!(layer.connection_count(), 0);
    assert!(!layer.is_listening());
    assert!(TcpStream::connect(addr).is_err());
    assert!(layer.get_jobs(Duration::ZERO).is_empty());

    for peer in &mut peers {
        let mut buffer = [0; 1];
        assert_eq!(peer.read(&mut buffer).unwrap_or(0), 0);
    }
}

/// Messages are a length byte followed by that many bytes. Partial
/// messages are kept per connection and joined with the next receive.
#[derive(Default)]
struct LengthPrefixed {
    partial: Mutex<HashMap<ConnectionId, Vec<u8>>>,
}

impl MessageFramer for LengthPrefixed {
    fn complete_messages(
        &self,
        connection: &Connection,
        buffer: Vec<u8>,
    ) -> uanet::Result<Completed> {
        let mut partial = self.partial.lock().unwrap();

        let (mut data, reallocated) = match partial.remove(&connection.id()) {
            Some(mut pending) => {
                pending.extend_from_slice(&buffer);
                (pending, true)
            }
            None => (buffer, false),
        };

        let mut complete = 0;
        while let Some(&len) = data.get(complete) {
            let end = complete + 1 + len as usize;
            if end > data.len() {
                break;
            }
            complete = end;
        }

        let rest = data.split_off(complete);
        if !rest.is_empty() {
            partial.insert(connection.id(), rest);
        }

        Ok(Completed {
            buffer: data,
            reallocated,
        })
    }
}

#[test]
fn test_framer_controls_message_jobs() {
    let mut layer = ServerNetworkLayerBuilder::new(0)
        .framer(LengthPrefixed::default())
        .build();
    layer.start().expect("Failed to start network layer");
    let addr = SocketAddr::from(([127, 0, 0, 1], layer.local_addr().unwrap().port()));

    let mut peer = connect_peer(&mut layer, addr);

    peer.write_all(&[3, b'a']).expect("Failed to write to stream");
    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        assert!(layer.get_jobs(CYCLE).is_empty());
    }

    peer.write_all(b"bc").expect("Failed to write to stream");
    let jobs = poll_until(&mut layer, |jobs| !jobs.is_empty());

    assert_eq!(jobs.len(), 1);
    match &jobs[0] {
        Job::Message {
            message, origin, ..
        } => {
            assert_eq!(message, &[3, b'a', b'b', b'c']);
            assert_eq!(*origin, BufferOrigin::Allocated);
        }
        other => panic!("expected a message job, got {other:?}"),
    }
}

#[test]
fn test_receive_respects_local_buffer_size() {
    let mut layer = ServerNetworkLayerBuilder::new(0)
        .config(ConnectionConfig {
            recv_buffer_size: 4,
            ..ConnectionConfig::default()
        })
        .build();
    layer.start().expect("Failed to start network layer");
    let addr = SocketAddr::from(([127, 0, 0, 1], layer.local_addr().unwrap().port()));

    let mut peer = connect_peer(&mut layer, addr);
    peer.write_all(b"0123456789").expect("Failed to write to stream");

    let mut received = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while received.len() < 10 {
        assert!(Instant::now() < deadline, "payload never fully received");

        for job in layer.get_jobs(CYCLE) {
            if let Job::Message { message, .. } = job {
                assert!(message.len() <= 4);
                received.extend(message);
            }
        }
    }

    assert_eq!(received, b"0123456789");
}
