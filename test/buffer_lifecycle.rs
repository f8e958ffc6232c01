//! Lifecycle tests for the buffer registry
//!
//! The critical property: storage for every buffer is reclaimed exactly
//! once, regardless of the order in which the consumer release and the
//! native send completion land.

use std::sync::Arc;
use std::thread;

use rand::seq::SliceRandom;
use rand::Rng;
use udp_direct::{BufferPool, BufferRegistry, ErrorKind, SocketId};

fn peer() -> std::net::SocketAddr {
    "127.0.0.1:4000".parse().unwrap()
}

#[test]
fn test_buffer_ids_unique_across_lifecycles() {
    let pool = Arc::new(BufferPool::with_buffer_size(4, 256));
    let registry = Arc::new(BufferRegistry::new(pool));
    let mut seen = std::collections::HashSet::new();

    for _ in 0..100 {
        let id = registry.insert_received(SocketId(1), vec![0u8; 32], peer());
        assert!(seen.insert(id), "buffer id reused");
        registry.acquire_for_consumer(id).unwrap();
        registry.consumer_release(id);
    }
    assert_eq!(registry.live_count(), 0);
}

#[test]
fn test_double_handoff_rejected() {
    let registry = Arc::new(BufferRegistry::new(Arc::new(BufferPool::new(4))));
    let id = registry.insert_received(SocketId(1), vec![1, 2, 3], peer());
    registry.acquire_for_consumer(id).unwrap();
    assert_eq!(
        registry.acquire_for_consumer(id).unwrap_err().kind,
        ErrorKind::BufferAccessFailed
    );
}

#[test]
fn test_random_release_interleavings_reclaim_exactly_once() {
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let pool = Arc::new(BufferPool::with_buffer_size(4, 512));
        let registry = Arc::new(BufferRegistry::new(Arc::clone(&pool)));

        let storage = pool.acquire();
        let id = registry.insert_received(SocketId(1), storage, peer());
        registry.acquire_for_consumer(id).unwrap();

        // A random number of in-flight sends plus the consumer release,
        // applied in random order.
        let sends = rng.gen_range(0..4usize);
        let mut guards = Vec::new();
        for _ in 0..sends {
            guards.push(registry.retain_for_send(id, 0, 16).unwrap());
        }

        enum Step {
            ConsumerRelease,
            SendComplete,
        }
        let mut steps: Vec<Step> = std::iter::once(Step::ConsumerRelease)
            .chain((0..sends).map(|_| Step::SendComplete))
            .collect();
        steps.shuffle(&mut rng);

        for step in steps {
            match step {
                Step::ConsumerRelease => registry.consumer_release(id),
                Step::SendComplete => {
                    drop(guards.pop());
                    registry.complete_send(id);
                }
            }
        }

        assert_eq!(registry.live_count(), 0, "entry must be reclaimed");
        assert_eq!(pool.available(), 1, "storage recycled exactly once");
    }
}

#[test]
fn test_concurrent_release_and_completion() {
    for _ in 0..100 {
        let pool = Arc::new(BufferPool::with_buffer_size(2, 256));
        let registry = Arc::new(BufferRegistry::new(Arc::clone(&pool)));

        let id = registry.insert_received(SocketId(7), pool.acquire(), peer());
        registry.acquire_for_consumer(id).unwrap();
        let guard = registry.retain_for_send(id, 0, 64).unwrap();

        let r1 = Arc::clone(&registry);
        let consumer = thread::spawn(move || r1.consumer_release(id));
        let r2 = Arc::clone(&registry);
        let native = thread::spawn(move || {
            drop(guard);
            r2.complete_send(id);
        });
        consumer.join().unwrap();
        native.join().unwrap();

        assert_eq!(registry.live_count(), 0);
        assert_eq!(pool.available(), 1);
    }
}

#[test]
fn test_proxy_read_blocked_after_release() {
    let registry = Arc::new(BufferRegistry::new(Arc::new(BufferPool::new(4))));
    let id = registry.insert_received(SocketId(1), b"gone soon".to_vec(), peer());
    registry.acquire_for_consumer(id).unwrap();
    registry.consumer_release(id);
    assert_eq!(
        registry.read(id, |b| b.len()).unwrap_err().kind,
        ErrorKind::BufferNotFound
    );
}

#[test]
fn test_send_pin_keeps_bytes_readable_for_worker() {
    let registry = Arc::new(BufferRegistry::new(Arc::new(BufferPool::new(4))));
    let id = registry.insert_received(SocketId(1), b"pinned bytes".to_vec(), peer());
    registry.acquire_for_consumer(id).unwrap();
    let storage = registry.retain_for_send(id, 0, 6).unwrap();

    // Consumer lets go; the worker's storage reference must still see
    // the bytes.
    registry.consumer_release(id);
    assert_eq!(&storage.read()[..6], b"pinned");

    drop(storage);
    registry.complete_send(id);
    assert_eq!(registry.live_count(), 0);
}
