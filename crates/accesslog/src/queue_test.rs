//! Tests for the dispatch queue

use super::*;
use crate::buffer_pool::BufferPool;
use std::sync::Arc;
use std::time::Duration;

fn filled(pool: &BufferPool, text: &[u8]) -> LogBuffer {
    let mut buf = pool.allocate();
    buf.as_mut_slice()[..text.len()].copy_from_slice(text);
    buf.set_len(text.len());
    buf
}

#[test]
fn test_drain_preserves_order() {
    let pool = BufferPool::new(8, 64);
    let queue = DispatchQueue::new(DEFAULT_WAKE_THRESHOLD, false);

    for i in 0..5u8 {
        queue.enqueue(filled(&pool, &[b'0' + i]));
    }
    assert_eq!(queue.len(), 5);
    assert_eq!(queue.pending(), 5);

    let drained: Vec<u8> = queue.drain_all().iter().map(|b| b.as_bytes()[0]).collect();
    assert_eq!(drained, b"01234");
    assert!(queue.is_empty());
    // Still pending until written
    assert_eq!(queue.pending(), 5);

    queue.mark_written(5);
    assert_eq!(queue.pending(), 0);
}

#[test]
fn test_drain_empty_queue() {
    let queue = DispatchQueue::new(DEFAULT_WAKE_THRESHOLD, false);
    assert!(queue.drain_all().is_empty());
}

#[test]
fn test_dropping_drained_buffers_frees_pool() {
    let pool = BufferPool::new(2, 64);
    let queue = DispatchQueue::new(DEFAULT_WAKE_THRESHOLD, false);
    queue.enqueue(filled(&pool, b"a"));
    queue.enqueue(filled(&pool, b"b"));
    assert_eq!(pool.in_flight(), 2);

    drop(queue.drain_all());
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn test_below_threshold_does_not_wake() {
    let pool = BufferPool::new(8, 64);
    let queue = DispatchQueue::new(4, false);

    for _ in 0..4 {
        queue.enqueue(filled(&pool, b"x"));
    }

    let woke = tokio::time::timeout(Duration::from_millis(30), queue.notified()).await;
    assert!(woke.is_err());
}

#[tokio::test]
async fn test_above_threshold_wakes() {
    let pool = BufferPool::new(8, 64);
    let queue = DispatchQueue::new(2, false);

    for _ in 0..3 {
        queue.enqueue(filled(&pool, b"x"));
    }

    // The permit is stored even though nobody was waiting yet
    tokio::time::timeout(Duration::from_secs(1), queue.notified())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_eager_wakes_on_every_enqueue() {
    let pool = BufferPool::new(8, 64);
    let queue = DispatchQueue::new(DEFAULT_WAKE_THRESHOLD, true);

    queue.enqueue(filled(&pool, b"x"));
    tokio::time::timeout(Duration::from_secs(1), queue.notified())
        .await
        .unwrap();
}

#[test]
fn test_concurrent_producers_lose_nothing() {
    let pool = BufferPool::new(64, 32);
    let queue = Arc::new(DispatchQueue::new(DEFAULT_WAKE_THRESHOLD, false));

    let handles: Vec<_> = (0..4u8)
        .map(|t| {
            let pool = pool.clone();
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || {
                for _ in 0..10 {
                    queue.enqueue(filled(&pool, &[t]));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let drained = queue.drain_all();
    assert_eq!(drained.len(), 40);
    for t in 0..4u8 {
        assert_eq!(drained.iter().filter(|b| b.as_bytes()[0] == t).count(), 10);
    }
}
