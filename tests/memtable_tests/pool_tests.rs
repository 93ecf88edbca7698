//! Tests for MemTablePool
//!
//! These tests verify:
//! - Rotation when the current table crosses the threshold
//! - Flush job hand-off over the bounded queue
//! - Merged view over current and pending tables
//! - Close semantics and flush notifications

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use stratakv::memtable::{FlushJob, MemTablePool};
use stratakv::{SequenceClock, SortedTable, StrataError};

// =============================================================================
// Helper Functions
// =============================================================================

fn new_pool(threshold: usize, capacity: usize) -> (MemTablePool, Receiver<FlushJob>) {
    MemTablePool::new(threshold, 1, capacity, Arc::new(SequenceClock::default()))
}

/// Alive and dead cells of the pool view as (key, Some(value) | None)
fn view(pool: &MemTablePool, from: &[u8]) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
    pool.iter_from(from)
        .unwrap()
        .map(|cell| {
            let cell = cell.unwrap();
            let data = cell.value().data().ok().map(|d| d.to_vec());
            (cell.key().to_vec(), data)
        })
        .collect()
}

// =============================================================================
// Rotation
// =============================================================================

#[test]
fn test_no_rotation_below_threshold() {
    let (pool, jobs) = new_pool(1024, 2);
    pool.upsert(b"key", b"value").unwrap();

    assert_eq!(pool.generation(), 1);
    assert_eq!(pool.pending_flush_count(), 0);
    assert!(jobs.try_recv().is_err());
}

#[test]
fn test_rotation_on_crossing() {
    // 1 + 30 + 8 = 39 > 32
    let (pool, jobs) = new_pool(32, 2);
    pool.upsert(b"k", &[b'x'; 30]).unwrap();

    assert_eq!(pool.generation(), 2);
    assert_eq!(pool.pending_flush_count(), 1);
    assert_eq!(pool.size(), 0);

    let job = jobs.try_recv().unwrap();
    assert!(!job.is_shutdown());
    assert_eq!(job.generation(), 1);
    assert_eq!(job.table().entry_count(), 1);
}

#[test]
fn test_exactly_one_rotation_per_crossing() {
    let (pool, jobs) = new_pool(20, 16);

    // Each write is 1 + 4 + 8 = 13 bytes: the table crosses 20 on every
    // second write
    for i in 0..10u8 {
        pool.upsert(&[b'a' + i], b"1234").unwrap();
    }

    let generations: Vec<u64> = jobs.try_iter().map(|job| job.generation()).collect();
    assert_eq!(generations, vec![1, 2, 3, 4, 5]);
    assert_eq!(pool.generation(), 6);
}

#[test]
fn test_manual_rotate() {
    let (pool, jobs) = new_pool(1024, 2);
    assert_eq!(pool.rotate().unwrap(), None);

    pool.upsert(b"a", b"1").unwrap();
    assert_eq!(pool.rotate().unwrap(), Some(1));
    assert_eq!(jobs.try_recv().unwrap().generation(), 1);
    assert_eq!(pool.current_entry_count(), 0);
}

// =============================================================================
// Merged View
// =============================================================================

#[test]
fn test_view_spans_current_and_pending() {
    let (pool, _jobs) = new_pool(1024, 2);
    pool.upsert(b"a", b"old").unwrap();
    pool.upsert(b"b", b"2").unwrap();
    pool.rotate().unwrap();

    pool.upsert(b"a", b"new").unwrap();
    pool.upsert(b"c", b"3").unwrap();

    assert_eq!(
        view(&pool, b""),
        vec![
            (b"a".to_vec(), Some(b"new".to_vec())),
            (b"b".to_vec(), Some(b"2".to_vec())),
            (b"c".to_vec(), Some(b"3".to_vec())),
        ]
    );
}

#[test]
fn test_view_keeps_tombstones() {
    let (pool, _jobs) = new_pool(1024, 2);
    pool.upsert(b"a", b"1").unwrap();
    pool.rotate().unwrap();
    pool.remove(b"a").unwrap();

    assert_eq!(view(&pool, b""), vec![(b"a".to_vec(), None)]);
}

#[test]
fn test_view_newest_pending_wins() {
    let (pool, _jobs) = new_pool(1024, 4);
    pool.upsert(b"k", b"gen1").unwrap();
    pool.rotate().unwrap();
    pool.upsert(b"k", b"gen2").unwrap();
    pool.rotate().unwrap();

    assert_eq!(view(&pool, b"k"), vec![(b"k".to_vec(), Some(b"gen2".to_vec()))]);
}

#[test]
fn test_flushed_removes_pending() {
    let (pool, _jobs) = new_pool(1024, 2);
    pool.upsert(b"a", b"1").unwrap();
    let generation = pool.rotate().unwrap().unwrap();
    assert_eq!(pool.pending_flush_count(), 1);

    pool.flushed(generation);
    assert_eq!(pool.pending_flush_count(), 0);
    assert!(view(&pool, b"").is_empty());
}

#[test]
fn test_size_in_bytes_reports_current_table() {
    let (pool, _jobs) = new_pool(1024, 2);
    pool.upsert(b"a", b"1").unwrap();
    assert_eq!(pool.size_in_bytes().unwrap(), 1 + 1 + 8);
}

// =============================================================================
// Close / Flush Notifications
// =============================================================================

#[test]
fn test_close_sends_shutdown_job() {
    let (pool, jobs) = new_pool(1024, 2);
    pool.upsert(b"a", b"1").unwrap();

    assert_eq!(pool.close().unwrap(), Some(1));
    assert!(pool.is_stopped());

    let job = jobs.try_recv().unwrap();
    assert!(job.is_shutdown());
    assert_eq!(job.generation(), 1);
    assert_eq!(job.table().entry_count(), 1);
}

#[test]
fn test_close_is_idempotent() {
    let (pool, jobs) = new_pool(1024, 2);
    assert_eq!(pool.close().unwrap(), Some(1));
    assert_eq!(pool.close().unwrap(), None);
    assert_eq!(jobs.try_iter().count(), 1);
}

#[test]
fn test_writes_after_close_rejected() {
    let (pool, _jobs) = new_pool(1024, 2);
    pool.close().unwrap();

    assert!(matches!(
        pool.upsert(b"a", b"1"),
        Err(StrataError::InvalidState(_))
    ));
    assert!(matches!(pool.remove(b"a"), Err(StrataError::InvalidState(_))));
    assert!(matches!(pool.rotate(), Err(StrataError::InvalidState(_))));
}

#[test]
fn test_rotation_fails_when_worker_gone() {
    let (pool, jobs) = new_pool(1024, 2);
    drop(jobs);
    pool.upsert(b"a", b"1").unwrap();

    assert!(matches!(pool.rotate(), Err(StrataError::Shutdown(_))));
}

#[test]
fn test_wait_until_flushed() {
    let (pool, jobs) = new_pool(1024, 2);
    let pool = Arc::new(pool);
    pool.upsert(b"a", b"1").unwrap();
    pool.rotate().unwrap();

    assert!(!pool.wait_until_flushed(Duration::from_millis(20)));

    let worker_pool = Arc::clone(&pool);
    let handle = thread::spawn(move || {
        let job = jobs.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        worker_pool.flushed(job.generation());
    });

    assert!(pool.wait_until_flushed(Duration::from_secs(5)));
    handle.join().unwrap();
}

#[test]
fn test_flush_failed_wakes_waiters() {
    let (pool, _jobs) = new_pool(1024, 2);
    let pool = Arc::new(pool);
    pool.upsert(b"a", b"1").unwrap();
    pool.rotate().unwrap();
    assert!(!pool.has_flush_failure());

    let worker_pool = Arc::clone(&pool);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        worker_pool.flush_failed();
    });

    let started = Instant::now();
    assert!(!pool.wait_until_flushed(Duration::from_secs(10)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(pool.has_flush_failure());
    assert_eq!(pool.pending_flush_count(), 1);
    handle.join().unwrap();

    // Later waits return at once
    let started = Instant::now();
    assert!(!pool.wait_until_flushed(Duration::from_secs(10)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_full_queue_blocks_writer_until_drained() {
    let (pool, jobs) = new_pool(1024, 1);
    let pool = Arc::new(pool);

    pool.upsert(b"a", b"1").unwrap();
    pool.rotate().unwrap();

    let writer_pool = Arc::clone(&pool);
    let writer = thread::spawn(move || {
        writer_pool.upsert(b"b", b"2").unwrap();
        // Blocks until the queued job is taken
        writer_pool.rotate().unwrap()
    });

    thread::sleep(Duration::from_millis(50));
    assert_eq!(jobs.len(), 1);

    assert_eq!(jobs.recv().unwrap().generation(), 1);
    assert_eq!(writer.join().unwrap(), Some(2));
    assert_eq!(jobs.recv().unwrap().generation(), 2);
}
