//! Tests for concurrent Engine access
//!
//! These tests verify:
//! - Concurrent writers with background flushes lose nothing
//! - Readers racing with flushes never miss a value
//! - Compaction concurrent with writers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use stratakv::config::Config;
use stratakv::engine::Engine;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const WAIT: Duration = Duration::from_secs(30);

fn setup_shared_engine(limit: usize) -> (TempDir, Arc<Engine>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .memtable_size_limit(limit)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, Arc::new(engine))
}

fn key(thread: usize, i: usize) -> Vec<u8> {
    format!("t{}-key{:05}", thread, i).into_bytes()
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_with_flushes() {
    let (_temp, engine) = setup_shared_engine(2 * 1024);
    let mut handles = Vec::new();

    for t in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                engine.upsert(&key(t, i), format!("value{}", i).as_bytes()).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    engine.wait_for_flush(WAIT).unwrap();

    assert!(engine.sstable_count() > 1);
    for t in 0..4 {
        for i in 0..500 {
            let value = engine.get(&key(t, i)).unwrap().unwrap();
            assert_eq!(&value[..], format!("value{}", i).as_bytes());
        }
    }
    assert_eq!(engine.iter(b"").unwrap().count(), 2000);
}

#[test]
fn test_readers_never_miss_values_during_flush() {
    let (_temp, engine) = setup_shared_engine(1024);

    // Stable keys written up front, then rotated under readers' feet
    for i in 0..200 {
        engine.upsert(&key(9, i), b"stable").unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let writer = {
        let engine = Arc::clone(&engine);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut i = 0;
            while !stop.load(Ordering::Relaxed) {
                engine.upsert(&key(0, i % 1000), b"churn").unwrap();
                i += 1;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..3 {
        let engine = Arc::clone(&engine);
        readers.push(thread::spawn(move || {
            for round in 0..20 {
                for i in (round % 7..200).step_by(7) {
                    let value = engine.get(&key(9, i)).unwrap();
                    assert_eq!(value.as_deref(), Some(&b"stable"[..]));
                }
            }
        }));
    }

    for reader in readers {
        reader.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    writer.join().unwrap();
}

#[test]
fn test_compact_while_writing() {
    let (_temp, engine) = setup_shared_engine(1024);

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 0..2000 {
                engine.upsert(&key(1, i), b"value").unwrap();
            }
        })
    };

    for _ in 0..3 {
        engine.compact().unwrap();
        thread::sleep(Duration::from_millis(5));
    }
    writer.join().unwrap();
    engine.compact().unwrap();

    assert_eq!(engine.sstable_count(), 1);
    assert_eq!(engine.iter(b"").unwrap().count(), 2000);
}
