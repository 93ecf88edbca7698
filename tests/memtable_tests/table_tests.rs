//! Tests for MemTable
//!
//! These tests verify:
//! - Basic upsert/remove/get operations
//! - Size tracking
//! - Sorted iteration from a lower bound
//! - Concurrent writers

use std::sync::Arc;
use std::thread;

use stratakv::memtable::MemTable;
use stratakv::{SequenceClock, SortedTable};

// =============================================================================
// Helper Functions
// =============================================================================

fn new_table() -> MemTable {
    MemTable::new(Arc::new(SequenceClock::default()))
}

fn keys_of(table: &MemTable, from: &[u8]) -> Vec<Vec<u8>> {
    table.iter(from).map(|cell| cell.key().to_vec()).collect()
}

// =============================================================================
// Basic Operations
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let table = new_table();
    assert!(table.is_empty());
    assert_eq!(table.size(), 0);
    assert_eq!(table.entry_count(), 0);
}

#[test]
fn test_upsert_and_get() {
    let table = new_table();
    table.upsert(b"key1", b"value1");

    let value = table.get(b"key1").unwrap();
    assert!(!value.is_removed());
    assert_eq!(&value.data().unwrap()[..], b"value1");
}

#[test]
fn test_get_missing_key() {
    let table = new_table();
    table.upsert(b"key1", b"value1");
    assert!(table.get(b"key2").is_none());
}

#[test]
fn test_upsert_overwrites_with_newer_timestamp() {
    let table = new_table();
    table.upsert(b"key", b"v1");
    let first = table.get(b"key").unwrap().timestamp();

    table.upsert(b"key", b"v2");
    let second = table.get(b"key").unwrap();

    assert_eq!(&second.data().unwrap()[..], b"v2");
    assert!(second.timestamp() > first);
    assert_eq!(table.entry_count(), 1);
}

#[test]
fn test_remove_writes_tombstone() {
    let table = new_table();
    table.upsert(b"key", b"value");
    table.remove(b"key");

    let value = table.get(b"key").unwrap();
    assert!(value.is_removed());
    assert!(value.data().is_err());
}

#[test]
fn test_remove_unknown_key_still_records_tombstone() {
    let table = new_table();
    table.remove(b"ghost");

    assert_eq!(table.entry_count(), 1);
    assert!(table.get(b"ghost").unwrap().is_removed());
}

// =============================================================================
// Size Tracking
// =============================================================================

#[test]
fn test_size_of_new_entries() {
    let table = new_table();

    // key + payload + 8
    assert_eq!(table.upsert(b"abc", b"12345"), 3 + 5 + 8);
    // tombstone: key + 8
    assert_eq!(table.remove(b"de"), 16 + 2 + 8);
    assert_eq!(table.size(), 26);
}

#[test]
fn test_size_overwrite_adjusts_by_payload_delta() {
    let table = new_table();
    table.upsert(b"k", b"1234");
    assert_eq!(table.size(), 1 + 4 + 8);

    table.upsert(b"k", b"123456");
    assert_eq!(table.size(), 1 + 6 + 8);

    table.upsert(b"k", b"1");
    assert_eq!(table.size(), 1 + 1 + 8);

    table.remove(b"k");
    assert_eq!(table.size(), 1 + 8);
}

#[test]
fn test_should_flush_is_strictly_greater() {
    let table = new_table();
    table.upsert(b"k", b"1234567"); // 1 + 7 + 8 = 16
    assert!(!table.should_flush(16));
    assert!(table.should_flush(15));
}

#[test]
fn test_size_in_bytes_matches_size() {
    let table = new_table();
    table.upsert(b"a", b"b");
    assert_eq!(table.size_in_bytes().unwrap(), table.size());
}

// =============================================================================
// Iteration
// =============================================================================

#[test]
fn test_iter_sorted() {
    let table = new_table();
    table.upsert(b"c", b"3");
    table.upsert(b"a", b"1");
    table.upsert(b"b", b"2");

    assert_eq!(
        keys_of(&table, b""),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
    );
}

#[test]
fn test_iter_from_lower_bound() {
    let table = new_table();
    for key in [b"a", b"b", b"d", b"e"] {
        table.upsert(key, b"v");
    }

    assert_eq!(keys_of(&table, b"b"), vec![b"b".to_vec(), b"d".to_vec(), b"e".to_vec()]);
    assert_eq!(keys_of(&table, b"c"), vec![b"d".to_vec(), b"e".to_vec()]);
    assert!(keys_of(&table, b"f").is_empty());
}

#[test]
fn test_iter_includes_tombstones() {
    let table = new_table();
    table.upsert(b"a", b"1");
    table.remove(b"b");

    let cells: Vec<_> = table.iter(b"").collect();
    assert_eq!(cells.len(), 2);
    assert!(!cells[0].value().is_removed());
    assert!(cells[1].value().is_removed());
}

#[test]
fn test_iter_sees_concurrent_inserts_past_cursor() {
    let table = new_table();
    table.upsert(b"a", b"1");
    table.upsert(b"c", b"3");

    let mut iter = table.iter(b"");
    assert_eq!(&iter.next().unwrap().key()[..], b"a");

    // Inserted after the cursor: visible to the running iterator
    table.upsert(b"b", b"2");
    assert_eq!(&iter.next().unwrap().key()[..], b"b");
    assert_eq!(&iter.next().unwrap().key()[..], b"c");
    assert!(iter.next().is_none());
}

#[test]
fn test_sorted_table_iter_from_yields_ok_cells() {
    let table = new_table();
    table.upsert(b"x", b"1");
    table.upsert(b"y", b"2");

    let cells: Vec<_> = table
        .iter_from(b"y")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(&cells[0].key()[..], b"y");
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_upserts() {
    let table = Arc::new(new_table());
    let mut handles = Vec::new();

    for t in 0..4 {
        let table = Arc::clone(&table);
        handles.push(thread::spawn(move || {
            for i in 0..250 {
                let key = format!("t{}-{:04}", t, i);
                table.upsert(key.as_bytes(), b"value");
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.entry_count(), 1000);
    let keys = keys_of(&table, b"");
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
}
