//! MemTable implementation
//!
//! Lock-free skip list memtable with an atomic size estimate.

use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::cell::{Cell, Value};
use crate::clock::Clock;
use crate::error::{Result, StrataError};
use crate::table::{CellIter, SortedTable};

/// Fixed per-entry overhead charged for the timestamp
const ENTRY_OVERHEAD: usize = std::mem::size_of::<u64>();

/// In-memory table for recent writes
///
/// ## Concurrency
/// - `map`: `SkipMap`, safe for concurrent inserts and iteration without locks
/// - `size`: atomic byte estimate, maintained incrementally
///
/// Concurrent writers to the same key may skew the estimate slightly; the
/// map itself always holds the value of the last completed insert.
pub struct MemTable {
    map: Arc<SkipMap<Bytes, Value>>,
    size: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl MemTable {
    /// Create a new empty MemTable stamping writes with `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: Arc::new(SkipMap::new()),
            size: AtomicUsize::new(0),
            clock,
        }
    }

    /// Insert or overwrite a live value
    ///
    /// Returns the size estimate after the write.
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> usize {
        let value = Value::of(Bytes::copy_from_slice(value), self.clock.as_ref());
        self.insert(key, value)
    }

    /// Record a deletion by inserting a tombstone
    ///
    /// Returns the size estimate after the write.
    pub fn remove(&self, key: &[u8]) -> usize {
        let value = Value::tombstone(self.clock.as_ref());
        self.insert(key, value)
    }

    fn insert(&self, key: &[u8], value: Value) -> usize {
        let new_len = value.data_len();
        let previous_len = self.map.get(key).map(|e| e.value().data_len());

        self.map.insert(Bytes::copy_from_slice(key), value);

        match previous_len {
            None => self.grow(key.len() + new_len + ENTRY_OVERHEAD),
            Some(old_len) if new_len >= old_len => self.grow(new_len - old_len),
            Some(old_len) => self.shrink(old_len - new_len),
        }
    }

    fn grow(&self, delta: usize) -> usize {
        self.size.fetch_add(delta, Ordering::AcqRel) + delta
    }

    fn shrink(&self, delta: usize) -> usize {
        let previous = self
            .size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some(s.saturating_sub(delta))
            })
            .unwrap_or(0);
        previous.saturating_sub(delta)
    }

    /// Latest value for a key, tombstones included
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.map.get(key).map(|e| e.value().clone())
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Number of distinct keys (tombstones included)
    pub fn entry_count(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Check if the table has grown past `size_limit`
    pub fn should_flush(&self, size_limit: usize) -> bool {
        self.size() > size_limit
    }

    /// Ascending cells with key `>= from`
    pub fn iter(&self, from: &[u8]) -> MemTableIterator {
        MemTableIterator {
            map: Arc::clone(&self.map),
            from: Bytes::copy_from_slice(from),
            last: None,
        }
    }
}

impl SortedTable for MemTable {
    fn iter_from(&self, from: &[u8]) -> Result<CellIter> {
        Ok(Box::new(self.iter(from).map(Ok::<Cell, StrataError>)))
    }

    fn size_in_bytes(&self) -> Result<usize> {
        Ok(self.size())
    }
}

/// Iterator over MemTable entries
///
/// Holds no borrow of the map: every step seeks past the last key it
/// returned, so writers are never blocked and each yielded cell is a
/// complete entry as of the moment it was read.
pub struct MemTableIterator {
    map: Arc<SkipMap<Bytes, Value>>,
    from: Bytes,
    last: Option<Bytes>,
}

impl Iterator for MemTableIterator {
    type Item = Cell;

    fn next(&mut self) -> Option<Self::Item> {
        let bound = match &self.last {
            Some(key) => Bound::Excluded(&key[..]),
            None => Bound::Included(&self.from[..]),
        };
        let (key, value) = {
            let entry = self.map.lower_bound(bound)?;
            (entry.key().clone(), entry.value().clone())
        };
        self.last = Some(key.clone());
        Some(Cell::new(key, value))
    }
}
