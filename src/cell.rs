//! Versioned values and cells
//!
//! A [`Cell`] is the unit moved through every layer of the engine: MemTable,
//! pool, SSTable and merge iterators all produce and consume cells.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::clock::Clock;
use crate::error::{Result, StrataError};

// =============================================================================
// Value
// =============================================================================

/// A timestamped payload, or a timestamped tombstone when `data` is `None`
///
/// Tombstones keep their timestamp so they can shadow older live values in
/// other tables until compaction drops them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    timestamp: u64,
    data: Option<Bytes>,
}

impl Value {
    /// Build a value from raw parts (used when decoding SSTables)
    pub fn new(timestamp: u64, data: Option<Bytes>) -> Self {
        Self { timestamp, data }
    }

    /// A live value stamped with the next clock tick
    pub fn of(data: Bytes, clock: &dyn Clock) -> Self {
        Self::new(clock.tick(), Some(data))
    }

    /// A tombstone stamped with the next clock tick
    pub fn tombstone(clock: &dyn Clock) -> Self {
        Self::new(clock.tick(), None)
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// True for tombstones
    pub fn is_removed(&self) -> bool {
        self.data.is_none()
    }

    /// The payload of a live value
    ///
    /// Fails with [`StrataError::InvalidState`] on a tombstone.
    pub fn data(&self) -> Result<&Bytes> {
        self.data.as_ref().ok_or_else(|| {
            StrataError::InvalidState("tombstone has no payload".to_string())
        })
    }

    /// Payload length, 0 for tombstones
    pub fn data_len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    pub(crate) fn into_data(self) -> Option<Bytes> {
        self.data
    }
}

// =============================================================================
// Cell
// =============================================================================

/// A key together with its versioned value
///
/// Ordering: key ascending, then timestamp descending, so among cells with
/// the same key the most recent write always comes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    key: Bytes,
    value: Value,
}

impl Cell {
    pub fn new(key: Bytes, value: Value) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_parts(self) -> (Bytes, Value) {
        (self.key, self.value)
    }
}

impl Ord for Cell {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.value.timestamp.cmp(&self.value.timestamp))
    }
}

impl PartialOrd for Cell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
