//! SSTable Iterator
//!
//! Forward-only, single-pass iteration from a starting row.

use std::fs::File;
use std::sync::Arc;

use crate::cell::Cell;
use crate::error::Result;

use super::reader::read_cell;

/// Iterator over SSTable cells in sorted key order
///
/// Owns handles to the file and offset index, so it stays valid after the
/// reader that created it is dropped (and, on unix, after the file itself
/// is unlinked by compaction).
pub struct SSTableIterator {
    file: Arc<File>,
    offsets: Arc<[u64]>,
    data_end: u64,
    /// Next row to decode
    next: usize,
}

impl SSTableIterator {
    pub(super) fn new(file: Arc<File>, offsets: Arc<[u64]>, data_end: u64, start: usize) -> Self {
        Self {
            file,
            offsets,
            data_end,
            next: start,
        }
    }

    /// Rows left to decode
    pub fn remaining(&self) -> usize {
        self.offsets.len().saturating_sub(self.next)
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = *self.offsets.get(self.next)?;
        match read_cell(&self.file, offset, self.data_end) {
            Ok(cell) => {
                self.next += 1;
                Some(Ok(cell))
            }
            Err(e) => {
                // A decode failure ends the pass
                self.next = self.offsets.len();
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}
