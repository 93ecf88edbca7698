//! K-way merge over sorted cell streams

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::cell::Cell;
use crate::error::{Result, StrataError};
use crate::table::CellIter;

/// Merges multiple sorted sources into a single sorted stream.
///
/// Used for:
/// - the pool's view over its MemTables
/// - the engine's read path across pool and SSTables
/// - compaction
///
/// Sources are ordered by priority: index 0 = newest. Output order is
/// (key ASC, timestamp DESC); two cells with the same key and timestamp
/// come out newest source first. Duplicates are not removed here.
///
/// Each step costs O(log sources). A source error is yielded after the cell
/// already popped, then the merge ends.
pub struct MergeIterator {
    sources: Vec<CellIter>,
    heap: BinaryHeap<HeapEntry>,
    pending_error: Option<StrataError>,
    finished: bool,
}

struct HeapEntry {
    cell: Cell,
    source: usize,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse so the smallest cell pops first
        self.cell
            .cmp(&other.cell)
            .then_with(|| self.source.cmp(&other.source))
            .reverse()
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl MergeIterator {
    /// Prime every source with its first cell
    pub fn new(mut sources: Vec<CellIter>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (source, iter) in sources.iter_mut().enumerate() {
            if let Some(cell) = iter.next() {
                heap.push(HeapEntry { cell: cell?, source });
            }
        }

        Ok(Self {
            sources,
            heap,
            pending_error: None,
            finished: false,
        })
    }

    /// Number of sources still holding cells
    pub fn live_sources(&self) -> usize {
        self.heap.len()
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if let Some(e) = self.pending_error.take() {
            self.finished = true;
            return Some(Err(e));
        }

        let Some(HeapEntry { cell, source }) = self.heap.pop() else {
            self.finished = true;
            return None;
        };

        match self.sources[source].next() {
            Some(Ok(next)) => self.heap.push(HeapEntry { cell: next, source }),
            Some(Err(e)) => self.pending_error = Some(e),
            None => {}
        }

        Some(Ok(cell))
    }
}
