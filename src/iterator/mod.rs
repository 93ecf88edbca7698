//! Iterator Module
//!
//! Composable stages that turn several sorted cell streams into the
//! engine's logical view:
//!
//! ```text
//!   source 0 (newest) ─┐
//!   source 1          ─┼─▶ MergeIterator ─▶ CollapseDuplicates ─▶ AliveCells
//!   source n (oldest) ─┘   (key asc,         (first cell per       (drop
//!                           ts desc)           key wins)             tombstones)
//! ```
//!
//! The pool stops after collapsing (it still needs tombstones to shadow
//! on-disk data); the engine applies all three stages.

mod merge;

pub use merge::MergeIterator;

use bytes::Bytes;

use crate::cell::Cell;
use crate::error::Result;
use crate::table::CellIter;

/// Merge `sources` (ordered newest first) and keep the freshest cell per key
pub fn merge_collapsed(sources: Vec<CellIter>) -> Result<CollapseDuplicates<MergeIterator>> {
    Ok(CollapseDuplicates::new(MergeIterator::new(sources)?))
}

/// Merge, collapse and drop tombstones
pub fn merge_alive(
    sources: Vec<CellIter>,
) -> Result<AliveCells<CollapseDuplicates<MergeIterator>>> {
    Ok(AliveCells::new(merge_collapsed(sources)?))
}

// =============================================================================
// CollapseDuplicates
// =============================================================================

/// Keeps only the first cell of every run of equal keys
///
/// Input must be ordered by key ascending and timestamp descending, so the
/// kept cell is the most recent write.
pub struct CollapseDuplicates<I> {
    inner: I,
    last_key: Option<Bytes>,
}

impl<I> CollapseDuplicates<I> {
    pub fn new(inner: I) -> Self {
        Self {
            inner,
            last_key: None,
        }
    }
}

impl<I> Iterator for CollapseDuplicates<I>
where
    I: Iterator<Item = Result<Cell>>,
{
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(cell) => {
                    if self.last_key.as_ref() == Some(cell.key()) {
                        continue;
                    }
                    self.last_key = Some(cell.key().clone());
                    return Some(Ok(cell));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

// =============================================================================
// AliveCells
// =============================================================================

/// Drops tombstones
pub struct AliveCells<I> {
    inner: I,
}

impl<I> AliveCells<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> Iterator for AliveCells<I>
where
    I: Iterator<Item = Result<Cell>>,
{
    type Item = Result<Cell>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(cell) if cell.value().is_removed() => continue,
                other => return Some(other),
            }
        }
    }
}
