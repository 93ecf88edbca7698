//! Sorted table abstraction
//!
//! Shared capability of the MemTable, the MemTable pool and on-disk SSTables.

use crate::cell::Cell;
use crate::error::Result;

/// Owned, lazily evaluated stream of cells in (key asc, timestamp desc) order
///
/// I/O failures surface as `Err` items; a stream that yielded an error yields
/// nothing afterwards.
pub type CellIter = Box<dyn Iterator<Item = Result<Cell>> + Send>;

/// A sorted source of cells
pub trait SortedTable: Send + Sync {
    /// Cells with key `>= from`, ascending
    fn iter_from(&self, from: &[u8]) -> Result<CellIter>;

    /// Estimated bytes held by the table
    fn size_in_bytes(&self) -> Result<usize>;
}
