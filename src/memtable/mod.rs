//! MemTable Module
//!
//! In-memory data structures for recent writes.
//!
//! ## Responsibilities
//! - Absorb writes without locking (`MemTable`)
//! - Track size for rotation triggers
//! - Ordered iteration for reads and SSTable creation
//! - Rotate full tables to the flush worker with backpressure (`MemTablePool`)
//!
//! ## Data Structure Choice
//! `crossbeam_skiplist::SkipMap`:
//! - Ordered keys (required for SSTable generation)
//! - Concurrent inserts and iteration without an external lock
//! - Removal is an insert of a tombstone, entries are never unlinked

mod pool;
mod table;

pub use pool::{FlushJob, MemTablePool};
pub use table::{MemTable, MemTableIterator};
