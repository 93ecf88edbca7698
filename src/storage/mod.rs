//! Storage Module
//!
//! Persistent storage layer built from immutable SSTables.
//!
//! ## Responsibilities
//! - Persist rotated MemTables to disk in sorted format (`flusher`)
//! - Point lookups and range scans via an in-memory offset index (`sstable`)
//! - Track the set of readable SSTables and their files (`manager`)
//! - Rewrite everything into one file on compaction
//!
//! ## Directory Layout
//! ```text
//! {data_dir}/
//!   ├── 1_sstable.dat
//!   ├── 2_sstable.dat
//!   └── 3_sstable.tmp   ← being written, renamed to .dat when complete
//! ```

mod flusher;
mod manager;
mod sstable;

pub use flusher::{FlushHealth, FlushPolicy, FlushWorker};
pub use manager::StorageManager;
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
