//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! All integers are big-endian.
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Block (variable)                                   │
//! │   [KeyLen: i32][Key][Timestamp: i64]                    │
//! │     if Timestamp >= 0: [ValLen: i32][Value]             │
//! │   (negative Timestamp = tombstone, |Timestamp| is real) │
//! │   ... repeated for each cell, keys strictly ascending   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Offset Index (8 * RowCount bytes)                       │
//! │   [Offset: i64] of each record, in write order          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (8 bytes)                                        │
//! │   RowCount: i64                                         │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod builder;
mod iterator;
mod reader;

use std::fs::File;
use std::path::PathBuf;

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTableReader;

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Size of a length prefix (key or value)
pub(crate) const LEN_SIZE: u64 = 4;

/// Size of the signed timestamp
pub(crate) const TIMESTAMP_SIZE: u64 = 8;

/// Size of one offset index slot
pub(crate) const OFFSET_SIZE: u64 = 8;

/// Footer size: RowCount (8)
pub(crate) const FOOTER_SIZE: u64 = 8;

// =============================================================================
// SSTable Metadata
// =============================================================================

/// Metadata describing a finished SSTable file
#[derive(Debug, Clone)]
pub struct SSTable {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Number of cells in this SSTable
    pub entry_count: u64,
    /// File size in bytes
    pub file_size: u64,
}

impl SSTable {
    /// Get the number of entries
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }
}

// =============================================================================
// Positioned reads
// =============================================================================

/// Fill `buf` from `offset` without touching the shared file cursor
#[cfg(unix)]
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

/// Fill `buf` from `offset` without touching the shared file cursor
#[cfg(windows)]
pub(crate) fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::io::{Error, ErrorKind};
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(Error::new(ErrorKind::UnexpectedEof, "short positioned read")),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
