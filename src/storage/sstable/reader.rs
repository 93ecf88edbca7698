//! SSTable Reader
//!
//! Opens SSTable files and positions reads via the in-memory offset index.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Buf, Bytes};

use crate::cell::{Cell, Value};
use crate::error::{Result, StrataError};
use crate::table::{CellIter, SortedTable};

use super::iterator::SSTableIterator;
use super::{read_exact_at, FOOTER_SIZE, LEN_SIZE, OFFSET_SIZE, TIMESTAMP_SIZE};

/// Reader for SSTable files
///
/// Only the offset index lives in memory; records are decoded on demand with
/// positioned reads, so a single open file serves any number of concurrent
/// lookups and iterators without locking.
pub struct SSTableReader {
    path: PathBuf,
    /// Shared with every iterator created from this reader
    file: Arc<File>,
    /// Byte offset of every record
    offsets: Arc<[u64]>,
    /// First byte after the data block (start of the offset index)
    data_end: u64,
    /// Key range, `None` for an empty table
    min_key: Option<Bytes>,
    max_key: Option<Bytes>,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Reads the row count from the last 8 bytes, then the offset index
    /// right before it. The data block is not touched.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < FOOTER_SIZE {
            return Err(corruption(path, format!("file too small ({} bytes)", file_size)));
        }

        // Footer: row count
        let mut footer = [0u8; FOOTER_SIZE as usize];
        read_exact_at(&file, &mut footer, file_size - FOOTER_SIZE)?;
        let rows = (&footer[..]).get_i64();

        let index_size = u64::try_from(rows)
            .ok()
            .and_then(|r| r.checked_mul(OFFSET_SIZE))
            .filter(|size| size + FOOTER_SIZE <= file_size)
            .ok_or_else(|| corruption(path, format!("invalid row count {}", rows)))?;
        let data_end = file_size - FOOTER_SIZE - index_size;

        // Offset index
        let mut index = vec![0u8; index_size as usize];
        read_exact_at(&file, &mut index, data_end)?;

        let mut buf = &index[..];
        let mut offsets = Vec::with_capacity(rows as usize);
        let mut previous: Option<u64> = None;
        while buf.has_remaining() {
            let raw = buf.get_i64();
            let offset = u64::try_from(raw)
                .ok()
                .filter(|off| *off < data_end)
                .filter(|off| previous.map_or(*off == 0, |prev| *off > prev))
                .ok_or_else(|| corruption(path, format!("invalid record offset {}", raw)))?;
            offsets.push(offset);
            previous = Some(offset);
        }

        let mut reader = Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
            offsets: offsets.into(),
            data_end,
            min_key: None,
            max_key: None,
        };
        if let Some(last) = reader.offsets.len().checked_sub(1) {
            reader.min_key = Some(reader.key_at(0)?);
            reader.max_key = Some(reader.key_at(last)?);
        }
        Ok(reader)
    }

    /// Index of the first cell whose key is `>= from` (`entry_count` if none)
    ///
    /// Binary search over the offset index, one key decode per step.
    pub fn lower_bound(&self, from: &[u8]) -> Result<usize> {
        let mut left = 0;
        let mut right = self.offsets.len();
        while left < right {
            let mid = left + (right - left) / 2;
            if &self.key_at(mid)?[..] < from {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Ok(left)
    }

    /// Cells with key `>= from`, lazily decoded
    pub fn iter(&self, from: &[u8]) -> Result<SSTableIterator> {
        let start = self.lower_bound(from)?;
        Ok(SSTableIterator::new(
            Arc::clone(&self.file),
            Arc::clone(&self.offsets),
            self.data_end,
            start,
        ))
    }

    /// False if `key` is definitely outside this table's key range
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (&self.min_key, &self.max_key) {
            (Some(min), Some(max)) => key >= &min[..] && key <= &max[..],
            _ => false,
        }
    }

    /// Newest timestamp stored in the table (0 if empty)
    ///
    /// Decodes every record, so it doubles as a full integrity check.
    pub fn max_timestamp(&self) -> Result<u64> {
        self.iter(&[])?
            .try_fold(0u64, |newest, cell| Ok(newest.max(cell?.value().timestamp())))
    }

    /// Look up a single key, tombstones included
    ///
    /// Returns `Ok(None)` if the key is not in this SSTable.
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        let index = self.lower_bound(key)?;
        if index >= self.offsets.len() {
            return Ok(None);
        }
        let cell = self.cell_at(index)?;
        if &cell.key()[..] == key {
            Ok(Some(cell.into_parts().1))
        } else {
            Ok(None)
        }
    }

    fn key_at(&self, index: usize) -> Result<Bytes> {
        let offset = self.offsets[index];
        let key_len = read_len(&self.file, offset, self.data_end)?;
        read_bytes(&self.file, offset + LEN_SIZE, key_len, self.data_end)
    }

    fn cell_at(&self, index: usize) -> Result<Cell> {
        read_cell(&self.file, self.offsets[index], self.data_end)
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.offsets.len()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn min_key(&self) -> Option<&Bytes> {
        self.min_key.as_ref()
    }

    pub fn max_key(&self) -> Option<&Bytes> {
        self.max_key.as_ref()
    }
}

impl SortedTable for SSTableReader {
    fn iter_from(&self, from: &[u8]) -> Result<CellIter> {
        Ok(Box::new(self.iter(from)?))
    }

    /// On-disk size is not tracked
    fn size_in_bytes(&self) -> Result<usize> {
        Err(StrataError::Unsupported("size_in_bytes on an SSTable"))
    }
}

// =============================================================================
// Record decoding (shared with the iterator)
// =============================================================================

/// Decode the record starting at `offset`
pub(super) fn read_cell(file: &File, offset: u64, data_end: u64) -> Result<Cell> {
    let key_len = read_len(file, offset, data_end)?;
    let mut pos = offset + LEN_SIZE;
    let key = read_bytes(file, pos, key_len, data_end)?;
    pos += key_len;

    let mut ts = [0u8; TIMESTAMP_SIZE as usize];
    check_bounds(pos, TIMESTAMP_SIZE, data_end)?;
    read_exact_at(file, &mut ts, pos)?;
    let timestamp = (&ts[..]).get_i64();
    pos += TIMESTAMP_SIZE;

    if timestamp < 0 {
        return Ok(Cell::new(key, Value::new(timestamp.unsigned_abs(), None)));
    }

    let value_len = read_len(file, pos, data_end)?;
    let data = read_bytes(file, pos + LEN_SIZE, value_len, data_end)?;
    Ok(Cell::new(key, Value::new(timestamp as u64, Some(data))))
}

fn read_len(file: &File, offset: u64, data_end: u64) -> Result<u64> {
    check_bounds(offset, LEN_SIZE, data_end)?;
    let mut len = [0u8; LEN_SIZE as usize];
    read_exact_at(file, &mut len, offset)?;
    let len = (&len[..]).get_i32();
    u64::try_from(len)
        .map_err(|_| StrataError::Corruption(format!("negative length {} at {}", len, offset)))
}

fn read_bytes(file: &File, offset: u64, len: u64, data_end: u64) -> Result<Bytes> {
    check_bounds(offset, len, data_end)?;
    let mut buf = vec![0u8; len as usize];
    read_exact_at(file, &mut buf, offset)?;
    Ok(Bytes::from(buf))
}

fn check_bounds(offset: u64, len: u64, data_end: u64) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > data_end) {
        return Err(StrataError::Corruption(format!(
            "record field [{}, +{}) runs past data block end {}",
            offset, len, data_end
        )));
    }
    Ok(())
}

fn corruption(path: &Path, reason: String) -> StrataError {
    StrataError::Corruption(format!("{}: {}", path.display(), reason))
}
