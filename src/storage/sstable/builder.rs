//! SSTable Builder
//!
//! Serializes an already sorted, duplicate-free cell stream to a new file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};

use crate::cell::Cell;
use crate::error::{Result, StrataError};

use super::{SSTable, LEN_SIZE, OFFSET_SIZE, TIMESTAMP_SIZE};

/// Builder for creating new SSTables from sorted cells
///
/// Pure serialization: the caller merges and collapses; the builder only
/// checks that keys arrive strictly ascending.
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Offset of every record, in write order
    offsets: Vec<u64>,
    /// Current write position
    current_offset: u64,
    /// Last key added, for the ordering check
    last_key: Option<Bytes>,
    /// Scratch buffer reused for every record
    scratch: BytesMut,
}

impl SSTableBuilder {
    /// Create a new SSTable builder, truncating any existing file at `path`
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offsets: Vec::new(),
            current_offset: 0,
            last_key: None,
            scratch: BytesMut::new(),
        })
    }

    /// Serialize a whole cell stream into a new file at `path`
    pub fn write_cells<I>(path: &Path, cells: I) -> Result<SSTable>
    where
        I: IntoIterator<Item = Result<Cell>>,
    {
        let mut builder = Self::new(path)?;
        for cell in cells {
            builder.add(&cell?)?;
        }
        builder.finish()
    }

    /// Append one cell (keys must be strictly ascending)
    pub fn add(&mut self, cell: &Cell) -> Result<()> {
        let key = cell.key();
        if let Some(last) = &self.last_key {
            if key <= last {
                return Err(StrataError::Storage(format!(
                    "SSTable keys must be strictly ascending: {:?} after {:?}",
                    key, last
                )));
            }
        }

        let key_len = encode_len(key.len(), "key")?;
        let timestamp = encode_timestamp(cell)?;

        self.scratch.clear();
        self.scratch.put_i32(key_len);
        self.scratch.put_slice(key);
        self.scratch.put_i64(timestamp);

        let mut record_size = LEN_SIZE + key.len() as u64 + TIMESTAMP_SIZE;

        if let Ok(data) = cell.value().data() {
            self.scratch.put_i32(encode_len(data.len(), "value")?);
            self.scratch.put_slice(data);
            record_size += LEN_SIZE + data.len() as u64;
        }

        self.writer.write_all(&self.scratch)?;

        self.offsets.push(self.current_offset);
        self.current_offset += record_size;

        self.last_key = Some(key.clone());

        Ok(())
    }

    /// Number of cells added so far
    pub fn entry_count(&self) -> u64 {
        self.offsets.len() as u64
    }

    /// Finish building: write offset index and row count, fsync, return metadata
    pub fn finish(mut self) -> Result<SSTable> {
        self.scratch.clear();
        self.scratch
            .reserve((self.offsets.len() as u64 * OFFSET_SIZE + OFFSET_SIZE) as usize);
        for offset in &self.offsets {
            self.scratch.put_i64(*offset as i64);
        }
        self.scratch.put_i64(self.offsets.len() as i64);
        self.writer.write_all(&self.scratch)?;

        // Flush everything and make it durable before the caller renames it
        let file = self.writer.into_inner().map_err(|e| {
            StrataError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SSTable {
            path: self.path,
            entry_count: self.offsets.len() as u64,
            file_size,
        })
    }
}

fn encode_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len)
        .map_err(|_| StrataError::Storage(format!("{} of {} bytes is too large", what, len)))
}

/// Signed on-disk timestamp: negative marks a tombstone
fn encode_timestamp(cell: &Cell) -> Result<i64> {
    let timestamp = cell.value().timestamp();
    let signed = i64::try_from(timestamp)
        .ok()
        .filter(|ts| *ts > 0)
        .ok_or_else(|| {
            StrataError::Storage(format!("timestamp {} cannot be encoded", timestamp))
        })?;
    Ok(if cell.value().is_removed() {
        -signed
    } else {
        signed
    })
}
