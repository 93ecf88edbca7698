//! Storage Manager
//!
//! Manages the set of SSTables and their files.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Name files by generation, publish them via temp file + atomic rename
//! - Hand out snapshots of the readable set
//! - Replace the whole set after compaction

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::cell::Cell;
use crate::error::{Result, StrataError};

use super::{SSTable, SSTableBuilder, SSTableReader};

/// Suffix shared by data and temp file names: `<generation>_sstable.<ext>`
const FILE_SUFFIX: &str = "_sstable";
const DATA_EXTENSION: &str = "dat";
const TEMP_EXTENSION: &str = "tmp";

/// One published SSTable
struct TableEntry {
    generation: u64,
    reader: Arc<SSTableReader>,
}

/// Manages the storage layer
///
/// ## Concurrency:
/// - `sstables`: RwLock over `Arc`ed readers, ordered newest → oldest.
///   Readers clone the `Arc`s and drop the lock immediately, so a snapshot
///   stays usable while new tables are appended or the set is replaced.
/// - All methods use `&self`
pub struct StorageManager {
    /// Directory where SSTables are stored
    data_dir: PathBuf,

    /// Open SSTable readers, ordered newest → oldest
    sstables: RwLock<Vec<TableEntry>>,

    /// Highest generation found on disk at startup
    recovered_max_generation: Option<u64>,

    /// Newest cell timestamp in the tables opened at startup
    recovered_max_timestamp: u64,

    /// Files that were found at startup but could not be opened
    recovery_failures: Vec<PathBuf>,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Delete leftover temp files from interrupted flushes
    /// 3. Open and fully decode every `<generation>_sstable.dat`, collecting
    ///    failures and the newest timestamp
    /// 4. Order by generation descending (newest first)
    ///
    /// Fails only if files exist and none of them could be opened.
    pub fn open(path: &Path) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut generations: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            if let Some(generation) = Self::parse_generation(&file_path, DATA_EXTENSION) {
                generations.push(generation);
            } else if Self::parse_generation(&file_path, TEMP_EXTENSION).is_some() {
                warn!(path = %file_path.display(), "removing stale temp file");
                fs::remove_file(&file_path)?;
            }
        }

        generations.sort_unstable_by(|a, b| b.cmp(a));

        let mut sstables = Vec::with_capacity(generations.len());
        let mut recovery_failures = Vec::new();
        let mut recovered_max_timestamp = 0;
        for &generation in &generations {
            let sstable_path = Self::sstable_path_with_dir(path, generation);
            let opened = SSTableReader::open(&sstable_path)
                .and_then(|reader| Ok((reader.max_timestamp()?, reader)));
            match opened {
                Ok((max_timestamp, reader)) => {
                    recovered_max_timestamp = recovered_max_timestamp.max(max_timestamp);
                    sstables.push(TableEntry {
                        generation,
                        reader: Arc::new(reader),
                    });
                }
                Err(e) => {
                    warn!(path = %sstable_path.display(), error = %e, "failed to open SSTable");
                    recovery_failures.push(sstable_path);
                }
            }
        }

        if sstables.is_empty() && !recovery_failures.is_empty() {
            return Err(StrataError::Recovery {
                failed: recovery_failures,
            });
        }

        info!(
            dir = %path.display(),
            sstables = sstables.len(),
            failed = recovery_failures.len(),
            "storage opened"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            sstables: RwLock::new(sstables),
            recovered_max_generation: generations.first().copied(),
            recovered_max_timestamp,
            recovery_failures,
        })
    }

    /// Readers of every published SSTable, newest first
    pub fn snapshot(&self) -> Vec<Arc<SSTableReader>> {
        self.sstables
            .read()
            .iter()
            .map(|entry| Arc::clone(&entry.reader))
            .collect()
    }

    /// Write `cells` as the SSTable of `generation` and make it readable
    ///
    /// Returns `None` without creating a file if `cells` is empty.
    pub fn flush_table<I>(&self, generation: u64, cells: I) -> Result<Option<SSTable>>
    where
        I: IntoIterator<Item = Result<Cell>>,
    {
        let mut cells = cells.into_iter().peekable();
        if cells.peek().is_none() {
            return Ok(None);
        }

        let (metadata, reader) = self.write_table(generation, cells)?;

        let mut sstables = self.sstables.write();
        let position = sstables
            .iter()
            .position(|entry| entry.generation < generation)
            .unwrap_or(sstables.len());
        sstables.insert(position, TableEntry { generation, reader });

        debug!(generation, entries = metadata.entry_count, "SSTable published");
        Ok(Some(metadata))
    }

    /// Write `cells` as the SSTable of `generation`, make it the only
    /// readable table, then delete every other SSTable file
    ///
    /// An empty stream still produces a (zero-row) file. On error the
    /// current set is left untouched.
    pub fn replace_all<I>(&self, generation: u64, cells: I) -> Result<SSTable>
    where
        I: IntoIterator<Item = Result<Cell>>,
    {
        let (metadata, reader) = self.write_table(generation, cells)?;

        let superseded = {
            let mut sstables = self.sstables.write();
            std::mem::replace(&mut *sstables, vec![TableEntry { generation, reader }])
        };

        // Open iterators keep their own handles; unlinking is safe
        for entry in superseded {
            let path = entry.reader.path().to_path_buf();
            drop(entry);
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "failed to delete superseded SSTable");
            }
        }

        // Files that failed to open at startup are superseded too
        for path in &self.recovery_failures {
            if path.exists() {
                if let Err(e) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to delete unreadable SSTable");
                }
            }
        }

        Ok(metadata)
    }

    /// Serialize to `<generation>_sstable.tmp`, rename to `.dat`, open
    fn write_table<I>(&self, generation: u64, cells: I) -> Result<(SSTable, Arc<SSTableReader>)>
    where
        I: IntoIterator<Item = Result<Cell>>,
    {
        let temp_path = self.temp_path(generation);
        let final_path = self.sstable_path(generation);

        let written = SSTableBuilder::write_cells(&temp_path, cells)
            .and_then(|metadata| {
                fs::rename(&temp_path, &final_path)?;
                Ok(metadata)
            });
        let mut metadata = match written {
            Ok(metadata) => metadata,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&temp_path) {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        warn!(path = %temp_path.display(), error = %cleanup, "failed to delete temp file");
                    }
                }
                return Err(e);
            }
        };
        metadata.path = final_path.clone();

        let reader = SSTableReader::open(&final_path)?;
        Ok((metadata, Arc::new(reader)))
    }

    /// Drop every reader (file handles close once iterators finish)
    pub fn close(&self) {
        self.sstables.write().clear();
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.sstables.read().len()
    }

    /// Generations of the published SSTables, newest first
    pub fn generations(&self) -> Vec<u64> {
        self.sstables.read().iter().map(|e| e.generation).collect()
    }

    /// Highest generation found on disk at startup
    pub fn recovered_max_generation(&self) -> Option<u64> {
        self.recovered_max_generation
    }

    /// Newest cell timestamp in the tables opened at startup (0 if none)
    pub fn recovered_max_timestamp(&self) -> u64 {
        self.recovered_max_timestamp
    }

    /// SSTable files that could not be opened at startup
    pub fn recovery_failures(&self) -> &[PathBuf] {
        &self.recovery_failures
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Generate the file path for an SSTable with given generation
    pub fn sstable_path(&self, generation: u64) -> PathBuf {
        Self::sstable_path_with_dir(&self.data_dir, generation)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn temp_path(&self, generation: u64) -> PathBuf {
        self.data_dir
            .join(format!("{}{}.{}", generation, FILE_SUFFIX, TEMP_EXTENSION))
    }

    /// Generate SSTable path given a directory and generation
    fn sstable_path_with_dir(dir: &Path, generation: u64) -> PathBuf {
        dir.join(format!("{}{}.{}", generation, FILE_SUFFIX, DATA_EXTENSION))
    }

    /// Parse the generation from a file name
    /// "42_sstable.dat" → Some(42)
    fn parse_generation(path: &Path, extension: &str) -> Option<u64> {
        if path.extension()?.to_str()? != extension {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        stem.strip_suffix(FILE_SUFFIX)?.parse().ok()
    }
}
