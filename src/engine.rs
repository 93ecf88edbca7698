//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Route writes to the MemTable pool
//! - Merge pool and SSTables into one newest-wins, tombstone-free view
//! - Own the flush worker and react to completed flushes
//! - Recover SSTables on startup
//! - Full compaction

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info};

use crate::cell::Cell;
use crate::clock::{Clock, MonotonicClock};
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::iterator::{merge_alive, AliveCells, CollapseDuplicates, MergeIterator};
use crate::memtable::MemTablePool;
use crate::storage::{FlushHealth, FlushPolicy, FlushWorker, SSTableReader, StorageManager};
use crate::table::{CellIter, SortedTable};

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** (upsert/remove): lock-free inserts into the current MemTable;
///   the pool takes its own write lock only to rotate.
/// - **Reads** (get/iter): snapshot the pool view, then the SSTable set, and
///   merge them lazily. Snapshots are `Arc`s, so flushes and compaction
///   never invalidate an iterator already in progress.
/// - **Flush**: one background thread; the engine only publishes what it
///   finished.
/// - **Compaction / close**: take the `pool` slot exclusively, which stops
///   all other operations until they finish.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Timestamp source shared by every MemTable
    clock: Arc<dyn Clock>,

    /// Persistent storage manager (internal RwLock on the SSTable set)
    storage: Arc<StorageManager>,

    /// The live MemTable pool; swapped by compaction
    pool: RwLock<Arc<MemTablePool>>,

    /// Background flush thread of the current pool
    flusher: Mutex<Option<FlushWorker>>,

    /// Set once a flush exhausted its retries
    health: Arc<FlushHealth>,

    closed: AtomicBool,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Create data directory, drop stale temp files
    /// 2. Open existing SSTables (reporting the ones that fail)
    /// 3. Continue generations after the highest file found
    /// 4. Move the clock past the newest recovered timestamp
    /// 5. Start the flush worker
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Open with an explicit timestamp source
    pub fn open_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let storage = StorageManager::open(&config.data_dir)?;
        if config.strict_recovery && !storage.recovery_failures().is_empty() {
            return Err(StrataError::Recovery {
                failed: storage.recovery_failures().to_vec(),
            });
        }
        let storage = Arc::new(storage);

        // New writes must sort above everything already on disk
        clock.observe(storage.recovered_max_timestamp());

        let recovered_next = storage.recovered_max_generation().map_or(1, |g| g + 1);
        let start_generation = config
            .start_generation
            .map_or(recovered_next, |g| g.max(recovered_next));

        let health = Arc::new(FlushHealth::new());
        let (pool, worker) =
            Self::start_pool(&config, &clock, &storage, &health, start_generation)?;

        info!(
            data_dir = %config.data_dir.display(),
            sstables = storage.sstable_count(),
            start_generation,
            "engine opened"
        );

        Ok(Self {
            config,
            clock,
            storage,
            pool: RwLock::new(pool),
            flusher: Mutex::new(Some(worker)),
            health,
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    fn start_pool(
        config: &Config,
        clock: &Arc<dyn Clock>,
        storage: &Arc<StorageManager>,
        health: &Arc<FlushHealth>,
        start_generation: u64,
    ) -> Result<(Arc<MemTablePool>, FlushWorker)> {
        let (pool, jobs) = MemTablePool::new(
            config.memtable_size_limit,
            start_generation,
            config.flush_queue_capacity,
            Arc::clone(clock),
        );
        let pool = Arc::new(pool);
        let worker = FlushWorker::spawn(
            jobs,
            Arc::clone(&pool),
            Arc::clone(storage),
            Arc::clone(health),
            FlushPolicy::from(config),
        )?;
        Ok((pool, worker))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Returns `Ok(None)` if the key was never written or its latest write
    /// is a delete.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        // Tables whose key range excludes `key` cannot change the answer
        let sources = self.sources(key, |reader| reader.might_contain(key))?;
        match (EngineIterator { cells: merge_alive(sources)? }).next() {
            Some(Ok((found, value))) if &found[..] == key => Ok(Some(value)),
            Some(Err(e)) => Err(e),
            _ => Ok(None),
        }
    }

    /// Alive key-value pairs with key `>= from`, ascending
    ///
    /// The iterator sees everything written before the call; later writes
    /// may or may not appear. Call again to restart.
    pub fn iter(&self, from: &[u8]) -> Result<EngineIterator> {
        let sources = self.sources(from, |_| true)?;
        Ok(EngineIterator {
            cells: merge_alive(sources)?,
        })
    }

    /// Pool view plus every SSTable accepted by `filter`, newest first
    fn sources<F>(&self, from: &[u8], filter: F) -> Result<Vec<CellIter>>
    where
        F: Fn(&SSTableReader) -> bool,
    {
        self.ensure_open()?;
        let pool = self.pool.read();

        // Pool first: a table that finishes flushing between the two
        // snapshots is then seen in at least one of them
        let mut sources: Vec<CellIter> = vec![pool.iter_from(from)?];
        for reader in self.storage.snapshot() {
            if filter(&*reader) {
                sources.push(reader.iter_from(from)?);
            }
        }
        Ok(sources)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or overwrite a key
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.pool.read().upsert(key, value)
    }

    /// Delete a key (writes a tombstone)
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        self.pool.read().remove(key)
    }

    /// Hand the current MemTable to the flush worker regardless of its size
    ///
    /// Returns once the table is queued; see [`Engine::wait_for_flush`].
    pub fn flush(&self) -> Result<()> {
        self.ensure_writable()?;
        if let Some(generation) = self.pool.read().rotate()? {
            debug!(generation, "manual flush requested");
        }
        Ok(())
    }

    /// Block until every rotated MemTable is on disk
    pub fn wait_for_flush(&self, timeout: Duration) -> Result<()> {
        self.ensure_writable()?;
        let pool = Arc::clone(&self.pool.read());
        let drained = pool.wait_until_flushed(timeout);
        // A given-up flush wakes the wait early
        self.health.check()?;
        if drained {
            Ok(())
        } else {
            Err(StrataError::FlushTimeout)
        }
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// Rewrite all alive data into a single SSTable
    ///
    /// Steps (all other operations wait):
    /// 1. Close the pool and wait for the worker to drain it to disk
    /// 2. Merge every SSTable, drop tombstones, write one new SSTable at
    ///    the next generation
    /// 3. Publish it as the only table and delete the superseded files
    /// 4. Start a fresh pool and worker
    pub fn compact(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut pool = self.pool.write();
        self.ensure_open()?;

        let last_generation = pool.close()?.unwrap_or_else(|| pool.generation());
        self.join_flusher()?;

        // Draining failed: keep the stopped pool so its tables stay readable
        self.health.check()?;

        let mut sources: Vec<CellIter> = vec![pool.iter_from(&[])?];
        for reader in self.storage.snapshot() {
            sources.push(reader.iter_from(&[])?);
        }
        let generation = last_generation + 1;

        let compacted = merge_alive(sources)
            .and_then(|cells| self.storage.replace_all(generation, cells));

        let (fresh, worker) = Self::start_pool(
            &self.config,
            &self.clock,
            &self.storage,
            &self.health,
            generation + 1,
        )?;
        *pool = fresh;
        *self.flusher.lock() = Some(worker);

        let metadata = compacted?;
        info!(
            generation,
            entries = metadata.entry_count,
            bytes = metadata.file_size,
            "compaction finished"
        );
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine gracefully
    ///
    /// Flushes the current MemTable, waits for the worker to finish, then
    /// releases file handles. Calling `close` twice is harmless.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let pool = self.pool.write();
        let closed = pool.close();
        let joined = self.join_flusher();
        self.storage.close();

        closed?;
        joined?;
        self.health.check()?;

        info!(data_dir = %self.config.data_dir.display(), "engine closed");
        Ok(())
    }

    fn join_flusher(&self) -> Result<()> {
        match self.flusher.lock().take() {
            Some(worker) => worker.join(),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::InvalidState("engine is closed".to_string()));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        self.health.check()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the number of SSTables
    pub fn sstable_count(&self) -> usize {
        self.storage.sstable_count()
    }

    /// Get the current memtable size
    pub fn memtable_size(&self) -> usize {
        self.pool.read().size()
    }

    /// Get the current memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.pool.read().current_entry_count()
    }

    /// Rotated MemTables not yet on disk
    pub fn pending_flush_count(&self) -> usize {
        self.pool.read().pending_flush_count()
    }

    /// Generation the next rotation will use
    pub fn generation(&self) -> u64 {
        self.pool.read().generation()
    }

    /// SSTable files that could not be opened at startup
    pub fn recovery_failures(&self) -> &[std::path::PathBuf] {
        self.storage.recovery_failures()
    }

    /// True once a flush has been given up
    pub fn is_degraded(&self) -> bool {
        self.health.is_degraded()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(error = %e, "engine close on drop failed");
        }
    }
}

// =============================================================================
// EngineIterator
// =============================================================================

/// Alive `(key, value)` pairs in ascending key order
pub struct EngineIterator {
    cells: AliveCells<CollapseDuplicates<MergeIterator>>,
}

impl Iterator for EngineIterator {
    type Item = Result<(Bytes, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        let cell = match self.cells.next()? {
            Ok(cell) => cell,
            Err(e) => return Some(Err(e)),
        };
        Some(into_pair(cell))
    }
}

fn into_pair(cell: Cell) -> Result<(Bytes, Bytes)> {
    let (key, value) = cell.into_parts();
    let data = value
        .into_data()
        .ok_or_else(|| StrataError::InvalidState("tombstone has no payload".to_string()))?;
    Ok((key, data))
}
