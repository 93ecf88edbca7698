//! MemTable Pool
//!
//! Owns the current MemTable, the tables waiting to be flushed, and the
//! producer side of the flush queue.
//!
//! ## Rotation
//! ```text
//!   upsert ──▶ current (size > limit?) ──yes──▶ pending_flush[gen] = current
//!                                               current = MemTable::new()
//!                                               gen += 1
//!                                               flush_tx.send(Flush { gen, table })
//! ```
//! The send happens outside the lock and blocks while the queue is full,
//! throttling writers to the speed of the flush worker.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Result, StrataError};
use crate::iterator::merge_collapsed;
use crate::table::{CellIter, SortedTable};

use super::MemTable;

/// Work item for the flush worker
pub enum FlushJob {
    /// A rotated table; keep consuming jobs afterwards
    Flush { generation: u64, table: Arc<MemTable> },

    /// The last live table at shutdown; stop after writing it
    Shutdown { generation: u64, table: Arc<MemTable> },
}

impl FlushJob {
    pub fn generation(&self) -> u64 {
        match self {
            FlushJob::Flush { generation, .. } | FlushJob::Shutdown { generation, .. } => {
                *generation
            }
        }
    }

    pub fn table(&self) -> &Arc<MemTable> {
        match self {
            FlushJob::Flush { table, .. } | FlushJob::Shutdown { table, .. } => table,
        }
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, FlushJob::Shutdown { .. })
    }
}

/// Everything a rotation must swap atomically
struct PoolState {
    current: Arc<MemTable>,
    pending_flush: BTreeMap<u64, Arc<MemTable>>,
    generation: u64,
}

/// Pool of MemTables in front of the flush worker
///
/// ## Concurrency
/// - `state`: RwLock; writes to `current` and iteration take the read side,
///   only rotation, `close` and `flushed` take the write side. A reader sees
///   either the pool before a rotation or after it, never in between.
/// - `flush_tx`: bounded channel, blocks writers when the worker lags
/// - `stopped`: checked under the read lock so no write can slip into the
///   table captured by `close`
pub struct MemTablePool {
    state: RwLock<PoolState>,
    flush_tx: Sender<FlushJob>,
    flush_threshold: usize,
    stopped: AtomicBool,
    flush_given_up: AtomicBool,
    clock: Arc<dyn Clock>,
    flushed_lock: Mutex<()>,
    flushed_cv: Condvar,
}

impl MemTablePool {
    /// Create a pool and the receiving end of its flush queue
    pub fn new(
        flush_threshold: usize,
        start_generation: u64,
        queue_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> (Self, Receiver<FlushJob>) {
        let (flush_tx, flush_rx) = channel::bounded(queue_capacity);
        let pool = Self {
            state: RwLock::new(PoolState {
                current: Arc::new(MemTable::new(Arc::clone(&clock))),
                pending_flush: BTreeMap::new(),
                generation: start_generation,
            }),
            flush_tx,
            flush_threshold,
            stopped: AtomicBool::new(false),
            flush_given_up: AtomicBool::new(false),
            clock,
            flushed_lock: Mutex::new(()),
            flushed_cv: Condvar::new(),
        };
        (pool, flush_rx)
    }

    /// Insert or overwrite a value in the current table
    pub fn upsert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let size = {
            let state = self.state.read();
            self.ensure_running()?;
            state.current.upsert(key, value)
        };
        self.rotate_if_full(size)
    }

    /// Write a tombstone into the current table
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let size = {
            let state = self.state.read();
            self.ensure_running()?;
            state.current.remove(key)
        };
        self.rotate_if_full(size)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(StrataError::InvalidState(
                "memtable pool is stopped".to_string(),
            ));
        }
        Ok(())
    }

    fn rotate_if_full(&self, size: usize) -> Result<()> {
        if size <= self.flush_threshold {
            return Ok(());
        }
        let job = {
            let mut state = self.state.write();
            // Another writer may have rotated while we waited for the lock
            if !state.current.should_flush(self.flush_threshold) {
                return Ok(());
            }
            self.swap_current(&mut state)
        };
        self.enqueue(job)
    }

    /// Rotate the current table regardless of its size
    ///
    /// Returns the generation handed to the flush worker, or `None` if the
    /// current table is empty.
    pub fn rotate(&self) -> Result<Option<u64>> {
        let job = {
            let mut state = self.state.write();
            self.ensure_running()?;
            if state.current.is_empty() {
                return Ok(None);
            }
            self.swap_current(&mut state)
        };
        let generation = job.generation();
        self.enqueue(job)?;
        Ok(Some(generation))
    }

    fn swap_current(&self, state: &mut PoolState) -> FlushJob {
        let generation = state.generation;
        let fresh = Arc::new(MemTable::new(Arc::clone(&self.clock)));
        let table = std::mem::replace(&mut state.current, fresh);
        state.pending_flush.insert(generation, Arc::clone(&table));
        state.generation += 1;

        debug!(
            generation,
            bytes = table.size(),
            entries = table.entry_count(),
            "memtable rotated"
        );
        FlushJob::Flush { generation, table }
    }

    fn enqueue(&self, job: FlushJob) -> Result<()> {
        self.flush_tx
            .send(job)
            .map_err(|_| StrataError::Shutdown("flush worker is gone".to_string()))
    }

    /// Stop accepting writes and hand the current table to the worker
    /// together with the shutdown marker
    ///
    /// Returns the generation of the shutdown job; `None` if the pool was
    /// already stopped.
    pub fn close(&self) -> Result<Option<u64>> {
        let job = {
            let state = self.state.write();
            if self.stopped.swap(true, Ordering::AcqRel) {
                return Ok(None);
            }
            FlushJob::Shutdown {
                generation: state.generation,
                table: Arc::clone(&state.current),
            }
        };
        let generation = job.generation();
        self.enqueue(job)?;
        Ok(Some(generation))
    }

    /// Forget a table whose file is now durable and readable
    pub fn flushed(&self, generation: u64) {
        self.state.write().pending_flush.remove(&generation);

        let _guard = self.flushed_lock.lock();
        self.flushed_cv.notify_all();
    }

    /// Record that a pending table will not reach disk and wake all waiters
    pub fn flush_failed(&self) {
        self.flush_given_up.store(true, Ordering::Release);

        let _guard = self.flushed_lock.lock();
        self.flushed_cv.notify_all();
    }

    /// Block until no table is waiting for flush, until a flush is given
    /// up, or until `timeout`
    ///
    /// Returns whether the pool drained.
    pub fn wait_until_flushed(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.flushed_lock.lock();
        loop {
            if self.pending_flush_count() == 0 {
                return true;
            }
            if self.flush_given_up.load(Ordering::Acquire) {
                return false;
            }
            if self.flushed_cv.wait_until(&mut guard, deadline).timed_out() {
                return self.pending_flush_count() == 0;
            }
        }
    }

    pub fn pending_flush_count(&self) -> usize {
        self.state.read().pending_flush.len()
    }

    /// Generation the next rotation will use
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Size of the current table
    pub fn size(&self) -> usize {
        self.state.read().current.size()
    }

    /// Entries in the current table
    pub fn current_entry_count(&self) -> usize {
        self.state.read().current.entry_count()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// True once a table has been given up by the flush worker
    pub fn has_flush_failure(&self) -> bool {
        self.flush_given_up.load(Ordering::Acquire)
    }
}

impl SortedTable for MemTablePool {
    /// Current table and pending tables merged newest first, duplicates
    /// collapsed, tombstones kept
    fn iter_from(&self, from: &[u8]) -> Result<CellIter> {
        let sources: Vec<CellIter> = {
            let state = self.state.read();
            let mut sources = Vec::with_capacity(state.pending_flush.len() + 1);
            sources.push(state.current.iter_from(from)?);
            for table in state.pending_flush.values().rev() {
                sources.push(table.iter_from(from)?);
            }
            sources
        };
        Ok(Box::new(merge_collapsed(sources)?))
    }

    fn size_in_bytes(&self) -> Result<usize> {
        Ok(self.size())
    }
}
