//! Flush Worker
//!
//! A single background thread that drains the pool's flush queue and turns
//! rotated MemTables into SSTables.
//!
//! ## Failure policy
//! Each job is attempted up to `max_attempts` times with doubling backoff.
//! If every attempt fails the generation stays in the pool's pending set (its
//! data remains readable from memory), the failure is recorded in
//! [`FlushHealth`], threads waiting on the pool are woken and the engine
//! refuses further writes.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::cell::Cell;
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::memtable::{FlushJob, MemTablePool};

use super::StorageManager;

// =============================================================================
// FlushHealth
// =============================================================================

/// Shared record of the first flush that exhausted its retries
#[derive(Debug, Default)]
pub struct FlushHealth {
    failure: Mutex<Option<(u64, String)>>,
}

impl FlushHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the engine degraded (the first failure wins)
    pub fn record(&self, generation: u64, reason: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some((generation, reason));
        }
    }

    /// `Err(FlushFailed)` once any flush has been given up
    pub fn check(&self) -> Result<()> {
        match &*self.failure.lock() {
            Some((generation, reason)) => Err(StrataError::FlushFailed {
                generation: *generation,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.failure.lock().is_some()
    }
}

// =============================================================================
// FlushPolicy
// =============================================================================

/// Retry settings for one flush job
#[derive(Debug, Clone, Copy)]
pub struct FlushPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl From<&Config> for FlushPolicy {
    fn from(config: &Config) -> Self {
        Self {
            max_attempts: config.flush_max_attempts.max(1),
            backoff: config.flush_retry_backoff,
        }
    }
}

// =============================================================================
// FlushWorker
// =============================================================================

/// Handle to the running flush thread
pub struct FlushWorker {
    handle: JoinHandle<()>,
}

impl FlushWorker {
    /// Start the worker thread
    pub fn spawn(
        jobs: Receiver<FlushJob>,
        pool: Arc<MemTablePool>,
        storage: Arc<StorageManager>,
        health: Arc<FlushHealth>,
        policy: FlushPolicy,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("stratakv-flush".to_string())
            .spawn(move || run(jobs, &pool, &storage, &health, policy))?;
        Ok(Self { handle })
    }

    /// Wait for the worker to exit (after a shutdown job or disconnect)
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| StrataError::Shutdown("flush worker panicked".to_string()))
    }
}

fn run(
    jobs: Receiver<FlushJob>,
    pool: &MemTablePool,
    storage: &StorageManager,
    health: &FlushHealth,
    policy: FlushPolicy,
) {
    // recv fails only once every sender is gone
    while let Ok(job) = jobs.recv() {
        let shutdown = job.is_shutdown();
        flush_job(&job, pool, storage, health, policy);
        if shutdown {
            break;
        }
    }
    debug!("flush worker stopped");
}

fn flush_job(
    job: &FlushJob,
    pool: &MemTablePool,
    storage: &StorageManager,
    health: &FlushHealth,
    policy: FlushPolicy,
) {
    let generation = job.generation();
    let mut backoff = policy.backoff;

    for attempt in 1..=policy.max_attempts {
        let cells = job.table().iter(&[]).map(Ok::<Cell, StrataError>);
        match storage.flush_table(generation, cells) {
            Ok(Some(metadata)) => {
                debug!(
                    generation,
                    entries = metadata.entry_count,
                    bytes = metadata.file_size,
                    "memtable flushed"
                );
                pool.flushed(generation);
                return;
            }
            Ok(None) => {
                // Empty tables produce no file
                pool.flushed(generation);
                return;
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(generation, attempt, error = %e, "flush failed, retrying");
                thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => {
                error!(generation, attempts = attempt, error = %e, "flush failed, engine degraded");
                health.record(generation, e.to_string());
                pool.flush_failed();
                return;
            }
        }
    }
}
