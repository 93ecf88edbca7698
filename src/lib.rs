//! # StrataKV
//!
//! An embedded log-structured-merge key-value storage engine with:
//! - Lock-free MemTables with size-triggered rotation
//! - A bounded flush queue drained by one background worker (backpressure)
//! - Immutable SSTables published via temp file + atomic rename
//! - Newest-write-wins reads merged across every layer
//! - Full compaction that makes deletes permanent
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Engine                              │
//! │        get / upsert / remove / iter / compact / close       │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ writes                       │ reads (merge)
//!                ▼                              │
//!   ┌─────────────────────────┐                 │
//!   │      MemTablePool       │◀────────────────┤
//!   │ current + pending_flush │                 │
//!   └────────────┬────────────┘                 │
//!                │ bounded queue (FlushJob)     │
//!                ▼                              │
//!   ┌─────────────────────────┐   publish   ┌───▼─────────────┐
//!   │      Flush Worker       │────────────▶│ StorageManager  │
//!   │  .tmp → rename → .dat   │             │   (SSTables)    │
//!   └─────────────────────────┘             └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod clock;
pub mod cell;
pub mod table;
pub mod iterator;
pub mod memtable;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cell::{Cell, Value};
pub use clock::{Clock, MonotonicClock, SequenceClock};
pub use config::Config;
pub use engine::{Engine, EngineIterator};
pub use error::{Result, StrataError};
pub use table::SortedTable;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StrataKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
