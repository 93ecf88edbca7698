//! StrataKV CLI
//!
//! Command-line interface for inspecting and editing a local data directory.

use std::process;

use clap::{Parser, Subcommand};
use stratakv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// StrataKV CLI
#[derive(Parser, Debug)]
#[command(name = "stratakv")]
#[command(about = "Embedded LSM key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./stratakv_data")]
    data_dir: String,

    /// MemTable size limit in KB before rotation
    #[arg(short = 'm', long, default_value = "65536")]
    memtable_kb: usize,

    /// Refuse to start if any SSTable cannot be opened
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Put {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// List alive pairs starting at a key
    Scan {
        /// First key to list
        #[arg(default_value = "")]
        from: String,

        /// Maximum number of pairs to print
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },

    /// Rewrite all data into one SSTable
    Compact,

    /// Print storage statistics
    Stats,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,stratakv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_size_limit(memtable_limit_bytes(args.memtable_kb))
        .strict_recovery(args.strict)
        .build();

    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    for path in engine.recovery_failures() {
        tracing::warn!("Skipped unreadable SSTable: {}", path.display());
    }

    let outcome = run(&engine, args.command);
    let closed = engine.close();

    if let Err(e) = outcome.and(closed) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

/// `--memtable-kb` in bytes; absurd values clamp instead of overflowing
fn memtable_limit_bytes(kb: usize) -> usize {
    kb.saturating_mul(1024)
}

fn run(engine: &Engine, command: Commands) -> stratakv::Result<()> {
    match command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => println!("(not found)"),
        },
        Commands::Put { key, value } => {
            engine.upsert(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Del { key } => {
            engine.remove(key.as_bytes())?;
            println!("OK");
        }
        Commands::Scan { from, limit } => {
            for pair in engine.iter(from.as_bytes())?.take(limit) {
                let (key, value) = pair?;
                println!(
                    "{} = {}",
                    String::from_utf8_lossy(&key),
                    String::from_utf8_lossy(&value)
                );
            }
        }
        Commands::Compact => {
            engine.compact()?;
            println!("OK ({} SSTable)", engine.sstable_count());
        }
        Commands::Stats => {
            println!("data_dir:         {}", engine.data_dir().display());
            println!("sstables:         {}", engine.sstable_count());
            println!("next_generation:  {}", engine.generation());
            println!("memtable_bytes:   {}", engine.memtable_size());
            println!("memtable_entries: {}", engine.memtable_entry_count());
        }
    }
    Ok(())
}
