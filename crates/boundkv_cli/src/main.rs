//! boundkv CLI
//!
//! Command-line tools for a boundkv store.
//!
//! # Commands
//!
//! - `run` - Run concurrent client loops that mark and read the last update
//! - `mark` - Record the current time as the last update
//! - `last` - Print the last recorded update
//! - `get` / `put` / `clear` - Single key-value operations
//! - `inspect` - Display store metadata and operation counters

mod commands;

use clap::{Parser, Subcommand};
use commands::StoreArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// boundkv command-line store tools.
#[derive(Parser)]
#[command(name = "boundkv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the store files (in-memory store if omitted)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Name of the store
    #[arg(global = true, short, long, default_value = boundkv_core::DEFAULT_STORE_NAME)]
    name: String,

    /// Budget in milliseconds for each guarded step
    #[arg(global = true, short, long, default_value = "1000")]
    timeout_ms: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run client loops that mark an update and read it back
    Run {
        /// Number of concurrent loops
        #[arg(short, long, default_value = "100")]
        loops: usize,

        /// Iterations per loop (runs until interrupted if omitted)
        #[arg(short, long)]
        iterations: Option<usize>,

        /// Pause between iterations in milliseconds
        #[arg(long, default_value = "16")]
        interval_ms: u64,
    },

    /// Record the current time as the last update
    Mark,

    /// Print the last recorded update
    Last {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the value stored at a key
    Get {
        /// Key to look up
        key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Store a value at a key
    Put {
        /// Key to write
        key: String,

        /// Value to store
        value: String,
    },

    /// Remove every entry
    Clear,

    /// Display store metadata and operation counters
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = StoreArgs {
        path: cli.path,
        name: cli.name,
        timeout_ms: cli.timeout_ms,
    };

    match cli.command {
        Commands::Run {
            loops,
            iterations,
            interval_ms,
        } => {
            commands::run::run(&args, loops, iterations, interval_ms).await?;
        }
        Commands::Mark => commands::kv::mark(&args).await?,
        Commands::Last { format } => commands::kv::last(&args, &format).await?,
        Commands::Get { key, format } => commands::kv::get(&args, &key, &format).await?,
        Commands::Put { key, value } => commands::kv::put(&args, &key, &value).await?,
        Commands::Clear => commands::kv::clear(&args).await?,
        Commands::Inspect { format } => commands::inspect::run(&args, &format).await?,
        Commands::Version => {
            println!("boundkv CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("boundkv Core v{}", boundkv_core::VERSION);
        }
    }

    Ok(())
}
