//! EventSpool CLI
//!
//! Command-line tools for EventSpool log stores.
//!
//! # Commands
//!
//! - `inspect` - Display watermarks and per-segment lengths
//! - `verify` - Check that every flushed segment holds whole records
//! - `dump` - Print records from a cursor
//! - `clean` - Reclaim segments up to a cursor

mod commands;

use clap::{Parser, Subcommand};
use commands::StoreLocation;
use eventspool_core::Address;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// EventSpool command-line store tools.
#[derive(Parser)]
#[command(name = "eventspool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the stores
    #[arg(global = true, short, long)]
    base_dir: Option<PathBuf>,

    /// Store identifier (sub-directory of the base directory)
    #[arg(global = true, short, long)]
    id: Option<String>,

    /// JSON store configuration; --base-dir and --id override its values
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display watermarks and segment files
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify that flushed segments hold whole records
    Verify,

    /// Print records starting at a cursor
    Dump {
        /// Start cursor (segment:offset, decimal or 0x hex); zero starts at
        /// the clean boundary
        #[arg(long, default_value = "0")]
        from: Address,

        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Reclaim segments below a cursor
    Clean {
        /// Clean boundary (segment:offset, decimal or 0x hex)
        #[arg(long)]
        to: Address,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let location = StoreLocation {
        base_dir: cli.base_dir,
        id: cli.id,
        config: cli.config,
    };

    match cli.command {
        Commands::Inspect { format } => {
            commands::inspect::run(&location.resolve()?, &format)?;
        }
        Commands::Verify => {
            commands::verify::run(&location.resolve()?)?;
        }
        Commands::Dump { from, limit } => {
            commands::dump::run(location.resolve()?, from, limit)?;
        }
        Commands::Clean { to } => {
            commands::clean::run(location.resolve()?, to)?;
        }
        Commands::Version => {
            println!("EventSpool CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("EventSpool Core v{}", eventspool_core::VERSION);
        }
    }

    Ok(())
}
