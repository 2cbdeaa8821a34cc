//! relbox CLI
//!
//! Command-line tools for relbox snapshot files.
//!
//! # Commands
//!
//! - `inspect` - Display entity types, record counts and relation links
//! - `verify` - Check that every stored record is a well-formed flat table
//! - `dump` - Print the raw fields of stored records

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// relbox command-line snapshot tools.
#[derive(Parser)]
#[command(name = "relbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the snapshot file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display entity types, record counts and relation links
    Inspect {
        /// Show per-type details
        #[arg(short, long)]
        types: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Check that every stored record is a well-formed flat table
    Verify,

    /// Print the raw fields of stored records
    Dump {
        /// Entity type id
        #[arg(short, long)]
        entity: u32,

        /// Only this record id
        #[arg(short, long)]
        id: Option<u64>,

        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { types, format } => {
            let path = cli.path.ok_or("Snapshot path required for inspect")?;
            commands::inspect::run(&path, types, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Snapshot path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Dump {
            entity,
            id,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Snapshot path required for dump")?;
            commands::dump::run(&path, entity, id, limit, &format)?;
        }
        Commands::Version => {
            println!("relbox CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("relbox Core v{}", relbox_core::VERSION);
            println!("Snapshot format v{}", relbox_store::SNAPSHOT_VERSION);
        }
    }

    Ok(())
}
