use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Transaction-to-chain ledger: ingest broker transactions, rebuild the
/// lot ledger and order chains, and inspect the result.
#[derive(Parser)]
#[command(name = "trade-ledger", version, about)]
pub struct Cli {
    /// Path to the sqlite database
    #[arg(long, default_value = "ledger.db", global = true)]
    pub db: PathBuf,

    /// User id to operate as (multi-tenant)
    #[arg(long, global = true)]
    pub user: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database and schema
    Init,

    /// Ingest a JSON file of raw broker transactions (Stage 1)
    Ingest {
        /// Path to a JSON array of transaction records
        file: PathBuf,

        /// Run the processing pipeline after ingesting
        #[arg(long)]
        reprocess: bool,
    },

    /// Rebuild lots, chains, and groups from stored transactions
    Reprocess {
        /// Restrict the rebuild to these underlyings (incremental mode)
        #[arg(long)]
        underlying: Vec<String>,
    },

    /// Print the ledger view (position groups with lots and closings)
    Ledger {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        underlying: Option<String>,

        /// Emit raw JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Print cached chain summaries
    Chains {
        #[arg(long)]
        account: Option<String>,

        #[arg(long)]
        underlying: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Compare a broker positions snapshot against the ledger's open lots
    Reconcile {
        /// Path to a JSON array of broker positions
        positions: PathBuf,
    },
}
