use crate::strategy::BalanceMode;
use clap::Parser;
use std::path::PathBuf;

/// Authorize account movements and settle them against an external ledger
#[derive(Parser, Debug)]
#[command(name = "ledger-engine")]
#[command(about = "Authorize account movements and settle them against an external ledger", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing movement requests
    #[arg(value_name = "INPUT", help = "Path to the movement request CSV file")]
    pub input_file: PathBuf,

    /// Account seed file with opening balances
    #[arg(
        long = "accounts",
        value_name = "SEEDS",
        help = "Path to the account seed CSV file (account_number,balance)"
    )]
    pub accounts_file: PathBuf,

    /// When the balance mutation happens relative to the submit response
    #[arg(
        long = "mode",
        value_name = "MODE",
        default_value = "deferred",
        help = "Balance mode: 'deferred' acknowledges the pre-movement balance, 'immediate' the post-movement balance"
    )]
    pub mode: BalanceMode,

    /// Number of partition queues
    #[arg(
        long = "queues",
        value_name = "COUNT",
        help = "Number of partition queues and workers (default: CPU cores)"
    )]
    pub queues: Option<i32>,

    /// Run reconciliation consumers after processing
    #[arg(
        long = "reconcile",
        help = "Settle authorized movements against the in-memory external ledger"
    )]
    pub reconcile: bool,

    /// Connection string for the external ledger
    #[arg(
        long = "ledger-connection",
        value_name = "CONNECTION",
        default_value = "Server=local;Database=ledger",
        help = "Connection string reconciliation consumers use when an envelope carries no usable override"
    )]
    pub ledger_connection: String,
}

impl CliArgs {
    /// The effective queue count
    ///
    /// Falls back to the number of CPU cores when not given or non-positive.
    pub fn queue_count(&self) -> i32 {
        match self.queues {
            Some(count) if count > 0 => count,
            _ => num_cpus::get() as i32,
        }
    }
}
