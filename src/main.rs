//! Rust Ledger Engine CLI
//!
//! Command-line interface for authorizing account movements from CSV files.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --accounts seeds.csv requests.csv > outcomes.csv
//! cargo run -- --accounts seeds.csv --mode immediate requests.csv > outcomes.csv
//! cargo run -- --accounts seeds.csv --queues 4 --reconcile requests.csv > outcomes.csv
//! ```
//!
//! The program seeds accounts from the seed file, submits every movement
//! request through the command queue strategy, and writes one outcome row
//! per request to stdout. With `--reconcile`, settlement messages are
//! consumed against the in-memory external ledger before the program exits.
//! Logs go to stderr; control verbosity with `RUST_LOG`.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, unreadable input, etc.)

use rust_ledger_engine::cli::{self, CliArgs};
use rust_ledger_engine::core::{PartitionRouter, RetryPolicy, ServiceStatus};
use rust_ledger_engine::io::{read_account_seeds, read_requests, write_outcomes};
use rust_ledger_engine::reconcile::ReconciliationConsumer;
use rust_ledger_engine::storage::{MemoryBroker, MemoryLedger, MemoryStore};
use rust_ledger_engine::strategy::CommandQueueStrategy;
use rust_ledger_engine::types::EngineError;
use std::process;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), EngineError> {
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    for seed in read_account_seeds(&args.accounts_file)? {
        store.seed_account(seed.account_number, seed.balance);
        // The in-memory external ledger opens with the same balances, so a
        // reconciliation run has an authoritative state to settle against.
        ledger.set_balance(seed.account_number, seed.balance);
    }

    let broker = Arc::new(MemoryBroker::new());
    let router = PartitionRouter::new(args.queue_count());
    let engine = CommandQueueStrategy::new(
        args.mode,
        Arc::clone(&store),
        Arc::clone(&broker),
        ServiceStatus::new(),
        router,
        RetryPolicy::default(),
    );

    // Bind one reconciliation consumer to each partition queue before any
    // settlement message is published.
    let mut consumers = Vec::new();
    if args.reconcile {
        for partition in router.partitions() {
            let queue = router.queue_name(partition);
            let messages = broker.take_receiver(&queue).ok_or_else(|| EngineError::Io {
                message: format!("queue '{}' already has a consumer", queue),
            })?;
            let consumer = ReconciliationConsumer::new(
                Arc::clone(&store),
                Arc::clone(&ledger),
                args.ledger_connection.clone(),
                queue,
            );
            consumers.push(consumer.start(messages));
        }
    }

    let requests = read_requests(&args.input_file)?;
    let mut outcomes = Vec::with_capacity(requests.len());
    for request in requests {
        outcomes.push(engine.submit(request).await);
    }

    // Drain the partition workers, then close the broker so the
    // reconciliation consumers finish once the queues are empty.
    engine.shutdown().await;
    broker.close();
    for consumer in consumers {
        consumer.await.map_err(|e| EngineError::Io {
            message: format!("reconciliation consumer failed: {}", e),
        })?;
    }

    let authorized = outcomes.iter().filter(|o| o.is_authorized()).count();
    info!(
        total = outcomes.len(),
        authorized,
        rejected = outcomes.len() - authorized,
        "processing finished"
    );

    write_outcomes(std::io::stdout(), &outcomes)?;
    Ok(())
}
