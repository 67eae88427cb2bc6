//! Rust Ledger Engine Library
//! # Overview
//!
//! This library provides a high-concurrency account movement engine:
//! synchronous authorization decisions over debits, credits and reversals,
//! partitioned single-consumer workers for ordered persistence, and
//! asynchronous reconciliation against an authoritative external ledger.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, MovementRequest, status codes, errors)
//! - [`cli`] - CLI argument parsing
//! - [`core`] - Business logic components:
//!   - [`core::validation`] - The ordered authorization rules
//!   - [`core::balance`] - Balance arithmetic per movement type
//!   - [`core::routing`] - Deterministic account-to-partition mapping
//!   - [`core::retry`] - Bounded retry with randomized backoff
//! - [`strategy`] - The command queue strategy: submit path plus partition workers
//! - [`reconcile`] - Settlement against the external ledger
//! - [`storage`] - In-memory store, broker and ledger implementations
//! - [`io`] - CSV input and output for the CLI
//!
//! # Movement Types
//!
//! The engine supports four movement types:
//!
//! - **Debit**: Remove funds from an account (requires sufficient balance)
//! - **Credit**: Add funds to an account
//! - **Reversal debit**: Undo a previous debit, restoring the amount
//! - **Reversal credit**: Undo a previous credit (requires sufficient balance)
//!
//! # Status Codes
//!
//! Every submit resolves to a stable numeric status: 0 authorized, 1 account
//! not found, 2 duplicate, 3 invalid movement type, 4 insufficient funds,
//! 96 internal error, 97 lock conflicts exhausted, 98 version conflicts
//! exhausted, 99 service inactive.

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod reconcile;
pub mod storage;
pub mod strategy;
pub mod types;

pub use core::{PartitionRouter, RetryPolicy, ServiceStatus};
pub use reconcile::ReconciliationConsumer;
pub use storage::{MemoryBroker, MemoryLedger, MemoryStore};
pub use strategy::{BalanceMode, CommandQueueStrategy};
pub use types::{
    Account, AccountNumber, EngineError, MovementRequest, MovementType, QueueMessage,
    RequestRecord, RequestState, StatusCode, SubmitOutcome,
};
