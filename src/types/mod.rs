//! Core data types for the ledger engine
//!
//! This module re-exports the fundamental types used throughout the system:
//! accounts, movement requests, persisted request rows, submit outcomes,
//! and the error taxonomy.

pub mod account;
pub mod error;
pub mod movement;
pub mod outcome;

pub use account::{Account, AccountId, AccountNumber};
pub use error::{BrokerError, ConflictKind, EngineError, LedgerError, StorageError};
pub use movement::{
    IdempotencyKey, MovementRequest, MovementType, NewRequest, QueueMessage, ReceiptNumber,
    RequestId, RequestRecord, RequestState,
};
pub use outcome::{StatusCode, SubmitOutcome};
