//! Trait seams for storage, the message broker and the external ledger
//!
//! The command pipeline only ever talks to its collaborators through these
//! traits. Production deployments bind them to a relational store, a real
//! broker and the authoritative ledger; tests and the bundled CLI bind them
//! to the in-memory implementations in [`crate::storage`].
//!
//! Dependencies are injected at construction time: partition workers and
//! reconciliation consumers own `Arc`s to their collaborators rather than
//! resolving them per item.

use crate::types::{
    Account, AccountNumber, BrokerError, EngineError, IdempotencyKey, LedgerError, MovementType,
    NewRequest, ReceiptNumber, RequestId, RequestRecord, StorageError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Account persistence operations
pub trait AccountStore {
    /// Look up an account by its external number
    fn find_account(&self, number: AccountNumber) -> Result<Option<Account>, StorageError>;

    /// Persist a mutated account snapshot
    ///
    /// The snapshot's version token must match the stored row; a stale
    /// snapshot fails with [`StorageError::VersionConflict`] and the caller
    /// retries under the shared retry discipline. Returns the stored account
    /// with its bumped version.
    fn persist_account(&self, account: &Account) -> Result<Account, StorageError>;

    /// Overwrite an account's balance with an authoritative value
    ///
    /// Last-writer-wins, no version check: the external ledger is the source
    /// of truth. Returns `None` when no account with that number exists.
    fn overwrite_balance(
        &self,
        number: AccountNumber,
        balance: Decimal,
    ) -> Result<Option<Account>, StorageError>;
}

/// Request-row persistence operations
pub trait RequestStore {
    /// Whether an `authorized` request already exists for this key
    fn has_authorized(&self, key: &IdempotencyKey) -> Result<bool, StorageError>;

    /// Insert a new request row, assigning its id
    fn insert_request(&self, row: NewRequest) -> Result<RequestRecord, StorageError>;

    /// Look up a request row by id
    fn find_request(&self, id: RequestId) -> Result<Option<RequestRecord>, StorageError>;

    /// Settle an authorized request with the authoritative balance
    ///
    /// Moves the row to `Reconciled` and overwrites its stored balance.
    /// Returns `None` when the row does not exist or is not `Authorized`;
    /// `Reconciled` is only ever reachable from `Authorized`.
    fn mark_reconciled(
        &self,
        id: RequestId,
        balance: Decimal,
    ) -> Result<Option<RequestRecord>, StorageError>;
}

/// The combined storage seam used by the command pipeline
pub trait CommandStore: AccountStore + RequestStore + Send + Sync + 'static {
    /// Run `body` with serializable isolation
    ///
    /// A relational backend maps this to a SERIALIZABLE transaction; the
    /// in-memory store takes a store-wide lock. Bodies do their reads and
    /// validation first and write last, so an `Err` return leaves no partial
    /// state behind.
    fn serializable<R, F>(&self, body: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Self) -> Result<R, EngineError>;
}

/// The message broker seam
///
/// The transport provides at-most-once delivery: no exactly-once guarantee,
/// no dead-lettering. Messages are opaque strings here; envelope encoding
/// lives with [`crate::types::QueueMessage`].
pub trait MessageBroker: Send + Sync + 'static {
    /// Publish a message to the named queue
    fn publish(&self, message: &str, queue: &str) -> Result<(), BrokerError>;
}

/// The direction of an external ledger operation
///
/// Reversals map to the opposite of the movement they reverse, so the
/// operation always matches the local arithmetic direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOp {
    Debit,
    Credit,
}

impl LedgerOp {
    /// The ledger operation for a recognized movement type
    pub fn for_movement(movement: MovementType) -> Self {
        if movement.decreases_balance() {
            LedgerOp::Debit
        } else {
            LedgerOp::Credit
        }
    }
}

/// Parameters of an external ledger invocation
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCall {
    pub operation: LedgerOp,
    pub account_number: AccountNumber,
    pub amount: Decimal,
    pub movement_date: DateTime<Utc>,
    pub receipt_number: ReceiptNumber,
    pub reversal_reference: Option<RequestId>,
}

/// The authoritative external ledger seam
///
/// Reached only through asynchronous messaging; invoked by the
/// reconciliation consumer once per settled movement.
#[async_trait]
pub trait ExternalLedger: Send + Sync + 'static {
    /// Execute a movement against the external ledger
    ///
    /// Returns the authoritative post-movement balance, or `None` when the
    /// ledger executed the operation without reporting a balance.
    async fn post_movement(
        &self,
        connection: &str,
        call: &LedgerCall,
    ) -> Result<Option<Decimal>, LedgerError>;
}
