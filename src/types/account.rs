//! Account types for the ledger engine
//!
//! This module defines the Account structure mirrored from the authoritative
//! external ledger. The local copy is the fast path for authorization; the
//! external ledger remains the source of truth and overwrites the local
//! balance during reconciliation.

use rust_decimal::Decimal;

/// External account number (unique, stable)
///
/// Wide enough for 17-digit account numbers issued by the external ledger.
pub type AccountNumber = i64;

/// Store-internal account identity
pub type AccountId = u32;

/// Local account state
///
/// Represents the locally persisted copy of an account. The balance is only
/// ever changed by an applied, validated movement or by an authoritative
/// reconciliation overwrite.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// Store-internal identity
    pub id: AccountId,

    /// External account number (unique, stable)
    ///
    /// Used for lookups from submit requests and settlement messages, and
    /// as the input to partition routing.
    pub number: AccountNumber,

    /// Current balance (fixed-point decimal)
    pub balance: Decimal,

    /// Optimistic concurrency token
    ///
    /// Bumped by every persisted mutation. A persist whose snapshot carries
    /// a stale version is rejected with a version conflict and retried by
    /// the caller under the shared retry discipline.
    pub version: u64,
}

impl Account {
    /// Create a new account with the given identity and opening balance
    pub fn new(id: AccountId, number: AccountNumber, balance: Decimal) -> Self {
        Account {
            id,
            number,
            balance,
            version: 0,
        }
    }
}
