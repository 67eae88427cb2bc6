//! Submit outcomes and the stable status-code contract
//!
//! Every call to `CommandQueueStrategy::submit` resolves to a
//! [`SubmitOutcome`], whether the movement was authorized, rejected by a
//! business rule, or failed terminally after retry exhaustion. The numeric
//! codes are a stable external contract and must not be renumbered.

use super::movement::RequestId;
use rust_decimal::Decimal;
use serde::Serialize;

/// Status codes returned to callers and recorded on request rows
///
/// Codes 0-4 are deterministic business decisions; 96-99 are operational
/// failures surfaced by the pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Movement authorized
    Authorized,

    /// No account with the given external number
    AccountNotFound,

    /// An authorized request with the same idempotency key already exists
    Duplicate,

    /// Movement type outside the recognized set
    InvalidMovementType,

    /// Balance-decreasing movement exceeds the current balance
    InsufficientFunds,

    /// Unexpected failure, logged with context and surfaced generically
    InternalError,

    /// Lock/deadlock conflicts persisted through every retry attempt
    LockExhausted,

    /// Optimistic version conflicts persisted through every retry attempt
    ConflictExhausted,

    /// The service is administratively inactive
    Inactive,
}

impl StatusCode {
    /// The numeric value of this code (stable contract)
    pub const fn code(self) -> i32 {
        match self {
            StatusCode::Authorized => 0,
            StatusCode::AccountNotFound => 1,
            StatusCode::Duplicate => 2,
            StatusCode::InvalidMovementType => 3,
            StatusCode::InsufficientFunds => 4,
            StatusCode::InternalError => 96,
            StatusCode::LockExhausted => 97,
            StatusCode::ConflictExhausted => 98,
            StatusCode::Inactive => 99,
        }
    }
}

/// Result of a submit call
///
/// `id` is 0 when the request row has not been persisted yet (both variants
/// defer row creation to a partition worker). `balance` is the pre-movement
/// balance under the deferred strategy and the post-movement balance under
/// the immediate strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    /// Persisted request row id, 0 if not yet known
    pub id: RequestId,

    /// Account balance at response time (strategy-dependent freshness)
    pub balance: Decimal,

    /// Status code per the stable contract
    pub status_code: i32,

    /// Queue name the movement routes to (empty for short-circuit failures)
    pub queue_name: String,
}

impl SubmitOutcome {
    /// An authorized response
    pub fn authorized(id: RequestId, balance: Decimal, queue_name: String) -> Self {
        SubmitOutcome {
            id,
            balance,
            status_code: StatusCode::Authorized.code(),
            queue_name,
        }
    }

    /// A business rejection carrying the account's current balance
    pub fn rejected(status: StatusCode, balance: Decimal, queue_name: String) -> Self {
        SubmitOutcome {
            id: 0,
            balance,
            status_code: status.code(),
            queue_name,
        }
    }

    /// The service-inactive short circuit (no work was attempted)
    pub fn inactive() -> Self {
        SubmitOutcome {
            id: 0,
            balance: Decimal::ZERO,
            status_code: StatusCode::Inactive.code(),
            queue_name: String::new(),
        }
    }

    /// Lock/deadlock conflicts exhausted every retry attempt
    pub fn lock_exhausted() -> Self {
        SubmitOutcome {
            id: 0,
            balance: Decimal::ZERO,
            status_code: StatusCode::LockExhausted.code(),
            queue_name: String::new(),
        }
    }

    /// Optimistic version conflicts exhausted every retry attempt
    pub fn conflict_exhausted() -> Self {
        SubmitOutcome {
            id: 0,
            balance: Decimal::ZERO,
            status_code: StatusCode::ConflictExhausted.code(),
            queue_name: String::new(),
        }
    }

    /// Generic failure response for unexpected errors
    pub fn internal_error() -> Self {
        SubmitOutcome {
            id: 0,
            balance: Decimal::ZERO,
            status_code: StatusCode::InternalError.code(),
            queue_name: String::new(),
        }
    }

    /// Whether the movement was authorized
    pub fn is_authorized(&self) -> bool {
        self.status_code == StatusCode::Authorized.code()
    }
}
