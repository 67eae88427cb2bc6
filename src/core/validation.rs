//! Pure authorization decision over a request and an account snapshot
//!
//! The validation engine applies the business rules in a fixed order, first
//! failing rule wins:
//!
//! 1. Account not found by external number (status 1)
//! 2. Duplicate: an `authorized` request with the same idempotency key
//!    already exists (status 2)
//! 3. Movement type outside the recognized set (status 3)
//! 4. Balance-decreasing movement exceeds the balance (status 4)
//!
//! Otherwise the request is valid (status 0).
//!
//! No side effects: the decision is safe to take against a possibly stale
//! snapshot, because the deferred worker re-validates inside its
//! serializable transaction before mutating anything.

use crate::core::traits::CommandStore;
use crate::types::{
    Account, EngineError, IdempotencyKey, MovementRequest, MovementType, StatusCode, SubmitOutcome,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Decision of the validation engine
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The request passed every rule; the snapshot it passed against is
    /// carried so the caller can apply the movement to it
    Valid {
        /// Account snapshot the decision was taken against
        account: Account,
    },

    /// The request failed a rule
    Invalid {
        /// The first failing rule's status code
        status: StatusCode,
        /// The account snapshot, when rule 1 passed
        account: Option<Account>,
        /// The account's balance at decision time (zero when not found)
        balance: Decimal,
    },
}

impl ValidationOutcome {
    /// Whether the request passed validation
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid { .. })
    }

    /// The status code of this decision
    pub fn status(&self) -> StatusCode {
        match self {
            ValidationOutcome::Valid { .. } => StatusCode::Authorized,
            ValidationOutcome::Invalid { status, .. } => *status,
        }
    }

    /// The balance the decision was taken against
    pub fn balance(&self) -> Decimal {
        match self {
            ValidationOutcome::Valid { account } => account.balance,
            ValidationOutcome::Invalid { balance, .. } => *balance,
        }
    }

    /// The internal id of the account, when rule 1 passed
    pub fn account_id(&self) -> Option<crate::types::AccountId> {
        match self {
            ValidationOutcome::Valid { account } => Some(account.id),
            ValidationOutcome::Invalid { account, .. } => account.as_ref().map(|a| a.id),
        }
    }

    /// Convert this decision into a caller-facing submit outcome
    ///
    /// For a valid decision the outcome carries the snapshot (pre-movement)
    /// balance, which is exactly what the deferred strategy acknowledges
    /// with.
    pub fn into_submit_outcome(self, queue_name: String) -> SubmitOutcome {
        match self {
            ValidationOutcome::Valid { account } => {
                SubmitOutcome::authorized(0, account.balance, queue_name)
            }
            ValidationOutcome::Invalid {
                status, balance, ..
            } => SubmitOutcome::rejected(status, balance, queue_name),
        }
    }
}

/// Validate a request against a point-in-time snapshot
///
/// # Arguments
///
/// * `request` - the submitted movement
/// * `account` - the account looked up by external number, if any
/// * `has_authorized_duplicate` - result of the duplicate-check query for
///   the request's idempotency key
pub fn validate(
    request: &MovementRequest,
    account: Option<Account>,
    has_authorized_duplicate: bool,
) -> ValidationOutcome {
    // Rule 1: the account must exist
    let Some(account) = account else {
        return ValidationOutcome::Invalid {
            status: StatusCode::AccountNotFound,
            account: None,
            balance: Decimal::ZERO,
        };
    };

    // Rule 2: idempotency against already-authorized requests
    if has_authorized_duplicate {
        let balance = account.balance;
        return ValidationOutcome::Invalid {
            status: StatusCode::Duplicate,
            account: Some(account),
            balance,
        };
    }

    // Rule 3: the movement type must be recognized
    let Some(movement) = MovementType::from_wire(&request.movement) else {
        let balance = account.balance;
        return ValidationOutcome::Invalid {
            status: StatusCode::InvalidMovementType,
            account: Some(account),
            balance,
        };
    };

    // Rule 4: balance-decreasing movements need sufficient funds
    if movement.decreases_balance() && account.balance < request.amount {
        let balance = account.balance;
        return ValidationOutcome::Invalid {
            status: StatusCode::InsufficientFunds,
            account: Some(account),
            balance,
        };
    }

    ValidationOutcome::Valid { account }
}

/// Validate a request against fresh store data
///
/// Fetches the account snapshot and runs the duplicate-check query for the
/// request's idempotency key on `submitted_on`, then applies [`validate`].
pub fn validate_against_store<S: CommandStore>(
    store: &S,
    request: &MovementRequest,
    submitted_on: NaiveDate,
) -> Result<ValidationOutcome, EngineError> {
    let account = store.find_account(request.account_number)?;

    let has_duplicate = match &account {
        Some(account) => store.has_authorized(&IdempotencyKey {
            account_id: account.id,
            amount: request.amount,
            receipt_number: request.receipt_number,
            submitted_on,
        })?,
        None => false,
    };

    Ok(validate(request, account, has_duplicate))
}
