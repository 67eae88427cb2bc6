//! Movement and request types for the ledger engine
//!
//! This module defines the movement vocabulary, the submit request, the
//! persisted request row and its lifecycle states, the idempotency key, and
//! the settlement envelope published to the message broker.

use super::account::{AccountId, AccountNumber};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Request (persisted movement row) identifier
pub type RequestId = u32;

/// External receipt number accompanying a movement
pub type ReceiptNumber = i64;

/// Movement types recognized by the engine
///
/// Debits and reversals-of-credit decrease the balance; credits and
/// reversals-of-debit increase it. Requests carry the raw wire string so
/// unrecognized values can still be recorded as rejections; this enum is the
/// parsed, validated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Debit funds from an account (requires sufficient balance)
    Debit,

    /// Credit funds to an account
    Credit,

    /// Reverse a previous debit, restoring the debited amount
    ReversalDebit,

    /// Reverse a previous credit, removing the credited amount
    /// (requires sufficient balance)
    ReversalCredit,
}

impl MovementType {
    /// Parse a wire value into a movement type
    ///
    /// Returns `None` for anything outside the recognized set; validation
    /// rejects such requests with the invalid-movement-type status code.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "debit" => Some(MovementType::Debit),
            "credit" => Some(MovementType::Credit),
            "reversal_debit" => Some(MovementType::ReversalDebit),
            "reversal_credit" => Some(MovementType::ReversalCredit),
            _ => None,
        }
    }

    /// The wire representation of this movement type
    pub fn as_wire(&self) -> &'static str {
        match self {
            MovementType::Debit => "debit",
            MovementType::Credit => "credit",
            MovementType::ReversalDebit => "reversal_debit",
            MovementType::ReversalCredit => "reversal_credit",
        }
    }

    /// Whether this movement decreases the account balance
    ///
    /// Balance-decreasing movements are subject to the insufficient-funds
    /// validation rule.
    pub fn decreases_balance(&self) -> bool {
        matches!(self, MovementType::Debit | MovementType::ReversalCredit)
    }
}

/// Lifecycle state of a persisted request row
///
/// `Rejected` is terminal. `Reconciled` is only reachable from `Authorized`,
/// once the authoritative external ledger has settled the movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    Rejected,
    Authorized,
    Reconciled,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Rejected => "rejected",
            RequestState::Authorized => "authorized",
            RequestState::Reconciled => "reconciled",
        }
    }
}

/// A submitted movement request
///
/// The input to `CommandQueueStrategy::submit`. The movement field carries
/// the raw wire value; it is validated against [`MovementType`] before any
/// balance arithmetic happens.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRequest {
    /// External account number the movement applies to
    pub account_number: AccountNumber,

    /// Movement amount (positive)
    pub amount: Decimal,

    /// Raw movement type as received on the wire
    pub movement: String,

    /// External receipt number (part of the idempotency key)
    pub receipt_number: ReceiptNumber,

    /// Original movement id, for reversals
    pub original_movement_id: Option<RequestId>,
}

/// Idempotency key for authorized requests
///
/// At most one `authorized` request may exist for a given key; a second
/// submission with the same key is rejected as a duplicate while the first
/// remains authorized.
#[derive(Debug, Clone, PartialEq)]
pub struct IdempotencyKey {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub receipt_number: ReceiptNumber,
    pub submitted_on: NaiveDate,
}

/// Insert payload for a new request row
///
/// Created by a partition worker at decision time; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRequest {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub movement: String,
    pub receipt_number: ReceiptNumber,
    pub original_movement_id: Option<RequestId>,
    pub submitted_on: NaiveDate,
    pub recorded_at: DateTime<Utc>,
    pub state: RequestState,
    pub status_code: i32,
    pub balance: Decimal,
}

/// A persisted request row
///
/// One row per submitted movement. Rejected rows are terminal; authorized
/// rows are later mutated in place by the reconciliation consumer, which
/// overwrites `balance` with the authoritative value and moves the state to
/// `Reconciled`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestRecord {
    pub id: RequestId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub movement: String,
    pub receipt_number: ReceiptNumber,
    pub original_movement_id: Option<RequestId>,
    pub submitted_on: NaiveDate,
    pub recorded_at: DateTime<Utc>,
    pub state: RequestState,
    pub status_code: i32,

    /// Resulting balance at decision time; overwritten with the
    /// authoritative balance on reconciliation
    pub balance: Decimal,
}

impl RequestRecord {
    /// Assemble a record from an insert payload and a store-assigned id
    pub fn from_new(id: RequestId, row: NewRequest) -> Self {
        RequestRecord {
            id,
            account_id: row.account_id,
            amount: row.amount,
            movement: row.movement,
            receipt_number: row.receipt_number,
            original_movement_id: row.original_movement_id,
            submitted_on: row.submitted_on,
            recorded_at: row.recorded_at,
            state: row.state,
            status_code: row.status_code,
            balance: row.balance,
        }
    }
}

/// Settlement envelope published to the message broker
///
/// One message per authorized movement, published to the queue of the
/// account's partition and consumed by the reconciliation consumer bound to
/// that queue. Serialized as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    /// Persisted request row id
    pub id: RequestId,

    /// External account number
    pub account_number: AccountNumber,

    /// Movement amount
    pub amount: Decimal,

    /// Raw movement type
    pub movement_type: String,

    /// External receipt number
    pub receipt_number: ReceiptNumber,

    /// Timestamp of the movement
    pub movement_date: DateTime<Utc>,

    /// Original movement id, for reversals
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversal_reference: Option<RequestId>,

    /// Optional connection override for the external ledger
    ///
    /// Publishers fill this with a placeholder; the consumer only honors a
    /// syntactically real connection string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_connection_override: Option<String>,
}

impl QueueMessage {
    /// Placeholder publishers put in `external_connection_override`
    ///
    /// Never a usable connection string; consumers fall back to their own
    /// configured connection when they see it.
    pub const CONNECTION_PLACEHOLDER: &'static str = "<CONNECTION_STRING>";

    /// Serialize this envelope for broker transport
    pub fn encode(&self) -> Result<String, super::error::EngineError> {
        serde_json::to_string(self).map_err(|e| super::error::EngineError::Decode {
            message: e.to_string(),
        })
    }

    /// Decode an envelope from its broker transport form
    pub fn decode(raw: &str) -> Result<Self, super::error::EngineError> {
        serde_json::from_str(raw).map_err(|e| super::error::EngineError::Decode {
            message: e.to_string(),
        })
    }

    /// Whether the envelope carries a semantically usable movement
    ///
    /// Messages failing this check are skipped by the consumer rather than
    /// treated as errors.
    pub fn is_plausible(&self) -> bool {
        !self.movement_type.is_empty() && self.account_number != 0 && self.amount > Decimal::ZERO
    }
}
