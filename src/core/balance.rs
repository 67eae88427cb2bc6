//! Movement-type balance arithmetic
//!
//! Debits and reversals-of-credit subtract; credits and reversals-of-debit
//! add. The functions take the raw wire value and error on anything outside
//! the recognized set, which is never reached when the validation engine ran
//! first.

use crate::types::{Account, EngineError, MovementType};
use rust_decimal::Decimal;
use tracing::debug;

/// Compute the balance resulting from a movement
///
/// Pure function: does not touch any account state.
pub fn movement_result(
    balance: Decimal,
    amount: Decimal,
    movement: &str,
) -> Result<Decimal, EngineError> {
    let Some(movement_type) = MovementType::from_wire(movement) else {
        return Err(EngineError::UnknownMovementType {
            movement: movement.to_string(),
        });
    };

    let new_balance = if movement_type.decreases_balance() {
        balance - amount
    } else {
        balance + amount
    };

    debug!(
        %balance,
        %new_balance,
        movement,
        %amount,
        "balance computed"
    );

    Ok(new_balance)
}

/// Apply a movement to an account, mutating its balance field
///
/// Returns the new balance.
pub fn apply_movement(
    account: &mut Account,
    amount: Decimal,
    movement: &str,
) -> Result<Decimal, EngineError> {
    let previous = account.balance;
    account.balance = movement_result(account.balance, amount, movement)?;

    debug!(
        account = account.number,
        %previous,
        balance = %account.balance,
        movement,
        %amount,
        "movement applied"
    );

    Ok(account.balance)
}
