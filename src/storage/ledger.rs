//! In-memory external ledger
//!
//! Holds its own balance per account, independent of the local store; the
//! two deliberately diverge so reconciliation has something to settle. Test
//! hooks inject execution failures and record the connection strings used.

use crate::core::traits::{ExternalLedger, LedgerCall, LedgerOp};
use crate::types::{AccountNumber, LedgerError};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Mutex;
use tracing::debug;

/// In-memory authoritative ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: DashMap<AccountNumber, Decimal>,
    failing: DashMap<AccountNumber, ()>,
    connections: Mutex<Vec<String>>,
}

impl MemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the authoritative balance for an account
    pub fn set_balance(&self, number: AccountNumber, balance: Decimal) {
        self.balances.insert(number, balance);
    }

    /// The authoritative balance for an account, if it is known here
    pub fn balance(&self, number: AccountNumber) -> Option<Decimal> {
        self.balances.get(&number).map(|entry| *entry.value())
    }

    /// Make every movement for this account fail with an execution error
    pub fn fail_for(&self, number: AccountNumber) {
        self.failing.insert(number, ());
    }

    /// The connection string of the most recent invocation
    pub fn last_connection(&self) -> Option<String> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl ExternalLedger for MemoryLedger {
    async fn post_movement(
        &self,
        connection: &str,
        call: &LedgerCall,
    ) -> Result<Option<Decimal>, LedgerError> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(connection.to_string());

        if self.failing.contains_key(&call.account_number) {
            return Err(LedgerError::Execution {
                message: format!("injected failure for account {}", call.account_number),
            });
        }

        // Unknown account: the movement is accepted but no balance comes
        // back, the caller treats it as a no-op.
        let Some(mut entry) = self.balances.get_mut(&call.account_number) else {
            debug!(
                account = call.account_number,
                "ledger has no balance for account, executing without result"
            );
            return Ok(None);
        };

        match call.operation {
            LedgerOp::Debit => *entry -= call.amount,
            LedgerOp::Credit => *entry += call.amount,
        }
        Ok(Some(*entry))
    }
}
