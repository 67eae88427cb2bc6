//! Reconciliation: settle authorized movements against the external ledger
//!
//! One consumer per partition queue drains settlement envelopes, invokes the
//! authoritative external ledger, and folds the result back into local
//! state: the account balance is overwritten last-writer-wins and the
//! request row moves from `Authorized` to `Reconciled`. Messages that fail
//! are logged and dropped; there is no dead-letter queue and no redelivery.

use crate::core::traits::{CommandStore, ExternalLedger, LedgerCall, LedgerOp};
use crate::types::{EngineError, MovementType, QueueMessage};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Single consumer of one partition's settlement queue
pub struct ReconciliationConsumer<S: CommandStore, L: ExternalLedger> {
    store: Arc<S>,
    ledger: Arc<L>,
    local_connection: String,
    queue: String,
}

impl<S: CommandStore, L: ExternalLedger> ReconciliationConsumer<S, L> {
    /// Create a consumer for one queue
    ///
    /// `local_connection` is the configured ledger connection, used whenever
    /// an envelope carries no usable override.
    pub fn new(store: Arc<S>, ledger: Arc<L>, local_connection: String, queue: String) -> Self {
        ReconciliationConsumer {
            store,
            ledger,
            local_connection,
            queue,
        }
    }

    /// Spawn the consume loop on the runtime
    pub fn start(self, messages: UnboundedReceiver<String>) -> JoinHandle<()> {
        tokio::spawn(self.run(messages))
    }

    /// Drain the queue until its producer side is gone
    pub async fn run(self, mut messages: UnboundedReceiver<String>) {
        info!(queue = %self.queue, "reconciliation consumer started");

        while let Some(raw) = messages.recv().await {
            // Failed settlements are logged and dropped, never redelivered.
            if let Err(e) = self.settle(&raw).await {
                error!(queue = %self.queue, error = %e, "settlement failed, dropping message");
            }
        }

        info!(queue = %self.queue, "reconciliation consumer stopped");
    }

    /// Settle one envelope
    async fn settle(&self, raw: &str) -> Result<(), EngineError> {
        let message = QueueMessage::decode(raw)?;

        if !message.is_plausible() {
            warn!(
                queue = %self.queue,
                request = message.id,
                "implausible settlement envelope, skipping"
            );
            return Ok(());
        }

        let Some(movement) = MovementType::from_wire(&message.movement_type) else {
            warn!(
                queue = %self.queue,
                request = message.id,
                movement = %message.movement_type,
                "unrecognized movement type in settlement envelope, skipping"
            );
            return Ok(());
        };

        let connection = self.resolve_connection(message.external_connection_override.as_deref());
        let call = LedgerCall {
            operation: LedgerOp::for_movement(movement),
            account_number: message.account_number,
            amount: message.amount,
            movement_date: message.movement_date,
            receipt_number: message.receipt_number,
            reversal_reference: message.reversal_reference,
        };

        let Some(balance) = self.ledger.post_movement(connection, &call).await? else {
            debug!(
                queue = %self.queue,
                request = message.id,
                account = message.account_number,
                "ledger reported no balance, nothing to reconcile"
            );
            return Ok(());
        };

        // The external ledger is authoritative: overwrite the local balance
        // regardless of what happened locally since authorization.
        if self
            .store
            .overwrite_balance(message.account_number, balance)?
            .is_none()
        {
            warn!(
                queue = %self.queue,
                account = message.account_number,
                "account missing locally, balance not updated"
            );
        }

        match self.store.mark_reconciled(message.id, balance)? {
            Some(row) => {
                info!(
                    queue = %self.queue,
                    request = row.id,
                    account = message.account_number,
                    %balance,
                    "movement reconciled"
                );
            }
            None => {
                warn!(
                    queue = %self.queue,
                    request = message.id,
                    "request row missing or not authorized, state unchanged"
                );
            }
        }

        Ok(())
    }

    /// Pick the ledger connection for an envelope
    ///
    /// An override is honored only when it looks like a real connection
    /// string; the publisher's placeholder never does.
    fn resolve_connection<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(candidate) if is_usable_connection(candidate) => candidate,
            _ => &self.local_connection,
        }
    }
}

/// Whether a connection override is syntactically usable
fn is_usable_connection(candidate: &str) -> bool {
    candidate.contains("Server=")
        && candidate.contains("Database=")
        && !candidate.contains('<')
        && !candidate.contains('>')
        && !candidate.contains("CONNECTION_STRING")
}
