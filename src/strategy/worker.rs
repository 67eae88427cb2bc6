//! Partition workers: the single consumer of each partition's channel
//!
//! One worker per partition serializes every movement routed to it, which is
//! what makes per-account ordering hold without row-level locking on the hot
//! path. A worker's whole settlement step runs under the shared retry
//! discipline; when the attempts are exhausted the item is logged and
//! dropped, there is no dead-letter queue.

use crate::core::balance::apply_movement;
use crate::core::retry::{RetryError, RetryPolicy};
use crate::core::status::ServiceStatus;
use crate::core::traits::{CommandStore, MessageBroker};
use crate::core::validation::{validate_against_store, ValidationOutcome};
use crate::types::{
    EngineError, MovementRequest, NewRequest, QueueMessage, RequestRecord, RequestState,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

use super::command_queue::BalanceMode;

/// A movement handed from the submit path to its partition worker
#[derive(Debug, Clone)]
pub(crate) struct QueuedMovement {
    pub request: MovementRequest,
    /// Submission date, fixed at submit time so the idempotency key the
    /// worker re-checks matches the one the submit path checked
    pub submitted_on: NaiveDate,
}

/// The single consumer of one partition's channel
pub(crate) struct PartitionWorker<S, B> {
    pub mode: BalanceMode,
    pub partition: i32,
    pub queue_name: String,
    pub store: Arc<S>,
    pub broker: Arc<B>,
    pub status: ServiceStatus,
    pub retry: RetryPolicy,
}

impl<S: CommandStore, B: MessageBroker> PartitionWorker<S, B> {
    /// Drain the partition channel until every sender is gone
    pub(crate) async fn run(self, mut items: UnboundedReceiver<QueuedMovement>) {
        info!(partition = self.partition, mode = ?self.mode, "partition worker started");

        while let Some(item) = items.recv().await {
            self.process(item).await;
        }

        info!(partition = self.partition, "partition worker stopped");
    }

    async fn process(&self, item: QueuedMovement) {
        let result = self
            .retry
            .run("partition_worker", || {
                let item = item.clone();
                async move { self.settle_item(&item) }
            })
            .await;

        // No dead-lettering: an item that cannot settle is logged with its
        // identifying fields and dropped.
        if let Err(e) = result {
            let reason = match e {
                RetryError::LockExhausted => "lock conflicts exhausted retries",
                RetryError::ConflictExhausted => "version conflicts exhausted retries",
                RetryError::Fatal(ref inner) => {
                    error!(
                        partition = self.partition,
                        account = item.request.account_number,
                        receipt = item.request.receipt_number,
                        error = %inner,
                        "queued movement failed terminally, dropping"
                    );
                    return;
                }
            };
            error!(
                partition = self.partition,
                account = item.request.account_number,
                receipt = item.request.receipt_number,
                reason,
                "queued movement dropped"
            );
        }
    }

    fn settle_item(&self, item: &QueuedMovement) -> Result<(), EngineError> {
        match self.mode {
            BalanceMode::Deferred => self.settle_deferred(item),
            BalanceMode::Immediate => self.settle_immediate(item),
        }
    }

    /// Deferred mode: re-validate and apply the movement inside one
    /// serializable transaction
    ///
    /// The submit-path decision was taken against a possibly stale snapshot;
    /// state may have moved by the time the item reaches the front of its
    /// partition. A request that no longer validates is recorded as a
    /// rejected row instead of a balance mutation.
    fn settle_deferred(&self, item: &QueuedMovement) -> Result<(), EngineError> {
        self.store.serializable(|store| {
            if !self.status.is_active() {
                warn!(
                    partition = self.partition,
                    account = item.request.account_number,
                    "service inactive, dropping queued movement"
                );
                return Ok(());
            }

            let decision = validate_against_store(store, &item.request, item.submitted_on)?;
            match decision {
                ValidationOutcome::Valid { mut account } => {
                    let account_id = account.id;
                    let balance =
                        apply_movement(&mut account, item.request.amount, &item.request.movement)?;
                    store.persist_account(&account)?;

                    let row = store.insert_request(NewRequest {
                        account_id,
                        amount: item.request.amount,
                        movement: item.request.movement.clone(),
                        receipt_number: item.request.receipt_number,
                        original_movement_id: item.request.original_movement_id,
                        submitted_on: item.submitted_on,
                        recorded_at: Utc::now(),
                        state: RequestState::Authorized,
                        status_code: 0,
                        balance,
                    })?;

                    self.publish_settlement(&row, item.request.account_number)?;

                    info!(
                        partition = self.partition,
                        request = row.id,
                        account = item.request.account_number,
                        %balance,
                        "movement settled"
                    );
                    Ok(())
                }
                invalid => {
                    let status = invalid.status().code();
                    let balance = invalid.balance();
                    let Some(account_id) = invalid.account_id() else {
                        // The account vanished between submit and settlement;
                        // nothing to attach a rejected row to.
                        warn!(
                            partition = self.partition,
                            account = item.request.account_number,
                            "account no longer exists, dropping queued movement"
                        );
                        return Ok(());
                    };

                    store.insert_request(NewRequest {
                        account_id,
                        amount: item.request.amount,
                        movement: item.request.movement.clone(),
                        receipt_number: item.request.receipt_number,
                        original_movement_id: item.request.original_movement_id,
                        submitted_on: item.submitted_on,
                        recorded_at: Utc::now(),
                        state: RequestState::Rejected,
                        status_code: status,
                        balance,
                    })?;

                    warn!(
                        partition = self.partition,
                        account = item.request.account_number,
                        receipt = item.request.receipt_number,
                        status,
                        "queued movement no longer valid, recorded as rejected"
                    );
                    Ok(())
                }
            }
        })
    }

    /// Immediate mode: the balance already moved on the submit path, only
    /// the request row and the settlement message remain
    fn settle_immediate(&self, item: &QueuedMovement) -> Result<(), EngineError> {
        self.store.serializable(|store| {
            if !self.status.is_active() {
                warn!(
                    partition = self.partition,
                    account = item.request.account_number,
                    "service inactive, dropping queued movement"
                );
                return Ok(());
            }

            let Some(account) = store.find_account(item.request.account_number)? else {
                warn!(
                    partition = self.partition,
                    account = item.request.account_number,
                    "account no longer exists, dropping queued movement"
                );
                return Ok(());
            };

            let row = store.insert_request(NewRequest {
                account_id: account.id,
                amount: item.request.amount,
                movement: item.request.movement.clone(),
                receipt_number: item.request.receipt_number,
                original_movement_id: item.request.original_movement_id,
                submitted_on: item.submitted_on,
                recorded_at: Utc::now(),
                state: RequestState::Authorized,
                status_code: 0,
                balance: account.balance,
            })?;

            self.publish_settlement(&row, item.request.account_number)?;

            info!(
                partition = self.partition,
                request = row.id,
                account = item.request.account_number,
                balance = %account.balance,
                "movement recorded"
            );
            Ok(())
        })
    }

    fn publish_settlement(
        &self,
        row: &RequestRecord,
        account_number: i64,
    ) -> Result<(), EngineError> {
        let message = QueueMessage {
            id: row.id,
            account_number,
            amount: row.amount,
            movement_type: row.movement.clone(),
            receipt_number: row.receipt_number,
            movement_date: row.recorded_at,
            reversal_reference: row.original_movement_id,
            external_connection_override: Some(QueueMessage::CONNECTION_PLACEHOLDER.to_string()),
        };

        self.broker.publish(&message.encode()?, &self.queue_name)?;
        Ok(())
    }
}
