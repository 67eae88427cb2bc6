//! Submit-path authorization and partition worker lifecycle
//!
//! `CommandQueueStrategy` is the single entry point for movement requests.
//! A submit call validates (and in immediate mode, applies) the movement
//! under the shared retry discipline, then hands authorized movements to the
//! single worker owning the account's partition. Responses are synchronous;
//! persistence and settlement publishing are not.

use crate::core::balance::apply_movement;
use crate::core::retry::{RetryError, RetryPolicy};
use crate::core::routing::PartitionRouter;
use crate::core::status::ServiceStatus;
use crate::core::traits::{CommandStore, MessageBroker};
use crate::core::validation::{validate_against_store, ValidationOutcome};
use crate::types::{BrokerError, EngineError, MovementRequest, SubmitOutcome};
use chrono::{NaiveDate, Utc};
use clap::ValueEnum;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use super::worker::{PartitionWorker, QueuedMovement};

/// When the balance mutation happens relative to the submit response
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BalanceMode {
    /// Validate on submit; the partition worker re-validates and mutates
    /// the balance. The response carries the pre-movement balance.
    Deferred,

    /// Mutate the balance inside a serializable transaction on submit; the
    /// partition worker only persists the row and publishes settlement.
    /// The response carries the post-movement balance.
    Immediate,
}

/// The movement authorization pipeline
///
/// # Thread Safety
///
/// Safe to share behind `Arc`; concurrent submits for accounts in different
/// partitions proceed independently, while movements within one partition
/// are serialized by its single worker.
pub struct CommandQueueStrategy<S: CommandStore> {
    mode: BalanceMode,
    store: Arc<S>,
    status: ServiceStatus,
    router: PartitionRouter,
    retry: RetryPolicy,
    senders: Mutex<HashMap<i32, UnboundedSender<QueuedMovement>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: CommandStore> CommandQueueStrategy<S> {
    /// Create the strategy and spawn one worker per partition
    ///
    /// The broker is handed to the workers; the submit path itself never
    /// publishes. Must be called inside a tokio runtime.
    pub fn new<B: MessageBroker>(
        mode: BalanceMode,
        store: Arc<S>,
        broker: Arc<B>,
        status: ServiceStatus,
        router: PartitionRouter,
        retry: RetryPolicy,
    ) -> Self {
        let mut senders = HashMap::new();
        let mut workers = Vec::new();

        for partition in router.partitions() {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(partition, tx);

            let worker = PartitionWorker {
                mode,
                partition,
                queue_name: router.queue_name(partition),
                store: Arc::clone(&store),
                broker: Arc::clone(&broker),
                status: status.clone(),
                retry,
            };
            workers.push(tokio::spawn(worker.run(rx)));
        }

        CommandQueueStrategy {
            mode,
            store,
            status,
            router,
            retry,
            senders: Mutex::new(senders),
            workers: Mutex::new(workers),
        }
    }

    /// The configured balance mode
    pub fn mode(&self) -> BalanceMode {
        self.mode
    }

    /// The shared administrative toggle
    pub fn status(&self) -> &ServiceStatus {
        &self.status
    }

    /// The partition router in use
    pub fn router(&self) -> PartitionRouter {
        self.router
    }

    /// Authorize a movement request
    ///
    /// # Returns
    ///
    /// A [`SubmitOutcome`] in every case:
    ///
    /// * status 99 when the service is inactive (nothing attempted)
    /// * status 1-4 for business rejections, with the current balance
    /// * status 0 when authorized; the movement is handed to its partition
    ///   worker and the balance reflects the configured [`BalanceMode`]
    /// * status 96-98 for terminal failures after the retry budget
    pub async fn submit(&self, request: MovementRequest) -> SubmitOutcome {
        if !self.status.is_active() {
            warn!(
                account = request.account_number,
                receipt = request.receipt_number,
                "service inactive, refusing movement"
            );
            return SubmitOutcome::inactive();
        }

        let partition = self.router.partition(request.account_number);
        let queue_name = self.router.queue_name(partition);
        let submitted_on = Utc::now().date_naive();

        let result = self
            .retry
            .run("submit", || {
                let request = request.clone();
                let queue_name = queue_name.clone();
                async move { self.authorize(&request, submitted_on, queue_name) }
            })
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(RetryError::LockExhausted) => return SubmitOutcome::lock_exhausted(),
            Err(RetryError::ConflictExhausted) => return SubmitOutcome::conflict_exhausted(),
            Err(RetryError::Fatal(e)) => {
                error!(
                    account = request.account_number,
                    receipt = request.receipt_number,
                    error = %e,
                    "submit failed"
                );
                return SubmitOutcome::internal_error();
            }
        };

        if outcome.is_authorized() {
            if let Err(e) = self.enqueue(partition, QueuedMovement { request, submitted_on }) {
                error!(partition, error = %e, "could not hand movement to its partition worker");
                return SubmitOutcome::internal_error();
            }
        }

        outcome
    }

    /// One authorization attempt
    fn authorize(
        &self,
        request: &MovementRequest,
        submitted_on: NaiveDate,
        queue_name: String,
    ) -> Result<SubmitOutcome, EngineError> {
        match self.mode {
            // Read-only decision against a snapshot; the worker re-validates
            // before mutating anything.
            BalanceMode::Deferred => {
                let decision =
                    validate_against_store(self.store.as_ref(), request, submitted_on)?;
                Ok(decision.into_submit_outcome(queue_name))
            }

            BalanceMode::Immediate => self.store.serializable(|store| {
                let decision = validate_against_store(store, request, submitted_on)?;
                match decision {
                    ValidationOutcome::Valid { mut account } => {
                        let balance =
                            apply_movement(&mut account, request.amount, &request.movement)?;
                        store.persist_account(&account)?;
                        Ok(SubmitOutcome::authorized(0, balance, queue_name))
                    }
                    invalid => Ok(invalid.into_submit_outcome(queue_name)),
                }
            }),
        }
    }

    fn enqueue(&self, partition: i32, item: QueuedMovement) -> Result<(), EngineError> {
        let senders = self
            .senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let closed = || {
            EngineError::Broker(BrokerError::Closed {
                queue: self.router.queue_name(partition),
            })
        };

        let sender = senders.get(&partition).ok_or_else(closed)?;
        sender.send(item).map_err(|_| closed())
    }

    /// Stop accepting new work and wait for the workers to drain
    ///
    /// Movements already handed to a worker are settled before its task
    /// ends; submits after shutdown fail with an internal error.
    pub async fn shutdown(&self) {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();

        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "partition worker task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::traits::AccountStore;
    use crate::storage::{MemoryBroker, MemoryStore};
    use crate::types::{QueueMessage, RequestState, StatusCode};
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, 1, 2)
    }

    fn strategy(
        mode: BalanceMode,
        store: Arc<MemoryStore>,
        broker: Arc<MemoryBroker>,
        queues: i32,
    ) -> CommandQueueStrategy<MemoryStore> {
        CommandQueueStrategy::new(
            mode,
            store,
            broker,
            ServiceStatus::new(),
            PartitionRouter::new(queues),
            fast_retry(),
        )
    }

    fn debit(account_number: i64, amount: i64, receipt_number: i64) -> MovementRequest {
        MovementRequest {
            account_number,
            amount: Decimal::new(amount, 2),
            movement: "debit".to_string(),
            receipt_number,
            original_movement_id: None,
        }
    }

    fn credit(account_number: i64, amount: i64, receipt_number: i64) -> MovementRequest {
        MovementRequest {
            movement: "credit".to_string(),
            ..debit(account_number, amount, receipt_number)
        }
    }

    /// Poll until the store holds `count` request rows
    async fn wait_for_rows(store: &MemoryStore, count: usize) {
        timeout(Duration::from_secs(5), async {
            while store.all_requests().len() < count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("request rows never appeared");
    }

    #[tokio::test]
    async fn test_deferred_acknowledges_pre_movement_balance() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Deferred, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert!(outcome.is_authorized());
        assert_eq!(outcome.balance, Decimal::new(1000_00, 2));
        assert_eq!(outcome.queue_name, "queue_3");

        engine.shutdown().await;
        let account = store.find_account(1000000001).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::new(800_00, 2));
    }

    #[tokio::test]
    async fn test_immediate_acknowledges_post_movement_balance() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert!(outcome.is_authorized());
        assert_eq!(outcome.balance, Decimal::new(800_00, 2));

        let account = store.find_account(1000000001).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::new(800_00, 2));
        engine.shutdown().await;
    }

    #[rstest]
    #[case::deferred(BalanceMode::Deferred)]
    #[case::immediate(BalanceMode::Immediate)]
    #[tokio::test]
    async fn test_worker_persists_authorized_row_and_publishes(#[case] mode: BalanceMode) {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let broker = Arc::new(MemoryBroker::new());
        let engine = strategy(mode, Arc::clone(&store), Arc::clone(&broker), 3);

        engine.submit(debit(1000000001, 200_00, 1)).await;
        engine.shutdown().await;

        let rows = store.all_requests();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, RequestState::Authorized);
        assert_eq!(rows[0].status_code, 0);
        assert_eq!(rows[0].balance, Decimal::new(800_00, 2));

        let mut rx = broker.take_receiver("queue_3").unwrap();
        let raw = rx.try_recv().expect("settlement message not published");
        let message = QueueMessage::decode(&raw).unwrap();
        assert_eq!(message.id, rows[0].id);
        assert_eq!(message.account_number, 1000000001);
        assert_eq!(message.movement_type, "debit");
        assert_eq!(
            message.external_connection_override.as_deref(),
            Some(QueueMessage::CONNECTION_PLACEHOLDER)
        );
    }

    #[rstest]
    #[case::deferred(BalanceMode::Deferred)]
    #[case::immediate(BalanceMode::Immediate)]
    #[tokio::test]
    async fn test_unknown_account_rejects_with_code_1(#[case] mode: BalanceMode) {
        let engine = strategy(mode, Arc::new(MemoryStore::new()), Arc::new(MemoryBroker::new()), 3);

        let outcome = engine.submit(debit(42, 100_00, 1)).await;

        assert_eq!(outcome.status_code, StatusCode::AccountNotFound.code());
        assert_eq!(outcome.balance, Decimal::ZERO);
        engine.shutdown().await;
    }

    #[rstest]
    #[case::deferred(BalanceMode::Deferred)]
    #[case::immediate(BalanceMode::Immediate)]
    #[tokio::test]
    async fn test_insufficient_funds_rejects_with_code_4(#[case] mode: BalanceMode) {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(100_00, 2));
        let engine = strategy(mode, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert_eq!(outcome.status_code, StatusCode::InsufficientFunds.code());
        assert_eq!(outcome.balance, Decimal::new(100_00, 2));

        // Rejected on the submit path: no row, no balance movement.
        engine.shutdown().await;
        assert!(store.all_requests().is_empty());
        let account = store.find_account(1000000001).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::new(100_00, 2));
    }

    #[rstest]
    #[case::deferred(BalanceMode::Deferred)]
    #[case::immediate(BalanceMode::Immediate)]
    #[tokio::test]
    async fn test_duplicate_submission_rejects_with_code_2(#[case] mode: BalanceMode) {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(mode, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        let first = engine.submit(debit(1000000001, 200_00, 7)).await;
        assert!(first.is_authorized());

        // The duplicate check looks at persisted rows, so wait for the
        // worker to record the first movement.
        wait_for_rows(&store, 1).await;

        let second = engine.submit(debit(1000000001, 200_00, 7)).await;
        assert_eq!(second.status_code, StatusCode::Duplicate.code());

        engine.shutdown().await;
        assert_eq!(store.all_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_same_receipt_different_amount_is_not_a_duplicate() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        engine.submit(debit(1000000001, 200_00, 7)).await;
        wait_for_rows(&store, 1).await;

        let outcome = engine.submit(debit(1000000001, 300_00, 7)).await;

        assert!(outcome.is_authorized());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_inactive_service_short_circuits_with_code_99() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        engine.status().deactivate();
        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert_eq!(outcome.status_code, StatusCode::Inactive.code());
        engine.shutdown().await;
        assert!(store.all_requests().is_empty());
        let account = store.find_account(1000000001).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::new(1000_00, 2));
    }

    #[tokio::test]
    async fn test_reactivation_resumes_processing() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        engine.status().deactivate();
        engine.status().activate();
        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert!(outcome.is_authorized());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_deferred_worker_records_rejected_row_when_state_moved() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Deferred, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        // Hold the transaction scope so neither movement settles until both
        // submits have validated against the same opening balance.
        let gate = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store.serializable(|_| {
                    std::thread::sleep(Duration::from_millis(200));
                    Ok(())
                })
            })
        };

        let first = engine.submit(debit(1000000001, 600_00, 1)).await;
        let second = engine.submit(debit(1000000001, 700_00, 2)).await;
        assert!(first.is_authorized());
        assert!(second.is_authorized());

        gate.join().unwrap().unwrap();
        engine.shutdown().await;

        // The worker re-validates: the first movement settles, the second
        // no longer covers its amount and lands as a rejected row.
        let rows = store.all_requests();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].state, RequestState::Authorized);
        assert_eq!(rows[0].balance, Decimal::new(400_00, 2));
        assert_eq!(rows[1].state, RequestState::Rejected);
        assert_eq!(rows[1].status_code, StatusCode::InsufficientFunds.code());
        assert_eq!(rows[1].balance, Decimal::new(400_00, 2));

        let account = store.find_account(1000000001).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::new(400_00, 2));
    }

    #[tokio::test]
    async fn test_persistent_version_conflicts_exhaust_with_code_98() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        // More injected conflicts than retry attempts.
        store.inject_version_conflicts(10);
        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert_eq!(outcome.status_code, StatusCode::ConflictExhausted.code());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_persistent_lock_conflicts_exhaust_with_code_97() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        store.inject_lock_conflicts(10);
        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert_eq!(outcome.status_code, StatusCode::LockExhausted.code());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_conflicts_recover_within_budget() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        store.inject_version_conflicts(2);
        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert!(outcome.is_authorized());
        assert_eq!(outcome.balance, Decimal::new(800_00, 2));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_worked_example_debit_then_credit() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Immediate, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        let first = engine.submit(debit(1000000001, 200_00, 1)).await;
        assert_eq!(first.balance, Decimal::new(800_00, 2));
        wait_for_rows(&store, 1).await;

        let duplicate = engine.submit(debit(1000000001, 200_00, 1)).await;
        assert_eq!(duplicate.status_code, StatusCode::Duplicate.code());

        let second = engine.submit(credit(1000000001, 500_00, 2)).await;
        assert_eq!(second.balance, Decimal::new(1300_00, 2));

        engine.shutdown().await;
        let account = store.find_account(1000000001).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::new(1300_00, 2));
        assert_eq!(store.all_requests().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_conserve_the_balance() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(10_000_00, 2));
        store.seed_account(1000000002, Decimal::new(10_000_00, 2));
        let engine = Arc::new(strategy(
            BalanceMode::Deferred,
            Arc::clone(&store),
            Arc::new(MemoryBroker::new()),
            4,
        ));

        let mut handles = Vec::new();
        for i in 0..50 {
            let engine = Arc::clone(&engine);
            let account = if i % 2 == 0 { 1000000001 } else { 1000000002 };
            handles.push(tokio::spawn(async move {
                engine.submit(debit(account, 100_00, i)).await
            }));
        }

        let mut authorized = 0;
        for handle in handles {
            if handle.await.unwrap().is_authorized() {
                authorized += 1;
            }
        }
        assert_eq!(authorized, 50);

        engine.shutdown().await;
        let total = store.find_account(1000000001).unwrap().unwrap().balance
            + store.find_account(1000000002).unwrap().unwrap().balance;
        assert_eq!(total, Decimal::new(15_000_00, 2));
        assert_eq!(store.all_requests().len(), 50);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_internal_error() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let engine = strategy(BalanceMode::Deferred, Arc::clone(&store), Arc::new(MemoryBroker::new()), 3);

        engine.shutdown().await;
        let outcome = engine.submit(debit(1000000001, 200_00, 1)).await;

        assert_eq!(outcome.status_code, StatusCode::InternalError.code());
    }
}
