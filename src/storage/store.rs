//! In-memory command store with optimistic versioning
//!
//! Accounts are keyed by external number, request rows by their assigned id.
//! `persist_account` enforces the optimistic version token exactly like a
//! relational row-version column would; `serializable` takes a store-wide
//! lock, the in-memory stand-in for a SERIALIZABLE transaction.

use crate::core::traits::{AccountStore, CommandStore, RequestStore};
use crate::types::{
    Account, AccountNumber, EngineError, IdempotencyKey, NewRequest, RequestId, RequestRecord,
    RequestState, StorageError,
};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// In-memory account and request store
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: DashMap<AccountNumber, Account>,
    requests: DashMap<RequestId, RequestRecord>,
    next_account_id: AtomicU32,
    next_request_id: AtomicU32,

    /// Store-wide lock backing the serializable transaction scope
    tx_lock: Mutex<()>,

    /// Pending injected version conflicts, consumed by `persist_account`
    forced_conflicts: AtomicU32,

    /// Pending injected lock conflicts, consumed by `persist_account`
    forced_locks: AtomicU32,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with an opening balance, assigning its internal id
    pub fn seed_account(&self, number: AccountNumber, balance: Decimal) -> Account {
        let id = self.next_account_id.fetch_add(1, Ordering::SeqCst) + 1;
        let account = Account::new(id, number, balance);
        self.accounts.insert(number, account.clone());
        account
    }

    /// Make the next `count` persists fail with a version conflict
    ///
    /// Test support: exercises the retry discipline without a contended
    /// backend.
    pub fn inject_version_conflicts(&self, count: u32) {
        self.forced_conflicts.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` persists fail with a lock conflict
    ///
    /// Test support: the backend signature that exhausts into status 97.
    pub fn inject_lock_conflicts(&self, count: u32) {
        self.forced_locks.store(count, Ordering::SeqCst);
    }

    /// Snapshot of every request row, in id order
    pub fn all_requests(&self) -> Vec<RequestRecord> {
        let mut rows: Vec<RequestRecord> =
            self.requests.iter().map(|entry| entry.value().clone()).collect();
        rows.sort_by_key(|row| row.id);
        rows
    }

    fn take_forced_conflict(&self) -> bool {
        Self::take_injected(&self.forced_conflicts)
    }

    fn take_forced_lock(&self) -> bool {
        Self::take_injected(&self.forced_locks)
    }

    fn take_injected(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl AccountStore for MemoryStore {
    fn find_account(&self, number: AccountNumber) -> Result<Option<Account>, StorageError> {
        Ok(self.accounts.get(&number).map(|entry| entry.value().clone()))
    }

    fn persist_account(&self, account: &Account) -> Result<Account, StorageError> {
        if self.take_forced_conflict() {
            return Err(StorageError::VersionConflict {
                number: account.number,
                snapshot: account.version,
            });
        }

        if self.take_forced_lock() {
            return Err(StorageError::Lock {
                message: format!("injected lock timeout on account {}", account.number),
            });
        }

        let Some(mut entry) = self.accounts.get_mut(&account.number) else {
            return Err(StorageError::Backend {
                message: format!("account {} does not exist", account.number),
            });
        };

        if entry.version != account.version {
            return Err(StorageError::VersionConflict {
                number: account.number,
                snapshot: account.version,
            });
        }

        entry.balance = account.balance;
        entry.version += 1;
        Ok(entry.clone())
    }

    fn overwrite_balance(
        &self,
        number: AccountNumber,
        balance: Decimal,
    ) -> Result<Option<Account>, StorageError> {
        let Some(mut entry) = self.accounts.get_mut(&number) else {
            return Ok(None);
        };

        entry.balance = balance;
        entry.version += 1;
        Ok(Some(entry.clone()))
    }
}

impl RequestStore for MemoryStore {
    fn has_authorized(&self, key: &IdempotencyKey) -> Result<bool, StorageError> {
        Ok(self.requests.iter().any(|entry| {
            let row = entry.value();
            row.state == RequestState::Authorized
                && row.account_id == key.account_id
                && row.amount == key.amount
                && row.receipt_number == key.receipt_number
                && row.submitted_on == key.submitted_on
        }))
    }

    fn insert_request(&self, row: NewRequest) -> Result<RequestRecord, StorageError> {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = RequestRecord::from_new(id, row);
        self.requests.insert(id, record.clone());
        Ok(record)
    }

    fn find_request(&self, id: RequestId) -> Result<Option<RequestRecord>, StorageError> {
        Ok(self.requests.get(&id).map(|entry| entry.value().clone()))
    }

    fn mark_reconciled(
        &self,
        id: RequestId,
        balance: Decimal,
    ) -> Result<Option<RequestRecord>, StorageError> {
        let Some(mut entry) = self.requests.get_mut(&id) else {
            return Ok(None);
        };

        // Reconciled is only reachable from Authorized.
        if entry.state != RequestState::Authorized {
            return Ok(None);
        }

        entry.state = RequestState::Reconciled;
        entry.balance = balance;
        entry.recorded_at = Utc::now();
        Ok(Some(entry.clone()))
    }
}

impl CommandStore for MemoryStore {
    fn serializable<R, F>(&self, body: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Self) -> Result<R, EngineError>,
    {
        let _guard = self
            .tx_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        body(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_request(account_id: u32, state: RequestState) -> NewRequest {
        NewRequest {
            account_id,
            amount: Decimal::new(200_00, 2),
            movement: "debit".to_string(),
            receipt_number: 1,
            original_movement_id: None,
            submitted_on: NaiveDate::from_ymd_opt(2026, 8, 30).unwrap(),
            recorded_at: Utc::now(),
            state,
            status_code: 0,
            balance: Decimal::new(800_00, 2),
        }
    }

    #[test]
    fn test_seed_and_find_account() {
        let store = MemoryStore::new();
        let seeded = store.seed_account(1000000001, Decimal::new(1000_00, 2));

        let found = store.find_account(1000000001).unwrap().unwrap();

        assert_eq!(found, seeded);
        assert_eq!(found.id, 1);
        assert!(store.find_account(42).unwrap().is_none());
    }

    #[test]
    fn test_persist_bumps_version() {
        let store = MemoryStore::new();
        let mut account = store.seed_account(1000000001, Decimal::new(1000_00, 2));

        account.balance = Decimal::new(800_00, 2);
        let stored = store.persist_account(&account).unwrap();

        assert_eq!(stored.balance, Decimal::new(800_00, 2));
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn test_stale_snapshot_is_version_conflict() {
        let store = MemoryStore::new();
        let mut stale = store.seed_account(1000000001, Decimal::new(1000_00, 2));

        // Another writer persists first.
        let mut fresh = stale.clone();
        fresh.balance = Decimal::new(900_00, 2);
        store.persist_account(&fresh).unwrap();

        stale.balance = Decimal::new(800_00, 2);
        let result = store.persist_account(&stale);

        assert_eq!(
            result,
            Err(StorageError::VersionConflict {
                number: 1000000001,
                snapshot: 0
            })
        );
    }

    #[test]
    fn test_injected_conflicts_are_consumed() {
        let store = MemoryStore::new();
        let account = store.seed_account(1000000001, Decimal::new(1000_00, 2));

        store.inject_version_conflicts(2);

        assert!(store.persist_account(&account).is_err());
        assert!(store.persist_account(&account).is_err());
        assert!(store.persist_account(&account).is_ok());
    }

    #[test]
    fn test_injected_lock_conflicts_are_consumed() {
        let store = MemoryStore::new();
        let account = store.seed_account(1000000001, Decimal::new(1000_00, 2));

        store.inject_lock_conflicts(1);

        assert!(matches!(
            store.persist_account(&account),
            Err(StorageError::Lock { .. })
        ));
        assert!(store.persist_account(&account).is_ok());
    }

    #[test]
    fn test_overwrite_balance_ignores_version() {
        let store = MemoryStore::new();
        store.seed_account(1000000001, Decimal::new(1300_00, 2));

        let updated = store
            .overwrite_balance(1000000001, Decimal::new(1280_00, 2))
            .unwrap()
            .unwrap();

        assert_eq!(updated.balance, Decimal::new(1280_00, 2));
        assert_eq!(updated.version, 1);
    }

    #[test]
    fn test_overwrite_balance_missing_account() {
        let store = MemoryStore::new();

        let result = store.overwrite_balance(42, Decimal::ONE).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_has_authorized_matches_full_key() {
        let store = MemoryStore::new();
        store.seed_account(1000000001, Decimal::new(1000_00, 2));
        let inserted = store
            .insert_request(new_request(1, RequestState::Authorized))
            .unwrap();

        let key = IdempotencyKey {
            account_id: 1,
            amount: inserted.amount,
            receipt_number: inserted.receipt_number,
            submitted_on: inserted.submitted_on,
        };
        assert!(store.has_authorized(&key).unwrap());

        let different_receipt = IdempotencyKey {
            receipt_number: 2,
            ..key.clone()
        };
        assert!(!store.has_authorized(&different_receipt).unwrap());

        let different_amount = IdempotencyKey {
            amount: Decimal::new(100_00, 2),
            ..key
        };
        assert!(!store.has_authorized(&different_amount).unwrap());
    }

    #[test]
    fn test_has_authorized_ignores_rejected_rows() {
        let store = MemoryStore::new();
        let inserted = store
            .insert_request(new_request(1, RequestState::Rejected))
            .unwrap();

        let key = IdempotencyKey {
            account_id: 1,
            amount: inserted.amount,
            receipt_number: inserted.receipt_number,
            submitted_on: inserted.submitted_on,
        };

        assert!(!store.has_authorized(&key).unwrap());
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let store = MemoryStore::new();

        let first = store
            .insert_request(new_request(1, RequestState::Authorized))
            .unwrap();
        let second = store
            .insert_request(new_request(1, RequestState::Rejected))
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_mark_reconciled_from_authorized() {
        let store = MemoryStore::new();
        let inserted = store
            .insert_request(new_request(1, RequestState::Authorized))
            .unwrap();

        let settled = store
            .mark_reconciled(inserted.id, Decimal::new(1280_00, 2))
            .unwrap()
            .unwrap();

        assert_eq!(settled.state, RequestState::Reconciled);
        assert_eq!(settled.balance, Decimal::new(1280_00, 2));
    }

    #[test]
    fn test_mark_reconciled_refuses_rejected_rows() {
        let store = MemoryStore::new();
        let inserted = store
            .insert_request(new_request(1, RequestState::Rejected))
            .unwrap();

        let result = store
            .mark_reconciled(inserted.id, Decimal::new(1280_00, 2))
            .unwrap();

        assert!(result.is_none());
        let row = store.find_request(inserted.id).unwrap().unwrap();
        assert_eq!(row.state, RequestState::Rejected);
    }

    #[test]
    fn test_mark_reconciled_is_not_repeatable() {
        let store = MemoryStore::new();
        let inserted = store
            .insert_request(new_request(1, RequestState::Authorized))
            .unwrap();

        store
            .mark_reconciled(inserted.id, Decimal::new(1280_00, 2))
            .unwrap();
        let second = store
            .mark_reconciled(inserted.id, Decimal::new(999_00, 2))
            .unwrap();

        assert!(second.is_none());
        let row = store.find_request(inserted.id).unwrap().unwrap();
        assert_eq!(row.balance, Decimal::new(1280_00, 2));
    }

    #[test]
    fn test_mark_reconciled_missing_row() {
        let store = MemoryStore::new();

        assert!(store.mark_reconciled(42, Decimal::ONE).unwrap().is_none());
    }

    #[test]
    fn test_serializable_passes_through() {
        let store = MemoryStore::new();
        store.seed_account(1000000001, Decimal::new(1000_00, 2));

        let balance = store
            .serializable(|s| {
                let account = s.find_account(1000000001)?;
                Ok(account.map(|a| a.balance))
            })
            .unwrap();

        assert_eq!(balance, Some(Decimal::new(1000_00, 2)));
    }
}
