use super::locks::{self, RowLocks};
use crate::config::LedgerConfig;
use crate::domain::account::{Account, AccountId};
use crate::domain::ports::{LedgerStore, LedgerUow};
use crate::domain::qr::{QrPayment, QrPaymentId};
use crate::domain::transaction::{TransactionId, TransactionRecord};
use crate::domain::user::{UserId, UserProfile};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, RwLock};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, UserProfile>,
    accounts: HashMap<AccountId, Account>,
    accounts_by_number: HashMap<String, AccountId>,
    accounts_by_owner: HashMap<UserId, AccountId>,
    transactions: HashMap<TransactionId, TransactionRecord>,
    idempotency_keys: HashMap<String, TransactionId>,
    qr_payments: HashMap<QrPaymentId, QrPayment>,
    qr_by_code: HashMap<String, QrPaymentId>,
}

/// Thread-safe in-memory ledger store.
///
/// Committed state lives in one `Arc<RwLock<Tables>>`; readers see either
/// all or none of a unit of work because commits apply under the single
/// write lock. Row-level exclusivity is a side table of per-row
/// `tokio::sync::Mutex`es, acquired with a bounded wait.
///
/// The default backend, and the one every test runs against.
#[derive(Clone)]
pub struct InMemoryLedger {
    tables: Arc<RwLock<Tables>>,
    account_locks: RowLocks<AccountId>,
    qr_locks: RowLocks<QrPaymentId>,
    lock_timeout: Duration,
}

impl InMemoryLedger {
    /// Creates an empty store with the default lock timeout.
    pub fn new() -> Self {
        Self::with_lock_timeout(LedgerConfig::default().lock_timeout())
    }

    /// Creates an empty store with an explicit bound on row-lock waits.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::default(),
            account_locks: Arc::default(),
            qr_locks: Arc::default(),
            lock_timeout,
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerUow>> {
        Ok(Box::new(InMemoryUow::new(self.clone())))
    }

    async fn user(&self, id: UserId) -> Result<Option<UserProfile>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id).cloned())
    }

    async fn account_by_number(&self, number: &str) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts_by_number
            .get(number)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn account_of_user(&self, user: UserId) -> Result<Option<Account>> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts_by_owner
            .get(&user)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<TransactionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(&id).cloned())
    }

    async fn transactions_for_account(&self, id: AccountId) -> Result<Vec<TransactionRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .transactions
            .values()
            .filter(|tx| tx.to == id || tx.from == Some(id))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn qr_by_code(&self, code: &str) -> Result<Option<QrPayment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .qr_by_code
            .get(code)
            .and_then(|id| tables.qr_payments.get(id))
            .cloned())
    }

    async fn account_number_exists(&self, number: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.accounts_by_number.contains_key(number))
    }

    async fn qr_code_exists(&self, code: &str) -> Result<bool> {
        let tables = self.tables.read().await;
        Ok(tables.qr_by_code.contains_key(code))
    }
}

/// A unit of work over [`InMemoryLedger`].
///
/// Holds the row guards it acquired until it is committed or dropped, so a
/// locked row stays exclusive for the whole settlement, not just the read.
pub struct InMemoryUow {
    store: InMemoryLedger,
    account_guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    qr_guards: HashMap<QrPaymentId, OwnedMutexGuard<()>>,
    users: Vec<UserProfile>,
    accounts: Vec<Account>,
    transactions: Vec<TransactionRecord>,
    qr_payments: Vec<QrPayment>,
}

impl InMemoryUow {
    fn new(store: InMemoryLedger) -> Self {
        Self {
            store,
            account_guards: HashMap::new(),
            qr_guards: HashMap::new(),
            users: Vec::new(),
            accounts: Vec::new(),
            transactions: Vec::new(),
            qr_payments: Vec::new(),
        }
    }
}

#[async_trait]
impl LedgerUow for InMemoryUow {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        // Re-locking a row this unit of work already holds must not
        // self-deadlock; it degrades to a fresh read.
        if !self.account_guards.contains_key(&id) {
            let handle = locks::handle_for(&self.store.account_locks, id).await;
            let guard = locks::acquire(handle, self.store.lock_timeout).await?;
            self.account_guards.insert(id, guard);
        }
        let tables = self.store.tables.read().await;
        tables
            .accounts
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound)
    }

    async fn lock_qr(&mut self, id: QrPaymentId) -> Result<QrPayment> {
        if !self.qr_guards.contains_key(&id) {
            let handle = locks::handle_for(&self.store.qr_locks, id).await;
            let guard = locks::acquire(handle, self.store.lock_timeout).await?;
            self.qr_guards.insert(id, guard);
        }
        let tables = self.store.tables.read().await;
        tables
            .qr_payments
            .get(&id)
            .cloned()
            .ok_or(LedgerError::QrNotFound)
    }

    fn put_user(&mut self, user: UserProfile) {
        self.users.push(user);
    }

    fn put_account(&mut self, account: Account) {
        self.accounts.push(account);
    }

    fn put_transaction(&mut self, transaction: TransactionRecord) {
        self.transactions.push(transaction);
    }

    fn put_qr(&mut self, qr: QrPayment) {
        self.qr_payments.push(qr);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let store = self.store.clone();
        let mut tables = store.tables.write().await;
        let this = *self;

        // Uniqueness gates run before any write so a rejected commit
        // leaves the tables untouched.
        for tx in &this.transactions {
            if let Some(existing) = tables.idempotency_keys.get(&tx.idempotency_key)
                && *existing != tx.id
            {
                return Err(LedgerError::DuplicateKey(tx.idempotency_key.clone()));
            }
        }
        for account in &this.accounts {
            if let Some(existing) = tables.accounts_by_number.get(&account.number)
                && *existing != account.id
            {
                return Err(LedgerError::Conflict(format!(
                    "account number {} is taken",
                    account.number
                )));
            }
            if let Some(existing) = tables.accounts_by_owner.get(&account.owner)
                && *existing != account.id
            {
                return Err(LedgerError::Conflict(
                    "user already owns an account".to_string(),
                ));
            }
        }
        for qr in &this.qr_payments {
            if let Some(existing) = tables.qr_by_code.get(&qr.code)
                && *existing != qr.id
            {
                return Err(LedgerError::Conflict(format!("qr code {} is taken", qr.code)));
            }
        }

        for user in this.users {
            tables.users.insert(user.id, user);
        }
        for account in this.accounts {
            tables
                .accounts_by_number
                .insert(account.number.clone(), account.id);
            tables.accounts_by_owner.insert(account.owner, account.id);
            tables.accounts.insert(account.id, account);
        }
        for tx in this.transactions {
            tables.idempotency_keys.insert(tx.idempotency_key.clone(), tx.id);
            tables.transactions.insert(tx.id, tx);
        }
        for qr in this.qr_payments {
            tables.qr_by_code.insert(qr.code.clone(), qr.id);
            tables.qr_payments.insert(qr.id, qr);
        }
        // Row guards in `this` release after the table lock, so no other
        // unit of work can sneak in between apply and release.
        Ok(())
    }
}
