use super::locks::{self, RowLocks};
use crate::config::LedgerConfig;
use crate::domain::account::{Account, AccountId};
use crate::domain::ports::{LedgerStore, LedgerUow};
use crate::domain::qr::{QrPayment, QrPaymentId};
use crate::domain::transaction::{TransactionId, TransactionRecord};
use crate::domain::user::{UserId, UserProfile};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Column Family for user profiles.
pub const CF_USERS: &str = "users";
/// Column Family for account rows.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family mapping account number -> account id.
pub const CF_ACCOUNTS_BY_NUMBER: &str = "accounts_by_number";
/// Column Family mapping owner user id -> account id.
pub const CF_ACCOUNTS_BY_OWNER: &str = "accounts_by_owner";
/// Column Family for transaction records.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family mapping idempotency key -> transaction id.
pub const CF_IDEMPOTENCY: &str = "idempotency_keys";
/// Column Family for QR payment rows.
pub const CF_QR_PAYMENTS: &str = "qr_payments";
/// Column Family mapping QR code -> QR payment id.
pub const CF_QR_BY_CODE: &str = "qr_by_code";

const ALL_CFS: [&str; 8] = [
    CF_USERS,
    CF_ACCOUNTS,
    CF_ACCOUNTS_BY_NUMBER,
    CF_ACCOUNTS_BY_OWNER,
    CF_TRANSACTIONS,
    CF_IDEMPOTENCY,
    CF_QR_PAYMENTS,
    CF_QR_BY_CODE,
];

/// Durable ledger store backed by RocksDB.
///
/// Entities are stored as serde_json values, one Column Family per table,
/// with separate index families for the unique lookups. A unit of work
/// lands as a single `WriteBatch`, so a crash mid-settlement never leaves
/// one leg applied.
///
/// Row locks are in-process: this store assumes a single embedding
/// process, the same deployment shape as the in-memory backend.
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    account_locks: RowLocks<AccountId>,
    qr_locks: RowLocks<QrPaymentId>,
    /// Serializes commits so uniqueness validation and the batch write
    /// behave as one step.
    commit_gate: Arc<Mutex<()>>,
    lock_timeout: Duration,
}

fn storage_err(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(storage_err)
}

fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(storage_err)
}

impl RocksDbLedger {
    /// Opens or creates a database at `path`, ensuring all column families
    /// exist. Uses the default lock timeout.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_lock_timeout(path, LedgerConfig::default().lock_timeout())
    }

    pub fn open_with_lock_timeout<P: AsRef<Path>>(path: P, lock_timeout: Duration) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors).map_err(storage_err)?;

        Ok(Self {
            db: Arc::new(db),
            account_locks: Arc::default(),
            qr_locks: Arc::default(),
            commit_gate: Arc::default(),
            lock_timeout,
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::Storage(format!("column family {name} not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(from_json(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Follows an index family entry (value = 16-byte uuid) into `target_cf`.
    fn get_indexed<T: DeserializeOwned>(
        &self,
        index_cf: &str,
        key: &[u8],
        target_cf: &str,
    ) -> Result<Option<T>> {
        let index = self.cf(index_cf)?;
        match self.db.get_cf(index, key).map_err(storage_err)? {
            Some(id_bytes) => self.get_json(target_cf, &id_bytes),
            None => Ok(None),
        }
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(cf, key).map_err(storage_err)?.is_some())
    }
}

#[async_trait]
impl LedgerStore for RocksDbLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerUow>> {
        Ok(Box::new(RocksDbUow::new(self.clone())))
    }

    async fn user(&self, id: UserId) -> Result<Option<UserProfile>> {
        self.get_json(CF_USERS, id.as_uuid().as_bytes())
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        self.get_json(CF_ACCOUNTS, id.as_uuid().as_bytes())
    }

    async fn account_by_number(&self, number: &str) -> Result<Option<Account>> {
        self.get_indexed(CF_ACCOUNTS_BY_NUMBER, number.as_bytes(), CF_ACCOUNTS)
    }

    async fn account_of_user(&self, user: UserId) -> Result<Option<Account>> {
        self.get_indexed(CF_ACCOUNTS_BY_OWNER, user.as_uuid().as_bytes(), CF_ACCOUNTS)
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<TransactionRecord>> {
        self.get_json(CF_TRANSACTIONS, id.as_uuid().as_bytes())
    }

    async fn transactions_for_account(&self, id: AccountId) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(storage_err)?;
            let record: TransactionRecord = from_json(&value)?;
            if record.to == id || record.from == Some(id) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn qr_by_code(&self, code: &str) -> Result<Option<QrPayment>> {
        self.get_indexed(CF_QR_BY_CODE, code.as_bytes(), CF_QR_PAYMENTS)
    }

    async fn account_number_exists(&self, number: &str) -> Result<bool> {
        self.exists(CF_ACCOUNTS_BY_NUMBER, number.as_bytes())
    }

    async fn qr_code_exists(&self, code: &str) -> Result<bool> {
        self.exists(CF_QR_BY_CODE, code.as_bytes())
    }
}

/// A unit of work over [`RocksDbLedger`]: held row guards plus staged
/// writes that land as one `WriteBatch` at commit.
pub struct RocksDbUow {
    store: RocksDbLedger,
    account_guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    qr_guards: HashMap<QrPaymentId, OwnedMutexGuard<()>>,
    users: Vec<UserProfile>,
    accounts: Vec<Account>,
    transactions: Vec<TransactionRecord>,
    qr_payments: Vec<QrPayment>,
}

impl RocksDbUow {
    fn new(store: RocksDbLedger) -> Self {
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
impl LedgerUow for RocksDbUow {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        if !self.account_guards.contains_key(&id) {
            let handle = locks::handle_for(&self.store.account_locks, id).await;
            let guard = locks::acquire(handle, self.store.lock_timeout).await?;
            self.account_guards.insert(id, guard);
        }
        self.store
            .get_json(CF_ACCOUNTS, id.as_uuid().as_bytes())?
            .ok_or(LedgerError::AccountNotFound)
    }

    async fn lock_qr(&mut self, id: QrPaymentId) -> Result<QrPayment> {
        if !self.qr_guards.contains_key(&id) {
            let handle = locks::handle_for(&self.store.qr_locks, id).await;
            let guard = locks::acquire(handle, self.store.lock_timeout).await?;
            self.qr_guards.insert(id, guard);
        }
        self.store
            .get_json(CF_QR_PAYMENTS, id.as_uuid().as_bytes())?
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
        let _gate = store.commit_gate.lock().await;
        let this = *self;

        for tx in &this.transactions {
            let existing: Option<Vec<u8>> = {
                let cf = store.cf(CF_IDEMPOTENCY)?;
                store
                    .db
                    .get_cf(cf, tx.idempotency_key.as_bytes())
                    .map_err(storage_err)?
            };
            if let Some(existing) = existing
                && existing.as_slice() != tx.id.as_uuid().as_bytes().as_slice()
            {
                return Err(LedgerError::DuplicateKey(tx.idempotency_key.clone()));
            }
        }
        for account in &this.accounts {
            let id = account.id.as_uuid().as_bytes();
            let by_number = store.cf(CF_ACCOUNTS_BY_NUMBER)?;
            if let Some(existing) = store
                .db
                .get_cf(by_number, account.number.as_bytes())
                .map_err(storage_err)?
                && existing.as_slice() != id.as_slice()
            {
                return Err(LedgerError::Conflict(format!(
                    "account number {} is taken",
                    account.number
                )));
            }
            let by_owner = store.cf(CF_ACCOUNTS_BY_OWNER)?;
            if let Some(existing) = store
                .db
                .get_cf(by_owner, account.owner.as_uuid().as_bytes())
                .map_err(storage_err)?
                && existing.as_slice() != id.as_slice()
            {
                return Err(LedgerError::Conflict(
                    "user already owns an account".to_string(),
                ));
            }
        }
        for qr in &this.qr_payments {
            let by_code = store.cf(CF_QR_BY_CODE)?;
            if let Some(existing) = store
                .db
                .get_cf(by_code, qr.code.as_bytes())
                .map_err(storage_err)?
                && existing.as_slice() != qr.id.as_uuid().as_bytes().as_slice()
            {
                return Err(LedgerError::Conflict(format!("qr code {} is taken", qr.code)));
            }
        }

        let mut batch = WriteBatch::default();
        for user in &this.users {
            batch.put_cf(store.cf(CF_USERS)?, user.id.as_uuid().as_bytes(), to_json(user)?);
        }
        for account in &this.accounts {
            let id = account.id.as_uuid().as_bytes();
            batch.put_cf(store.cf(CF_ACCOUNTS)?, id, to_json(account)?);
            batch.put_cf(
                store.cf(CF_ACCOUNTS_BY_NUMBER)?,
                account.number.as_bytes(),
                id,
            );
            batch.put_cf(
                store.cf(CF_ACCOUNTS_BY_OWNER)?,
                account.owner.as_uuid().as_bytes(),
                id,
            );
        }
        for tx in &this.transactions {
            let id = tx.id.as_uuid().as_bytes();
            batch.put_cf(store.cf(CF_TRANSACTIONS)?, id, to_json(tx)?);
            batch.put_cf(store.cf(CF_IDEMPOTENCY)?, tx.idempotency_key.as_bytes(), id);
        }
        for qr in &this.qr_payments {
            let id = qr.id.as_uuid().as_bytes();
            batch.put_cf(store.cf(CF_QR_PAYMENTS)?, id, to_json(qr)?);
            batch.put_cf(store.cf(CF_QR_BY_CODE)?, qr.code.as_bytes(), id);
        }
        store.db.write(batch).map_err(storage_err)
    }
}
