use super::account::{Account, AccountId};
use super::qr::{QrPayment, QrPaymentId};
use super::transaction::{TransactionId, TransactionRecord};
use super::user::{UserId, UserProfile};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage contract for the ledger.
///
/// Reads on this trait see committed state only. All mutation goes through
/// a [`LedgerUow`] obtained from [`LedgerStore::begin`], which is where row
/// locking and atomicity live.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Starts a unit of work. Writes staged on it become visible only at
    /// commit, all together or not at all.
    async fn begin(&self) -> Result<Box<dyn LedgerUow>>;

    async fn user(&self, id: UserId) -> Result<Option<UserProfile>>;
    async fn account(&self, id: AccountId) -> Result<Option<Account>>;
    async fn account_by_number(&self, number: &str) -> Result<Option<Account>>;
    /// The single account owned by `user`, if any.
    async fn account_of_user(&self, user: UserId) -> Result<Option<Account>>;
    async fn transaction(&self, id: TransactionId) -> Result<Option<TransactionRecord>>;
    /// Every record touching the account as either leg, most recent first.
    async fn transactions_for_account(&self, id: AccountId) -> Result<Vec<TransactionRecord>>;
    async fn qr_by_code(&self, code: &str) -> Result<Option<QrPayment>>;
    async fn account_number_exists(&self, number: &str) -> Result<bool>;
    async fn qr_code_exists(&self, code: &str) -> Result<bool>;
}

/// One atomic mutation scope.
///
/// `lock_*` methods take an exclusive row lock (blocking other units of
/// work on the same row, bounded by the store's lock timeout) and return
/// the freshest committed state, the moral equivalent of
/// `SELECT ... FOR UPDATE`. Staged `put_*` calls are buffered; `commit`
/// validates uniqueness constraints (idempotency keys, account numbers,
/// QR codes) and applies everything atomically.
///
/// Dropping an uncommitted unit of work is rollback: staged writes are
/// discarded and row locks released.
#[async_trait]
pub trait LedgerUow: Send {
    /// Exclusive-locks the account row and returns its current state.
    /// Fails with `LockTimeout` when the row stays contended too long.
    async fn lock_account(&mut self, id: AccountId) -> Result<Account>;

    /// Exclusive-locks a QR payment row, same semantics as `lock_account`.
    async fn lock_qr(&mut self, id: QrPaymentId) -> Result<QrPayment>;

    fn put_user(&mut self, user: UserProfile);
    fn put_account(&mut self, account: Account);
    fn put_transaction(&mut self, transaction: TransactionRecord);
    fn put_qr(&mut self, qr: QrPayment);

    async fn commit(self: Box<Self>) -> Result<()>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;

/// Checks a presented plaintext credential against a stored hash.
/// Synchronous and infallible: any parse or verify problem reads as a
/// mismatch.
pub trait CredentialVerifier: Send + Sync {
    fn matches(&self, plaintext: &str, stored_hash: &str) -> bool;
}

pub type CredentialVerifierRef = Arc<dyn CredentialVerifier>;

/// Post-commit settlement hook. Implementations must tolerate being called
/// after the money has already moved; errors are logged and dropped by the
/// caller, never propagated into the settlement result.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user: UserId, record: &TransactionRecord) -> Result<()>;
}

pub type NotifierRef = Arc<dyn Notifier>;
