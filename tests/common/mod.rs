#![allow(dead_code)]

use async_trait::async_trait;
use corebank::application::accounts::AccountService;
use corebank::application::qr::QrPaymentRegistry;
use corebank::application::settlement::SettlementCoordinator;
use corebank::config::LedgerConfig;
use corebank::domain::account::{Account, AccountId};
use corebank::domain::money::Amount;
use corebank::domain::ports::{LedgerStore, LedgerStoreRef, LedgerUow, Notifier, NotifierRef};
use corebank::domain::qr::{QrPayment, QrPaymentId};
use corebank::domain::transaction::{TransactionId, TransactionRecord, TransactionStatus};
use corebank::domain::user::{UserId, UserProfile};
use corebank::error::{LedgerError, Result};
use corebank::infrastructure::credentials::{Argon2Verifier, hash_credential};
use corebank::infrastructure::in_memory::InMemoryLedger;
use corebank::infrastructure::notify::TracingNotifier;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

pub const PASSWORD: &str = "hunter2";
pub const PIN: &str = "0000";

// Argon2 hashing is intentionally slow; every test user shares the same
// two credentials, so hash each of them once per process.
fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_credential(PASSWORD).unwrap())
        .clone()
}

fn pin_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_credential(PIN).unwrap()).clone()
}

pub struct TestBank {
    pub store: LedgerStoreRef,
    pub accounts: AccountService,
    pub settlement: Arc<SettlementCoordinator>,
    pub qr: Arc<QrPaymentRegistry>,
}

pub fn bank() -> TestBank {
    bank_on(Arc::new(InMemoryLedger::new()))
}

/// Bank with a generous lock timeout, for tests that pile many tasks onto
/// the same rows and only care that they all finish.
pub fn patient_bank() -> TestBank {
    bank_on(Arc::new(InMemoryLedger::with_lock_timeout(
        std::time::Duration::from_secs(30),
    )))
}

pub fn bank_on(store: LedgerStoreRef) -> TestBank {
    bank_with_notifier(store, Arc::new(TracingNotifier))
}

/// Bank whose notifier rejects every dispatch.
pub fn bank_with_failing_notifier() -> TestBank {
    bank_with_notifier(Arc::new(InMemoryLedger::new()), Arc::new(FailingNotifier))
}

/// Bank that records every notification dispatch for later assertions.
pub fn bank_with_recording_notifier() -> (TestBank, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let bank = bank_with_notifier(Arc::new(InMemoryLedger::new()), notifier.clone());
    (bank, notifier)
}

pub fn bank_with_notifier(store: LedgerStoreRef, notifier: NotifierRef) -> TestBank {
    let config = LedgerConfig::default();
    let verifier = Arc::new(Argon2Verifier);
    let accounts = AccountService::new(store.clone(), verifier.clone(), config.clone());
    let settlement = Arc::new(SettlementCoordinator::new(store.clone(), verifier, notifier));
    let qr = Arc::new(QrPaymentRegistry::new(store.clone(), settlement.clone(), config));
    TestBank {
        store,
        accounts,
        settlement,
        qr,
    }
}

impl TestBank {
    pub async fn open_user(&self, name: &str) -> (UserId, Account) {
        let (profile, account) = self
            .accounts
            .open_account(name, password_hash(), pin_hash())
            .await
            .unwrap();
        (profile.id, account)
    }

    /// Opens an account and funds it through the deposit path.
    pub async fn open_funded(&self, name: &str, amount: Decimal) -> (UserId, Account) {
        let (user, _) = self.open_user(name).await;
        self.settlement
            .self_deposit(user, Amount::new(amount).unwrap(), None, PIN, None)
            .await
            .unwrap();
        let account = self.accounts.account_of(user).await.unwrap();
        (user, account)
    }

    pub async fn balance_of(&self, user: UserId) -> Decimal {
        self.accounts.account_of(user).await.unwrap().balance.0
    }

    pub async fn history_of(&self, user: UserId) -> Vec<TransactionRecord> {
        self.accounts.history(user).await.unwrap()
    }
}

/// Notifier whose every dispatch fails, for checking that settlement
/// outcomes never depend on notification delivery.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _user: UserId, _record: &TransactionRecord) -> Result<()> {
        Err(LedgerError::Storage("notifier outage".to_string()))
    }
}

/// Notifier that keeps a log of who was told about which outcome.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(UserId, TransactionId, TransactionStatus)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(UserId, TransactionId, TransactionStatus)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user: UserId, record: &TransactionRecord) -> Result<()> {
        self.calls.lock().unwrap().push((user, record.id, record.status));
        Ok(())
    }
}

/// In-memory store that fails the next unit-of-work commit with a storage
/// error when armed. Later units of work (such as the failure audit write)
/// go through untouched.
pub struct FlakyStore {
    inner: InMemoryLedger,
    fuse: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryLedger::new(),
            fuse: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The next commit on any unit of work fails once.
    pub fn arm(&self) {
        self.fuse.store(true, Ordering::SeqCst);
    }
}

pub fn flaky_bank() -> (TestBank, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new());
    (bank_on(store.clone()), store)
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUow>> {
        let inner = self.inner.begin().await?;
        Ok(Box::new(FlakyUow {
            inner,
            fuse: self.fuse.clone(),
        }))
    }

    async fn user(&self, id: UserId) -> Result<Option<UserProfile>> {
        self.inner.user(id).await
    }

    async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        self.inner.account(id).await
    }

    async fn account_by_number(&self, number: &str) -> Result<Option<Account>> {
        self.inner.account_by_number(number).await
    }

    async fn account_of_user(&self, user: UserId) -> Result<Option<Account>> {
        self.inner.account_of_user(user).await
    }

    async fn transaction(&self, id: TransactionId) -> Result<Option<TransactionRecord>> {
        self.inner.transaction(id).await
    }

    async fn transactions_for_account(&self, id: AccountId) -> Result<Vec<TransactionRecord>> {
        self.inner.transactions_for_account(id).await
    }

    async fn qr_by_code(&self, code: &str) -> Result<Option<QrPayment>> {
        self.inner.qr_by_code(code).await
    }

    async fn account_number_exists(&self, number: &str) -> Result<bool> {
        self.inner.account_number_exists(number).await
    }

    async fn qr_code_exists(&self, code: &str) -> Result<bool> {
        self.inner.qr_code_exists(code).await
    }
}

struct FlakyUow {
    inner: Box<dyn LedgerUow>,
    fuse: Arc<AtomicBool>,
}

#[async_trait]
impl LedgerUow for FlakyUow {
    async fn lock_account(&mut self, id: AccountId) -> Result<Account> {
        self.inner.lock_account(id).await
    }

    async fn lock_qr(&mut self, id: QrPaymentId) -> Result<QrPayment> {
        self.inner.lock_qr(id).await
    }

    fn put_user(&mut self, user: UserProfile) {
        self.inner.put_user(user);
    }

    fn put_account(&mut self, account: Account) {
        self.inner.put_account(account);
    }

    fn put_transaction(&mut self, transaction: TransactionRecord) {
        self.inner.put_transaction(transaction);
    }

    fn put_qr(&mut self, qr: QrPayment) {
        self.inner.put_qr(qr);
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if this.fuse.swap(false, Ordering::SeqCst) {
            // Dropping the inner unit of work discards its staged writes,
            // the same shape as a storage-level commit failure.
            return Err(LedgerError::Storage("injected commit failure".to_string()));
        }
        this.inner.commit().await
    }
}
