use crate::domain::account::{Account, AccountId};
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{CredentialVerifierRef, LedgerStoreRef, LedgerUow, NotifierRef};
use crate::domain::qr::QrPayment;
use crate::domain::transaction::{
    TransactionId, TransactionKind, TransactionRecord, TransactionStatus,
};
use crate::domain::user::{UserId, UserProfile};
use crate::error::{LedgerError, Result};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// What a settlement entry point hands back: the audit row's identity and
/// the initiator's balance after the movement.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementReceipt {
    pub transaction: TransactionId,
    pub status: TransactionStatus,
    pub balance: Balance,
}

/// Internal description of one two-leg settlement, shared by peer
/// transfers and QR redemptions.
pub(crate) struct TwoLegRequest {
    pub initiator: UserId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
    /// Plaintext the initiator presented, checked against `stored_hash`
    /// under the account locks.
    pub presented_credential: String,
    pub stored_hash: String,
    /// A locked, still-pending QR payment to complete atomically with the
    /// settlement.
    pub qr: Option<QrPayment>,
}

/// Owns the only code path that moves money.
///
/// Every entry point follows the same discipline: resolve and validate,
/// lock the touched account rows (ascending id order), re-check balances
/// and status under the locks, open the audit record, mutate, and commit
/// everything in one unit of work. A failure after the record opens rolls
/// the movement back but persists the record as `Failed` in a fresh unit
/// of work. Notifications go out only after commit and never affect the
/// outcome.
pub struct SettlementCoordinator {
    store: LedgerStoreRef,
    verifier: CredentialVerifierRef,
    notifier: NotifierRef,
}

impl SettlementCoordinator {
    pub fn new(store: LedgerStoreRef, verifier: CredentialVerifierRef, notifier: NotifierRef) -> Self {
        Self {
            store,
            verifier,
            notifier,
        }
    }

    /// Credits the caller's own account from an external source.
    ///
    /// Verified with the secondary ("simple") credential. The deposit has
    /// no source leg; money enters the ledger here.
    pub async fn self_deposit(
        &self,
        user: UserId,
        amount: Amount,
        description: Option<String>,
        simple_password: &str,
        idempotency_key: Option<String>,
    ) -> Result<SettlementReceipt> {
        let profile = self.profile(user).await?;
        self.check_credential(simple_password, &profile.simple_password_hash)?;
        let target = self
            .store
            .account_of_user(user)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        let mut uow = self.store.begin().await?;
        let mut account = uow.lock_account(target.id).await?;
        if !account.is_active() {
            return Err(LedgerError::AccountInactive);
        }

        let record = TransactionRecord::open(
            TransactionKind::Deposit,
            None,
            account.id,
            amount,
            description,
            Self::key_or_random(idempotency_key),
        );
        tracing::debug!(transaction = %record.id, account = %account.id, %amount, "deposit opened");

        if let Err(e) = account.credit(amount) {
            return Err(self.abort(uow, record, user, e).await);
        }

        let balance = account.balance;
        let record = self
            .commit_completed(uow, record, vec![account], None, user)
            .await?;
        self.dispatch(&[user], &record).await;
        Ok(SettlementReceipt {
            transaction: record.id,
            status: record.status,
            balance,
        })
    }

    /// Moves funds from the caller's account to the account with routing
    /// number `to_number`. Verified with the secondary credential.
    pub async fn transfer(
        &self,
        user: UserId,
        to_number: &str,
        amount: Amount,
        description: Option<String>,
        simple_password: &str,
        idempotency_key: Option<String>,
    ) -> Result<SettlementReceipt> {
        let profile = self.profile(user).await?;
        let source = self
            .store
            .account_of_user(user)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;
        let dest = self
            .store
            .account_by_number(to_number)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        let uow = self.store.begin().await?;
        self.settle_two_leg(
            uow,
            TwoLegRequest {
                initiator: user,
                from: source.id,
                to: dest.id,
                amount,
                kind: TransactionKind::Transfer,
                description,
                idempotency_key,
                presented_credential: simple_password.to_string(),
                stored_hash: profile.simple_password_hash,
                qr: None,
            },
        )
        .await
    }

    /// The shared debit-one-credit-the-other path.
    ///
    /// Takes an already-begun unit of work so a caller can lock other rows
    /// first (QR redemption locks the payment row before any account).
    pub(crate) async fn settle_two_leg(
        &self,
        mut uow: Box<dyn LedgerUow>,
        req: TwoLegRequest,
    ) -> Result<SettlementReceipt> {
        // Total lock order by ascending account id, so opposite-direction
        // settlements over the same pair cannot deadlock.
        let mut ids = vec![req.from, req.to];
        ids.sort();
        ids.dedup();
        let mut rows: HashMap<AccountId, Account> = HashMap::new();
        for id in ids {
            let account = uow.lock_account(id).await?;
            rows.insert(id, account);
        }
        if req.from == req.to {
            return Err(LedgerError::SelfTargetNotAllowed);
        }
        let mut source = rows.remove(&req.from).ok_or(LedgerError::AccountNotFound)?;
        let mut dest = rows.remove(&req.to).ok_or(LedgerError::AccountNotFound)?;

        self.check_credential(&req.presented_credential, &req.stored_hash)?;
        if !source.is_active() || !dest.is_active() {
            return Err(LedgerError::AccountInactive);
        }
        // Checked here even though entry points may have pre-checked: only
        // the read under the lock is authoritative.
        if !source.balance.covers(req.amount) {
            return Err(LedgerError::InsufficientFunds {
                balance: source.balance.value(),
                requested: req.amount.value(),
            });
        }

        let record = TransactionRecord::open(
            req.kind,
            Some(source.id),
            dest.id,
            req.amount,
            req.description,
            Self::key_or_random(req.idempotency_key),
        );
        tracing::debug!(
            transaction = %record.id,
            from = %source.id,
            to = %dest.id,
            amount = %req.amount,
            kind = req.kind.label(),
            "settlement opened"
        );

        if let Err(e) = source.debit(req.amount).and_then(|()| dest.credit(req.amount)) {
            return Err(self.abort(uow, record, req.initiator, e).await);
        }

        let balance = source.balance;
        let involved = [source.owner, dest.owner];
        let record = self
            .commit_completed(uow, record, vec![source, dest], req.qr, req.initiator)
            .await?;
        self.dispatch(&involved, &record).await;
        Ok(SettlementReceipt {
            transaction: record.id,
            status: record.status,
            balance,
        })
    }

    /// Completes the record, stages every touched row, and commits.
    /// Commit failures (other than a duplicate idempotency key) persist
    /// the record as `Failed`.
    async fn commit_completed(
        &self,
        mut uow: Box<dyn LedgerUow>,
        record: TransactionRecord,
        accounts: Vec<Account>,
        qr: Option<QrPayment>,
        initiator: UserId,
    ) -> Result<TransactionRecord> {
        let pending = record.clone();
        let mut record = record;
        if let Some(mut qr) = qr {
            if let Err(e) = qr.complete(record.id) {
                return Err(self.abort(uow, pending, initiator, e).await);
            }
            uow.put_qr(qr);
        }
        record.complete()?;
        for account in accounts {
            uow.put_account(account);
        }
        uow.put_transaction(record.clone());
        match uow.commit().await {
            Ok(()) => Ok(record),
            // The key's original attempt owns the audit row; a duplicate
            // surfaces as-is without writing another record.
            Err(e @ LedgerError::DuplicateKey(_)) => Err(e),
            Err(e) => {
                let failed = self.persist_failure(pending, &e).await;
                self.dispatch(&[initiator], &failed).await;
                Err(e)
            }
        }
    }

    /// Rolls back an in-flight settlement and records it as `Failed`.
    /// Returns the triggering error so callers can `return Err(...)` it.
    async fn abort(
        &self,
        uow: Box<dyn LedgerUow>,
        record: TransactionRecord,
        initiator: UserId,
        error: LedgerError,
    ) -> LedgerError {
        // Dropping the unit of work is the rollback: staged writes are
        // discarded and row locks released before the failure row commits.
        drop(uow);
        let record = self.persist_failure(record, &error).await;
        self.dispatch(&[initiator], &record).await;
        error
    }

    /// Persists a `Failed` record in a fresh unit of work. Never propagates:
    /// the caller is already unwinding with the primary error.
    async fn persist_failure(
        &self,
        mut record: TransactionRecord,
        reason: &LedgerError,
    ) -> TransactionRecord {
        if let Err(e) = record.fail(reason.audit_reason()) {
            tracing::error!(transaction = %record.id, error = %e, "could not mark settlement failed");
            return record;
        }
        match self.store.begin().await {
            Ok(mut failure_uow) => {
                failure_uow.put_transaction(record.clone());
                if let Err(e) = failure_uow.commit().await {
                    tracing::error!(
                        transaction = %record.id,
                        error = %e,
                        "failed settlement record was not persisted"
                    );
                }
            }
            Err(e) => tracing::error!(
                transaction = %record.id,
                error = %e,
                "failed settlement record was not persisted"
            ),
        }
        record
    }

    /// Best-effort post-commit notification fan-out.
    async fn dispatch(&self, users: &[UserId], record: &TransactionRecord) {
        for user in users {
            if let Err(e) = self.notifier.notify(*user, record).await {
                tracing::warn!(
                    user = %user,
                    transaction = %record.id,
                    error = %e,
                    "notification dropped"
                );
            }
        }
    }

    async fn profile(&self, user: UserId) -> Result<UserProfile> {
        self.store
            .user(user)
            .await?
            .ok_or(LedgerError::UserNotFound)
    }

    fn check_credential(&self, presented: &str, stored_hash: &str) -> Result<()> {
        if self.verifier.matches(presented, stored_hash) {
            Ok(())
        } else {
            Err(LedgerError::CredentialMismatch)
        }
    }

    fn key_or_random(key: Option<String>) -> String {
        key.unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
