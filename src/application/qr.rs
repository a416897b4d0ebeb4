use crate::application::settlement::{SettlementCoordinator, SettlementReceipt, TwoLegRequest};
use crate::config::LedgerConfig;
use crate::domain::money::Amount;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::qr::QrPayment;
use crate::domain::transaction::TransactionKind;
use crate::domain::user::UserId;
use crate::error::{LedgerError, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;

/// Issues, redeems, and voids QR payment requests.
///
/// Redemption is exactly-once: the payment row is locked for update before
/// any account row, so a concurrent second redeem waits and then sees the
/// terminal status. The actual money movement is delegated to the
/// settlement path shared with peer transfers.
pub struct QrPaymentRegistry {
    store: LedgerStoreRef,
    settlement: Arc<SettlementCoordinator>,
    config: LedgerConfig,
}

fn mint_code(now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("QR_{}_{:08x}", now.format("%Y%m%d"), suffix)
}

impl QrPaymentRegistry {
    pub fn new(
        store: LedgerStoreRef,
        settlement: Arc<SettlementCoordinator>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            settlement,
            config,
        }
    }

    /// Mints a unique code and persists a PENDING payment for the seller's
    /// account, valid for the configured window.
    pub async fn generate(
        &self,
        seller: UserId,
        amount: Amount,
        description: Option<String>,
    ) -> Result<QrPayment> {
        let account = self
            .store
            .account_of_user(seller)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        for _ in 0..self.config.keygen_attempts {
            let now = Utc::now();
            let code = mint_code(now);
            if self.store.qr_code_exists(&code).await? {
                continue;
            }
            let qr = QrPayment::issue(
                account.id,
                amount,
                description.clone(),
                code,
                now,
                self.config.qr_validity(),
            );
            let mut uow = self.store.begin().await?;
            uow.put_qr(qr.clone());
            match uow.commit().await {
                Ok(()) => {
                    tracing::debug!(qr = %qr.id, code = %qr.code, %amount, "qr payment issued");
                    return Ok(qr);
                }
                // Lost a race on the code; next attempt mints a fresh one.
                Err(LedgerError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LedgerError::Conflict(
            "qr code generation exhausted its attempts".to_string(),
        ))
    }

    /// Pays the seller from the buyer's account, completing the payment
    /// row and the settlement in one atomic unit of work.
    ///
    /// Verified with the buyer's primary password. Expiry is applied
    /// lazily here: a stale PENDING row is persisted as EXPIRED before the
    /// attempt fails.
    pub async fn redeem(
        &self,
        buyer: UserId,
        code: &str,
        password: &str,
        idempotency_key: Option<String>,
    ) -> Result<SettlementReceipt> {
        let profile = self
            .store
            .user(buyer)
            .await?
            .ok_or(LedgerError::UserNotFound)?;
        let found = self
            .store
            .qr_by_code(code)
            .await?
            .ok_or(LedgerError::QrNotFound)?;

        let mut uow = self.store.begin().await?;
        // Payment row first, account rows after: redeem and cancel agree
        // on this order, so the two lock classes cannot form a cycle.
        let qr = uow.lock_qr(found.id).await?;
        if !qr.is_pending() {
            return Err(LedgerError::AlreadyUsed);
        }
        if qr.is_expired_at(Utc::now()) {
            let mut expired = qr;
            expired.expire()?;
            uow.put_qr(expired);
            uow.commit().await?;
            return Err(LedgerError::Expired);
        }

        let buyer_account = self
            .store
            .account_of_user(buyer)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        let request = TwoLegRequest {
            initiator: buyer,
            from: buyer_account.id,
            to: qr.seller_account,
            amount: qr.amount,
            kind: TransactionKind::QrPayment,
            description: qr.description.clone(),
            idempotency_key,
            presented_credential: password.to_string(),
            stored_hash: profile.password_hash,
            qr: Some(qr),
        };
        self.settlement.settle_two_leg(uow, request).await
    }

    /// Voids a still-pending payment. Only the seller who issued it may
    /// cancel; anyone else sees the payment as nonexistent.
    pub async fn cancel(&self, seller: UserId, code: &str) -> Result<QrPayment> {
        let found = self
            .store
            .qr_by_code(code)
            .await?
            .ok_or(LedgerError::QrNotFound)?;
        let account = self
            .store
            .account(found.seller_account)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;
        if account.owner != seller {
            return Err(LedgerError::QrNotFound);
        }

        let mut uow = self.store.begin().await?;
        let mut qr = uow.lock_qr(found.id).await?;
        qr.cancel()?;
        uow.put_qr(qr.clone());
        uow.commit().await?;
        tracing::debug!(qr = %qr.id, code = %qr.code, "qr payment cancelled");
        Ok(qr)
    }

    /// Status polling read; returns the row as stored. Expiry only lands
    /// on the row when a redeem attempt touches it.
    pub async fn get(&self, code: &str) -> Result<QrPayment> {
        self.store
            .qr_by_code(code)
            .await?
            .ok_or(LedgerError::QrNotFound)
    }
}
