use crate::domain::account::AccountId;
use crate::domain::money::Amount;
use crate::domain::transaction::TransactionId;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct QrPaymentId(Uuid);

impl QrPaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for QrPaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum QrStatus {
    Pending,
    Completed,
    Expired,
    Cancelled,
}

/// A payment request a seller shows as a QR code.
///
/// Redeemable exactly once while `Pending` and unexpired; every other
/// status is terminal. Expiry is lazy: nothing flips the row at the
/// deadline, the first touch after it does.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct QrPayment {
    pub id: QrPaymentId,
    /// Token encoded in the QR image, unique across the ledger.
    pub code: String,
    pub seller_account: AccountId,
    pub amount: Amount,
    pub description: Option<String>,
    pub status: QrStatus,
    /// Set when redeemed; links the payment to its settlement record.
    pub transaction: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QrPayment {
    /// Issues a pending payment valid for `validity` from `issued_at`.
    pub fn issue(
        seller_account: AccountId,
        amount: Amount,
        description: Option<String>,
        code: String,
        issued_at: DateTime<Utc>,
        validity: chrono::Duration,
    ) -> Self {
        Self {
            id: QrPaymentId::new(),
            code,
            seller_account,
            amount,
            description,
            status: QrStatus::Pending,
            transaction: None,
            created_at: issued_at,
            expires_at: issued_at + validity,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == QrStatus::Pending
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn complete(&mut self, transaction: TransactionId) -> Result<(), LedgerError> {
        if !self.is_pending() {
            return Err(LedgerError::AlreadyUsed);
        }
        self.status = QrStatus::Completed;
        self.transaction = Some(transaction);
        Ok(())
    }

    pub fn expire(&mut self) -> Result<(), LedgerError> {
        if !self.is_pending() {
            return Err(LedgerError::AlreadyUsed);
        }
        self.status = QrStatus::Expired;
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), LedgerError> {
        if !self.is_pending() {
            return Err(LedgerError::AlreadyUsed);
        }
        self.status = QrStatus::Cancelled;
        Ok(())
    }
}
