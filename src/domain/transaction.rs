use crate::domain::account::AccountId;
use crate::domain::money::Amount;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Transfer,
    QrPayment,
    /// Recognized on records for forward compatibility; no scheduler runs here.
    ScheduledTransfer,
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Transfer => "transfer",
            TransactionKind::QrPayment => "qr payment",
            TransactionKind::ScheduledTransfer => "scheduled transfer",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

/// One audited money movement.
///
/// A record opens `Pending`, and moves exactly once to `Completed` or
/// `Failed`. Failure is data: the record survives with a human-readable
/// reason even though the balance mutations it described were rolled back.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionRecord {
    pub id: TransactionId,
    /// Caller-supplied (or generated) key; at most one record per key.
    pub idempotency_key: String,
    /// Source leg. `None` for deposits, which create money from outside.
    pub from: Option<AccountId>,
    pub to: AccountId,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    pub fn open(
        kind: TransactionKind,
        from: Option<AccountId>,
        to: AccountId,
        amount: Amount,
        description: Option<String>,
        idempotency_key: String,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            idempotency_key,
            from,
            to,
            amount,
            kind,
            status: TransactionStatus::Pending,
            description,
            failure_reason: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Marks the movement as applied. Only legal from `Pending`.
    pub fn complete(&mut self) -> Result<(), LedgerError> {
        if !self.is_pending() {
            return Err(LedgerError::InvalidState(format!(
                "transaction {} is already {:?}",
                self.id, self.status
            )));
        }
        self.status = TransactionStatus::Completed;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Marks the movement as failed, keeping the reason for the audit trail.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), LedgerError> {
        if !self.is_pending() {
            return Err(LedgerError::InvalidState(format!(
                "transaction {} is already {:?}",
                self.id, self.status
            )));
        }
        self.status = TransactionStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
