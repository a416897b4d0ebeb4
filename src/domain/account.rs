use crate::domain::money::{Amount, Balance};
use crate::domain::user::UserId;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct AccountId(Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
}

/// A ledger account: one row of balance-bearing state.
///
/// Both balance-mutating methods require the account to be `Active`; a
/// `Frozen` account rejects credits and debits alike.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Account {
    pub id: AccountId,
    /// Human-facing routing number, unique across the ledger.
    pub number: String,
    pub owner: UserId,
    pub balance: Balance,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Opens a fresh account with a zero balance in the `Active` state.
    pub fn open(owner: UserId, number: String) -> Self {
        Self {
            id: AccountId::new(),
            number,
            owner,
            balance: Balance::ZERO,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Adds funds. Never overdraw-checked, but still refused on a frozen row.
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if !self.is_active() {
            return Err(LedgerError::AccountInactive);
        }
        self.balance += amount;
        Ok(())
    }

    /// Removes funds if the balance covers the amount.
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        if !self.is_active() {
            return Err(LedgerError::AccountInactive);
        }
        if !self.balance.covers(amount) {
            return Err(LedgerError::InsufficientFunds {
                balance: self.balance.value(),
                requested: amount.value(),
            });
        }
        self.balance -= amount;
        Ok(())
    }

    pub fn freeze(&mut self) -> Result<(), LedgerError> {
        if self.status == AccountStatus::Frozen {
            return Err(LedgerError::InvalidState(
                "account is already frozen".to_string(),
            ));
        }
        self.status = AccountStatus::Frozen;
        Ok(())
    }

    pub fn activate(&mut self) -> Result<(), LedgerError> {
        if self.status == AccountStatus::Active {
            return Err(LedgerError::InvalidState(
                "account is already active".to_string(),
            ));
        }
        self.status = AccountStatus::Active;
        Ok(())
    }
}
