use crate::config::LedgerConfig;
use crate::domain::account::Account;
use crate::domain::ports::{CredentialVerifierRef, LedgerStoreRef};
use crate::domain::transaction::TransactionRecord;
use crate::domain::user::{UserId, UserProfile};
use crate::error::{LedgerError, Result};
use rand::Rng;
use serde::Serialize;

/// What a counterparty may learn about an account before transferring to
/// it: the number they typed and the owner's display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOwner {
    pub number: String,
    pub name: String,
}

/// Account lifecycle and read operations: opening, the owner-facing
/// freeze/unfreeze switch, owner deactivation, and history reads.
///
/// Nothing here moves money; balance mutations are the settlement
/// coordinator's monopoly.
pub struct AccountService {
    store: LedgerStoreRef,
    verifier: CredentialVerifierRef,
    config: LedgerConfig,
}

fn mint_account_number(bank_code: &str) -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..10)
        .map(|_| char::from(b'0' + rng.gen_range(0..=9u8)))
        .collect();
    format!("{bank_code}-{digits}")
}

impl AccountService {
    pub fn new(store: LedgerStoreRef, verifier: CredentialVerifierRef, config: LedgerConfig) -> Self {
        Self {
            store,
            verifier,
            config,
        }
    }

    /// Creates an owner profile plus their single account, with a freshly
    /// minted unique account number.
    ///
    /// Credential hashing happens at the caller; this service only stores
    /// the hashes. Number collisions are retried a bounded number of
    /// times, then surface as a `Conflict` rather than looping forever.
    pub async fn open_account(
        &self,
        name: &str,
        password_hash: String,
        simple_password_hash: String,
    ) -> Result<(UserProfile, Account)> {
        let profile = UserProfile::new(name, password_hash, simple_password_hash);
        for _ in 0..self.config.keygen_attempts {
            let number = mint_account_number(&self.config.bank_code);
            if self.store.account_number_exists(&number).await? {
                continue;
            }
            let account = Account::open(profile.id, number);
            let mut uow = self.store.begin().await?;
            uow.put_user(profile.clone());
            uow.put_account(account.clone());
            match uow.commit().await {
                Ok(()) => {
                    tracing::info!(user = %profile.id, number = %account.number, "account opened");
                    return Ok((profile, account));
                }
                // Another opener landed the same number first; mint again.
                Err(LedgerError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(LedgerError::Conflict(
            "account number generation exhausted its attempts".to_string(),
        ))
    }

    /// Freezes the caller's account, stopping all money movement. No
    /// credential required: locking down is always allowed.
    pub async fn lock_account(&self, user: UserId) -> Result<Account> {
        let account = self.transition(user, Account::freeze).await?;
        tracing::info!(user = %user, account = %account.id, "account frozen");
        Ok(account)
    }

    /// Reverses a freeze. Requires the primary password.
    pub async fn unlock_account(&self, user: UserId, password: &str) -> Result<Account> {
        let profile = self.profile(user).await?;
        if !self.verifier.matches(password, &profile.password_hash) {
            return Err(LedgerError::CredentialMismatch);
        }
        let account = self.transition(user, Account::activate).await?;
        tracing::info!(user = %user, account = %account.id, "account unfrozen");
        Ok(account)
    }

    /// Closes out an owner: verifies the primary password, freezes the
    /// account (an already-frozen one stays frozen), and deactivates the
    /// profile, all in one unit of work.
    pub async fn deactivate_owner(&self, user: UserId, password: &str) -> Result<()> {
        let mut profile = self.profile(user).await?;
        if !self.verifier.matches(password, &profile.password_hash) {
            return Err(LedgerError::CredentialMismatch);
        }
        let target = self
            .store
            .account_of_user(user)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        let mut uow = self.store.begin().await?;
        let mut account = uow.lock_account(target.id).await?;
        if account.is_active() {
            account.freeze()?;
        }
        profile.deactivate();
        uow.put_account(account);
        uow.put_user(profile);
        uow.commit().await?;
        tracing::info!(user = %user, "owner deactivated");
        Ok(())
    }

    pub async fn account_of(&self, user: UserId) -> Result<Account> {
        self.store
            .account_of_user(user)
            .await?
            .ok_or(LedgerError::AccountNotFound)
    }

    /// Whether the caller's account is currently frozen.
    pub async fn is_frozen(&self, user: UserId) -> Result<bool> {
        Ok(!self.account_of(user).await?.is_active())
    }

    /// Pre-transfer lookup: resolves an account number to its owner's
    /// display name so the sender can confirm the destination.
    pub async fn owner_of(&self, number: &str) -> Result<AccountOwner> {
        let account = self
            .store
            .account_by_number(number)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;
        let profile = self
            .store
            .user(account.owner)
            .await?
            .ok_or(LedgerError::UserNotFound)?;
        Ok(AccountOwner {
            number: account.number,
            name: profile.name,
        })
    }

    /// The caller's settlement history, most recent first.
    pub async fn history(&self, user: UserId) -> Result<Vec<TransactionRecord>> {
        let account = self.account_of(user).await?;
        self.store.transactions_for_account(account.id).await
    }

    /// Applies a status transition under the account's row lock.
    async fn transition<F>(&self, user: UserId, apply: F) -> Result<Account>
    where
        F: FnOnce(&mut Account) -> Result<()>,
    {
        let target = self
            .store
            .account_of_user(user)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;
        let mut uow = self.store.begin().await?;
        let mut account = uow.lock_account(target.id).await?;
        apply(&mut account)?;
        uow.put_account(account.clone());
        uow.commit().await?;
        Ok(account)
    }

    async fn profile(&self, user: UserId) -> Result<UserProfile> {
        self.store
            .user(user)
            .await?
            .ok_or(LedgerError::UserNotFound)
    }
}
