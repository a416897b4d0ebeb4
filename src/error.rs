use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failure taxonomy for ledger and settlement operations.
///
/// Every settlement entry point fails with one of these; callers can match
/// on the variant to distinguish retryable conditions (e.g. `LockTimeout`)
/// from terminal ones (e.g. `AlreadyUsed`).
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("account not found")]
    AccountNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("qr payment not found")]
    QrNotFound,
    #[error("invalid state transition: {0}")]
    InvalidState(String),
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },
    #[error("account is not active")]
    AccountInactive,
    #[error("credential mismatch")]
    CredentialMismatch,
    #[error("duplicate idempotency key: {0}")]
    DuplicateKey(String),
    #[error("uniqueness conflict: {0}")]
    Conflict(String),
    #[error("qr payment expired")]
    Expired,
    #[error("qr payment already used or cancelled")]
    AlreadyUsed,
    #[error("source and destination account are the same")]
    SelfTargetNotAllowed,
    #[error("amount must be positive")]
    NonPositiveAmount,
    #[error("timed out waiting for a row lock")]
    LockTimeout,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Reason text recorded on a failed transaction row.
    pub fn audit_reason(&self) -> String {
        self.to_string()
    }
}
