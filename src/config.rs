use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable knobs for the ledger engine.
///
/// Everything has a sensible default; embedders override fields as needed
/// (the struct round-trips through serde for file-based configuration).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long an issued QR payment stays redeemable, in seconds.
    pub qr_validity_secs: i64,
    /// Upper bound on waiting for a row lock before giving up, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Attempts at generating a unique account number or QR code before
    /// the operation fails loudly.
    pub keygen_attempts: u32,
    /// Bank code prefixed to generated account numbers.
    pub bank_code: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            qr_validity_secs: 600,
            lock_timeout_ms: 5_000,
            keygen_attempts: 5,
            bank_code: "110".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn qr_validity(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.qr_validity_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
