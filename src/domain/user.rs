use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The slice of an account owner the ledger needs: a display name and the
/// two stored credential hashes. Authentication proper (sessions, tokens)
/// lives outside this crate; only hash verification happens here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    /// Primary password hash, checked for QR redemption and account unlock.
    pub password_hash: String,
    /// Secondary ("simple") credential hash, checked for deposits and transfers.
    pub simple_password_hash: String,
    pub active: bool,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, password_hash: String, simple_password_hash: String) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            password_hash,
            simple_password_hash,
            active: true,
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }
}
