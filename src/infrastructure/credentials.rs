use crate::domain::ports::CredentialVerifier;
use crate::error::{LedgerError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Argon2id credential verification against PHC-format stored hashes.
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn matches(&self, plaintext: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Hashes a plaintext credential for storage on a [`UserProfile`].
///
/// [`UserProfile`]: crate::domain::user::UserProfile
pub fn hash_credential(plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LedgerError::Storage(format!("credential hashing failed: {e}")))
}
