//! Password guard: slow salted hashing and constant-effort verification.
//! Raw passwords exist only on the stack of these two functions and the
//! handler that received them; they are never stored or logged.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password")]
    Hash,
}

/// Hash a raw password with a fresh random salt at the default (fixed)
/// cost, producing a self-describing PHC string.
pub fn hash_password(raw: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(raw.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::Hash)
}

/// Verify a raw password against a stored PHC string. An unparseable hash
/// verifies as false rather than erroring; the caller cannot distinguish
/// the cases, which is the point.
pub fn verify_password(raw: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };

    Argon2::default().verify_password(raw.as_bytes(), &parsed).is_ok()
}
