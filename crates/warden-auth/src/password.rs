//! Password hashing and verification.
//!
//! Argon2id with default parameters, a fresh `OsRng` salt per hash, and PHC
//! string output. The PHC string embeds algorithm, parameters and salt, so
//! verification needs nothing but the stored value.
//!
//! Both operations are deliberately slow. Async callers should use
//! [`hash_password_async`] and [`verify_password_async`], which run on the
//! blocking thread pool.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::AuthResult;
use crate::error::AuthError;

/// Well-formed Argon2id hash with the default cost parameters that no
/// password matches. Verifying against it costs the same as a real check.
pub(crate) const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$c29tZXNhbHRzb21lc2FsdA$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

/// Hashes a plaintext password for storage.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails.
pub fn hash_password(plain: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("password hashing failed: {}", e)))
}

/// Checks a plaintext password against a stored PHC hash.
///
/// A malformed stored hash never matches.
#[must_use]
pub fn verify_password(plain: &str, hash: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            return false;
        }
    };

    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok()
}

/// [`hash_password`] on the blocking thread pool.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails or the task panics.
pub async fn hash_password_async(plain: String) -> AuthResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .map_err(|e| AuthError::internal(format!("hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking thread pool.
///
/// # Errors
///
/// Returns `AuthError::Internal` if the task panics.
pub async fn verify_password_async(plain: String, hash: String) -> AuthResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .map_err(|e| AuthError::internal(format!("verification task failed: {}", e)))
}
