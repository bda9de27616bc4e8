//! Salted one-way password hashing (argon2)
//!
//! Hashing is deliberately slow, so both operations run on the blocking pool.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use quizbank_core::{performance, QuizbankError, QuizbankResult};
use tokio::sync::OnceCell;
use tracing::warn;

pub(super) static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// Hash a password into a PHC string
pub async fn hash_password(password: &str) -> QuizbankResult<String> {
    let password = password.to_owned();
    let task = tokio::task::spawn_blocking(move || hash_password_blocking(&password));
    performance::measure_async("hash_password", task)
        .await
        .map_err(|e| QuizbankError::internal(format!("hashing task failed: {}", e), "password"))?
}

/// Check a password against a stored PHC string
pub async fn verify_password(password: &str, hash: &str) -> QuizbankResult<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let task = tokio::task::spawn_blocking(move || verify_password_blocking(&password, &hash));
    performance::measure_async("verify_password", task)
        .await
        .map_err(|e| QuizbankError::internal(format!("verify task failed: {}", e), "password"))?
}

/// Run a full verification against a throwaway hash and discard the result.
///
/// Used when no account matches, so unknown usernames cost as much as wrong passwords.
pub async fn verify_dummy(password: &str) -> QuizbankResult<()> {
    let hash = dummy_hash().await?;
    verify_password(password, hash).await?;
    Ok(())
}

async fn dummy_hash() -> QuizbankResult<&'static String> {
    DUMMY_HASH
        .get_or_try_init(|| hash_password("quizbank-dummy-password"))
        .await
}

fn hash_password_blocking(password: &str) -> QuizbankResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| QuizbankError::internal(format!("failed to hash password: {}", e), "password"))
}

fn verify_password_blocking(password: &str, hash: &str) -> QuizbankResult<bool> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            return Ok(false);
        }
    };

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
