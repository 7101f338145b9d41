//! Password hashing.
//!
//! Hashes are Argon2id PHC strings with a random per-password salt. Hashing
//! is deliberately slow; request handlers run it on the blocking pool.

use std::fmt;

use argon2::password_hash::{self, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;

use crate::error::{FieldErrors, PipelineError, PipelineResult};

const MIN_PASSWORD_BYTES: usize = 8;
const MAX_PASSWORD_BYTES: usize = 72;
const SALT_BYTES: usize = 16;

/// Shape rules for a plaintext password.
pub fn check_plaintext(errors: &mut FieldErrors, plaintext: &str) {
    errors.check(!plaintext.is_empty(), "password", "must be provided");
    errors.check(
        plaintext.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    errors.check(
        plaintext.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// An encoded password hash. The plaintext is never kept.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap an already-encoded hash, as read back from storage.
    pub fn new(encoded: impl Into<String>) -> PipelineResult<Self> {
        let encoded = encoded.into();
        if encoded.is_empty() {
            return Err(PipelineError::invalid("password", "must be provided"));
        }
        Ok(Self(encoded))
    }

    /// Hash `plaintext` under a fresh salt.
    pub fn derive(plaintext: &str) -> PipelineResult<Self> {
        let mut salt = [0u8; SALT_BYTES];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(PipelineError::internal)?;

        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(PipelineError::internal)?;
        Ok(Self(hash.to_string()))
    }

    /// Whether `plaintext` is the password this hash was derived from.
    ///
    /// A hash that cannot be parsed is an internal error, not a mismatch.
    pub fn matches(&self, plaintext: &str) -> PipelineResult<bool> {
        let parsed = password_hash::PasswordHash::new(&self.0).map_err(PipelineError::internal)?;
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PipelineError::internal(e)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// [`PasswordHash::derive`] on the blocking pool.
pub async fn hash_password(plaintext: String) -> PipelineResult<PasswordHash> {
    tokio::task::spawn_blocking(move || PasswordHash::derive(&plaintext))
        .await
        .map_err(PipelineError::internal)?
}

/// [`PasswordHash::matches`] on the blocking pool.
pub async fn verify_password(hash: PasswordHash, plaintext: String) -> PipelineResult<bool> {
    tokio::task::spawn_blocking(move || hash.matches(&plaintext))
        .await
        .map_err(PipelineError::internal)?
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}
