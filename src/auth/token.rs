//! Bearer tokens.
//!
//! A token's plaintext is handed to the client once and never stored or
//! logged; the store only ever sees its SHA-256 hash.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::FieldErrors;
use crate::store::{PrincipalStore, ResourceId, StoreResult};

/// Length of a token plaintext: 16 random bytes, unpadded URL-safe base64.
pub const TOKEN_LENGTH: usize = 22;
const TOKEN_ENTROPY_BYTES: usize = 16;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-way lookup key derived from a plaintext.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Client-visible token value.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TokenPlaintext(String);

impl TokenPlaintext {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TokenPlaintext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPlaintext(<redacted>)")
    }
}

/// Check a plaintext's shape without touching storage.
pub fn validate_plaintext(plaintext: &str) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    errors.check(!plaintext.is_empty(), "token", "must be provided");
    errors.check(
        plaintext.len() == TOKEN_LENGTH,
        "token",
        "must be 22 bytes long",
    );
    errors.check(
        plaintext
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
        "token",
        "must only contain URL-safe base64 characters",
    );
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A freshly issued token, including its plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct AuthToken {
    #[serde(rename = "token")]
    pub plaintext: TokenPlaintext,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub principal_id: ResourceId,
    #[serde(skip)]
    pub scope: Scope,
    pub expiry: DateTime<Utc>,
}

impl AuthToken {
    pub fn generate(principal_id: ResourceId, ttl: TimeDelta, scope: Scope) -> Self {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let plaintext = URL_SAFE_NO_PAD.encode(bytes);

        Self {
            hash: TokenHash::of(&plaintext),
            plaintext: TokenPlaintext(plaintext),
            principal_id,
            scope,
            expiry: Utc::now()
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// The persisted form: everything but the plaintext.
    pub fn stored(&self) -> StoredToken {
        StoredToken {
            hash: self.hash,
            principal_id: self.principal_id,
            scope: self.scope,
            expiry: self.expiry,
        }
    }
}

/// Token row as kept by a [`PrincipalStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredToken {
    pub hash: TokenHash,
    pub principal_id: ResourceId,
    pub scope: Scope,
    pub expiry: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_live(&self, scope: Scope, now: DateTime<Utc>) -> bool {
        self.scope == scope && now < self.expiry
    }
}

/// Generate a token for `principal_id` and persist its hash.
pub async fn issue(
    store: &dyn PrincipalStore,
    principal_id: ResourceId,
    ttl: TimeDelta,
    scope: Scope,
) -> StoreResult<AuthToken> {
    let token = AuthToken::generate(principal_id, ttl, scope);
    store.insert_token(token.stored()).await?;
    tracing::debug!(principal_id = %principal_id, scope = %scope, expiry = %token.expiry, "Token issued");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let token = AuthToken::generate(ResourceId(1), TimeDelta::hours(1), Scope::Activation);
        assert_eq!(token.plaintext.expose().len(), TOKEN_LENGTH);
        assert!(validate_plaintext(token.plaintext.expose()).is_ok());
        assert_eq!(token.hash, TokenHash::of(token.plaintext.expose()));
        assert!(token.expiry > Utc::now());
    }

    #[test]
    fn test_plaintext_never_in_debug_output() {
        let token = AuthToken::generate(ResourceId(1), TimeDelta::hours(1), Scope::Activation);
        let debug = format!("{:?}", token);
        assert!(!debug.contains(token.plaintext.expose()));
    }

    #[test]
    fn test_shape_validation() {
        assert_eq!(
            validate_plaintext("").unwrap_err().get("token"),
            Some("must be provided")
        );
        assert_eq!(
            validate_plaintext("short").unwrap_err().get("token"),
            Some("must be 22 bytes long")
        );
        assert!(validate_plaintext("abcdefghijklmnopqrst+/").is_err());
        assert!(validate_plaintext("abcdefghijklmnopqrst-_").is_ok());
    }

    #[test]
    fn test_liveness_requires_scope_and_future_expiry() {
        let now = Utc::now();
        let token = StoredToken {
            hash: TokenHash::of("x"),
            principal_id: ResourceId(1),
            scope: Scope::Activation,
            expiry: now + TimeDelta::minutes(5),
        };
        assert!(token.is_live(Scope::Activation, now));
        assert!(!token.is_live(Scope::Authentication, now));
        assert!(!token.is_live(Scope::Activation, now + TimeDelta::minutes(5)));
    }
}
