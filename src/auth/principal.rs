//! Principals and their permissions.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use super::password::PasswordHash;
use crate::error::FieldErrors;
use crate::store::{ResourceId, Revise, Version, Versioned};

const MAX_NAME_BYTES: usize = 500;

static EMAIL_RX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .ok()
});

/// Shape rules for a principal's email address.
pub fn check_email(errors: &mut FieldErrors, email: &str) {
    errors.check(!email.is_empty(), "email", "must be provided");
    let valid = EMAIL_RX.as_ref().is_some_and(|rx| rx.is_match(email));
    errors.check(valid, "email", "must be a valid email address");
}

/// Shape rules for a display name.
pub fn check_name(errors: &mut FieldErrors, name: &str) {
    errors.check(!name.is_empty(), "name", "must be provided");
    errors.check(
        name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
}

/// Capability codes checked by the authorization gate.
pub mod codes {
    pub const RECORDS_READ: &str = "records:read";
    pub const RECORDS_WRITE: &str = "records:write";
}

/// The actor associated with a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    /// No credential was presented.
    Anonymous,
    Identified(Identity),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Principal::Anonymous => None,
            Principal::Identified(identity) => Some(identity),
        }
    }
}

/// A stored, identified principal as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub id: ResourceId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: Version,
}

impl Identity {
    /// Current mutable fields, the starting point for an update.
    pub fn changes(&self) -> PrincipalChanges {
        PrincipalChanges {
            name: self.name.clone(),
            email: self.email.clone(),
            activated: self.activated,
        }
    }
}

impl Revise<PrincipalChanges> for Identity {
    fn revise(self, changes: PrincipalChanges, version: Version) -> Self {
        Self {
            name: changes.name,
            email: changes.email,
            activated: changes.activated,
            version,
            ..self
        }
    }
}

impl Versioned for Identity {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }
}

/// Fields written by a principal update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalChanges {
    pub name: String,
    pub email: String,
    pub activated: bool,
}

/// A principal ready to be persisted. Cannot exist without a password hash.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub name: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub activated: bool,
}

impl NewPrincipal {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password_hash: PasswordHash) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password_hash,
            activated: false,
        }
    }

    #[must_use]
    pub fn activated(mut self, activated: bool) -> Self {
        self.activated = activated;
        self
    }
}

/// Unordered set of capability codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(HashSet<String>);

impl PermissionSet {
    /// Exact-match containment.
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn insert(&mut self, code: impl Into<String>) {
        self.0.insert(code.into());
    }

    /// Codes in a stable order, for responses.
    pub fn sorted(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.0.iter().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_set_exact_match() {
        let perms: PermissionSet = ["records:read"].into_iter().collect();
        assert!(perms.includes(codes::RECORDS_READ));
        assert!(!perms.includes(codes::RECORDS_WRITE));
        assert!(!perms.includes("records"));
    }

    #[test]
    fn test_new_principal_starts_inactive() {
        let hash = PasswordHash::new("$argon2id$v=19$stub").unwrap();
        let principal = NewPrincipal::new("Ada", "ada@example.com", hash);
        assert!(!principal.activated);
        assert!(principal.activated(true).activated);
    }

    #[test]
    fn test_email_shape() {
        assert!(EMAIL_RX.is_some());
        for good in ["ada@example.com", "a.b+c@mail.example.co.uk"] {
            let mut errors = FieldErrors::new();
            check_email(&mut errors, good);
            assert!(errors.is_empty(), "{good}");
        }
        for (bad, message) in [
            ("", "must be provided"),
            ("ada", "must be a valid email address"),
            ("ada@", "must be a valid email address"),
            ("@example.com", "must be a valid email address"),
        ] {
            let mut errors = FieldErrors::new();
            check_email(&mut errors, bad);
            assert_eq!(errors.get("email"), Some(message), "{bad}");
        }
    }

    #[test]
    fn test_name_length() {
        let mut errors = FieldErrors::new();
        check_name(&mut errors, &"n".repeat(501));
        assert_eq!(errors.get("name"), Some("must not be more than 500 bytes long"));

        let mut errors = FieldErrors::new();
        check_name(&mut errors, &"n".repeat(500));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_revise_keeps_identity_fields() {
        let identity = Identity {
            id: ResourceId(3),
            created_at: Utc::now(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            activated: false,
            version: Version::INITIAL,
        };
        let mut changes = identity.changes();
        changes.activated = true;

        let revised = identity.clone().revise(changes, Version::new(2));
        assert!(revised.activated);
        assert_eq!(revised.version, Version::new(2));
        assert_eq!(revised.id, identity.id);
        assert_eq!(revised.created_at, identity.created_at);
    }

    #[test]
    fn test_anonymous_is_a_variant() {
        assert!(Principal::Anonymous.is_anonymous());
        assert!(Principal::Anonymous.identity().is_none());
    }
}
