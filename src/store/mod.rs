//! Storage collaborators.
//!
//! # Data Flow
//! ```text
//! handlers
//!     → concurrency::ConcurrencyGuard (versioned writes)
//!     → RecordStore / PrincipalStore traits
//!     → memory.rs (in-process implementation)
//! ```
//!
//! # Design Decisions
//! - Stores offer atomic conditional writes; the pipeline never locks
//!   across a read-modify-write
//! - Not-found, stale-version and duplicate-key outcomes are distinct errors
//! - Every store call made for a request runs under `resilience::Deadline`

pub mod filters;
pub mod memory;
pub mod record;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::password::PasswordHash;
use crate::auth::principal::{Identity, NewPrincipal, PermissionSet, PrincipalChanges};
use crate::auth::token::{Scope, StoredToken, TokenHash};
use crate::error::PipelineError;

pub use filters::{Filters, Metadata, SortDirection, SortSpec};
pub use memory::{MemoryPrincipalStore, MemoryRecordStore};
pub use record::{Record, RecordFields, RecordPatch, RecordQuery};

/// Identifier of a stored resource. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub i64);

impl ResourceId {
    /// Parse a path parameter, rejecting anything below 1.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse::<i64>().ok().filter(|id| *id >= 1).map(Self)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic-concurrency version stamp.
///
/// Starts at [`Version::INITIAL`] and grows by exactly one per successful
/// write; it is never decremented or reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u32);

impl Version {
    pub const INITIAL: Version = Version(1);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// The version after one more write, or `None` once the counter is
    /// exhausted.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A resource that carries an identity and a version.
pub trait Versioned {
    fn id(&self) -> ResourceId;
    fn version(&self) -> Version;
}

/// A resource that can be rebuilt from a write it accepted.
pub trait Revise<C> {
    /// This resource as stored once `changes` were written at `version`.
    #[must_use]
    fn revise(self, changes: C, version: Version) -> Self;
}

/// Errors reported by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// The id exists but its version no longer matches.
    #[error("edit conflict")]
    Conflict,

    #[error("duplicate value for unique field {field}")]
    DuplicateKey { field: &'static str },

    #[error("{0} exceeded its deadline")]
    Timeout(&'static str),

    #[error("backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Version to stamp on the write that follows `expected`.
pub(crate) fn bump(expected: Version) -> StoreResult<Version> {
    expected
        .next()
        .ok_or_else(|| StoreError::Backend(format!("version counter exhausted at {expected}")))
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => PipelineError::NotFound,
            StoreError::Conflict => PipelineError::Conflict,
            StoreError::DuplicateKey { field } => PipelineError::Duplicate {
                field: field.to_string(),
            },
            StoreError::Timeout(_) | StoreError::Backend(_) => PipelineError::internal(err),
        }
    }
}

/// Conditional-write contract shared by every versioned resource.
#[async_trait]
pub trait VersionedStore: Send + Sync {
    type Resource: Versioned + Revise<Self::Changes> + Clone + Send + Sync + 'static;
    type Changes: Clone + Send + 'static;

    /// Short label used in logs and metrics.
    fn kind(&self) -> &'static str;

    async fn get(&self, id: ResourceId) -> StoreResult<Self::Resource>;

    /// Apply `changes` only if the stored row still has `expected` as its
    /// version; returns the new version.
    ///
    /// Fails with `NotFound` when the id is gone and `Conflict` when the
    /// version is stale.
    async fn conditional_update(
        &self,
        id: ResourceId,
        expected: Version,
        changes: Self::Changes,
    ) -> StoreResult<Version>;

    async fn delete(&self, id: ResourceId) -> StoreResult<()>;
}

/// Store for the business records exposed under `/v1/records`.
#[async_trait]
pub trait RecordStore: VersionedStore<Resource = Record, Changes = RecordFields> {
    /// Insert a record at [`Version::INITIAL`]. Titles are unique.
    async fn insert(&self, fields: RecordFields) -> StoreResult<Record>;

    async fn list(&self, query: &RecordQuery) -> StoreResult<(Vec<Record>, Metadata)>;
}

/// Store for principals, their tokens and their permissions.
#[async_trait]
pub trait PrincipalStore: VersionedStore<Resource = Identity, Changes = PrincipalChanges> {
    /// Persist a new principal. Emails are unique.
    async fn insert(&self, principal: NewPrincipal) -> StoreResult<Identity>;

    /// Principal registered under `email`, compared case-insensitively,
    /// together with its password hash.
    async fn get_by_email(&self, email: &str) -> StoreResult<(Identity, PasswordHash)>;

    async fn insert_token(&self, token: StoredToken) -> StoreResult<()>;

    /// Principal owning a token with this hash and scope whose expiry is
    /// after `now`.
    async fn find_token_principal(
        &self,
        hash: &TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> StoreResult<Identity>;

    async fn permissions_for(&self, id: ResourceId) -> StoreResult<PermissionSet>;

    async fn grant_permissions(&self, id: ResourceId, codes: &[&str]) -> StoreResult<()>;

    /// Delete every token of `scope` owned by the principal.
    async fn invalidate_tokens(&self, id: ResourceId, scope: Scope) -> StoreResult<()>;
}
