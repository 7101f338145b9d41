//! In-process store implementations.
//!
//! Each table sits behind a single `RwLock`, so a conditional update checks
//! the version and writes the row under one write guard. Lock poisoning is
//! recovered from: a panicking writer never leaves a row half-written
//! because every mutation is a single map operation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::auth::password::PasswordHash;
use crate::auth::principal::{Identity, NewPrincipal, PermissionSet, PrincipalChanges};
use crate::auth::token::{Scope, StoredToken, TokenHash};
use crate::store::filters::{Metadata, SortDirection};
use crate::store::record::{Record, RecordFields, RecordQuery};
use crate::store::{
    bump, PrincipalStore, RecordStore, ResourceId, Revise, StoreError, StoreResult, Version,
    VersionedStore,
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

async fn simulate_latency(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct RecordTable {
    next_id: i64,
    rows: HashMap<ResourceId, Record>,
    /// Lowercased title to owning id.
    titles: HashMap<String, ResourceId>,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: HashMap::new(),
            titles: HashMap::new(),
        }
    }
}

/// Record store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    table: RwLock<RecordTable>,
    latency: Option<Duration>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, to exercise deadlines.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn len(&self) -> usize {
        read(&self.table).rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Order by the sort column alone; the id tie-break is applied by the caller.
fn compare_column(a: &Record, b: &Record, column: &str) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl VersionedStore for MemoryRecordStore {
    type Resource = Record;
    type Changes = RecordFields;

    fn kind(&self) -> &'static str {
        "record"
    }

    async fn get(&self, id: ResourceId) -> StoreResult<Record> {
        simulate_latency(self.latency).await;
        read(&self.table)
            .rows
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn conditional_update(
        &self,
        id: ResourceId,
        expected: Version,
        changes: RecordFields,
    ) -> StoreResult<Version> {
        simulate_latency(self.latency).await;
        let mut table = write(&self.table);

        let current = table.rows.get(&id).ok_or(StoreError::NotFound)?;
        if current.version != expected {
            return Err(StoreError::Conflict);
        }

        let old_key = current.title.to_lowercase();
        let new_key = changes.title.to_lowercase();
        if matches!(table.titles.get(&new_key), Some(owner) if *owner != id) {
            return Err(StoreError::DuplicateKey { field: "title" });
        }

        let version = bump(expected)?;
        let updated = current.clone().revise(changes, version);
        table.titles.remove(&old_key);
        table.titles.insert(new_key, id);
        table.rows.insert(id, updated);
        Ok(version)
    }

    async fn delete(&self, id: ResourceId) -> StoreResult<()> {
        simulate_latency(self.latency).await;
        let mut table = write(&self.table);
        let removed = table.rows.remove(&id).ok_or(StoreError::NotFound)?;
        table.titles.remove(&removed.title.to_lowercase());
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, fields: RecordFields) -> StoreResult<Record> {
        simulate_latency(self.latency).await;
        let mut table = write(&self.table);

        let key = fields.title.to_lowercase();
        if table.titles.contains_key(&key) {
            return Err(StoreError::DuplicateKey { field: "title" });
        }

        let id = ResourceId(table.next_id);
        table.next_id += 1;
        let record = Record {
            id,
            created_at: Utc::now(),
            title: fields.title,
            year: fields.year,
            tags: fields.tags,
            version: Version::INITIAL,
        };
        table.titles.insert(key, id);
        table.rows.insert(id, record.clone());
        Ok(record)
    }

    async fn list(&self, query: &RecordQuery) -> StoreResult<(Vec<Record>, Metadata)> {
        simulate_latency(self.latency).await;
        let needle = query.title.to_lowercase();

        let mut matched: Vec<Record> = read(&self.table)
            .rows
            .values()
            .filter(|r| needle.is_empty() || r.title.to_lowercase().contains(&needle))
            .filter(|r| query.tags.iter().all(|tag| r.tags.contains(tag)))
            .cloned()
            .collect();

        let sort = query.filters.sort();
        matched.sort_by(|a, b| {
            let primary = compare_column(a, b, sort.column());
            let primary = match sort.direction() {
                SortDirection::Ascending => primary,
                SortDirection::Descending => primary.reverse(),
            };
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let metadata = Metadata::calculate(matched.len(), &query.filters);
        let page = matched
            .into_iter()
            .skip(query.filters.offset())
            .take(query.filters.limit())
            .collect();
        Ok((page, metadata))
    }
}

// ---------------------------------------------------------------------------
// Principals
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StoredPrincipal {
    identity: Identity,
    password_hash: PasswordHash,
}

#[derive(Debug)]
struct PrincipalTable {
    next_id: i64,
    rows: HashMap<ResourceId, StoredPrincipal>,
    /// Lowercased email to owning id.
    emails: HashMap<String, ResourceId>,
}

impl Default for PrincipalTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: HashMap::new(),
            emails: HashMap::new(),
        }
    }
}

/// Principal, token and permission store backed by hash maps.
#[derive(Debug, Default)]
pub struct MemoryPrincipalStore {
    users: RwLock<PrincipalTable>,
    tokens: DashMap<TokenHash, StoredToken>,
    permissions: DashMap<ResourceId, PermissionSet>,
    latency: Option<Duration>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, to exercise deadlines.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl VersionedStore for MemoryPrincipalStore {
    type Resource = Identity;
    type Changes = PrincipalChanges;

    fn kind(&self) -> &'static str {
        "principal"
    }

    async fn get(&self, id: ResourceId) -> StoreResult<Identity> {
        simulate_latency(self.latency).await;
        read(&self.users)
            .rows
            .get(&id)
            .map(|row| row.identity.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn conditional_update(
        &self,
        id: ResourceId,
        expected: Version,
        changes: PrincipalChanges,
    ) -> StoreResult<Version> {
        simulate_latency(self.latency).await;
        let mut table = write(&self.users);

        let current = table.rows.get(&id).ok_or(StoreError::NotFound)?;
        if current.identity.version != expected {
            return Err(StoreError::Conflict);
        }

        let old_key = current.identity.email.to_lowercase();
        let new_key = changes.email.to_lowercase();
        if matches!(table.emails.get(&new_key), Some(owner) if *owner != id) {
            return Err(StoreError::DuplicateKey { field: "email" });
        }

        let version = bump(expected)?;
        table.emails.remove(&old_key);
        table.emails.insert(new_key, id);
        if let Some(row) = table.rows.get_mut(&id) {
            row.identity = row.identity.clone().revise(changes, version);
        }
        Ok(version)
    }

    async fn delete(&self, id: ResourceId) -> StoreResult<()> {
        simulate_latency(self.latency).await;
        {
            let mut table = write(&self.users);
            let removed = table.rows.remove(&id).ok_or(StoreError::NotFound)?;
            table.emails.remove(&removed.identity.email.to_lowercase());
        }
        self.tokens.retain(|_, token| token.principal_id != id);
        self.permissions.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn insert(&self, principal: NewPrincipal) -> StoreResult<Identity> {
        simulate_latency(self.latency).await;
        let mut table = write(&self.users);

        let key = principal.email.to_lowercase();
        if table.emails.contains_key(&key) {
            return Err(StoreError::DuplicateKey { field: "email" });
        }

        let id = ResourceId(table.next_id);
        table.next_id += 1;
        let identity = Identity {
            id,
            created_at: Utc::now(),
            name: principal.name,
            email: principal.email,
            activated: principal.activated,
            version: Version::INITIAL,
        };
        table.emails.insert(key, id);
        table.rows.insert(
            id,
            StoredPrincipal {
                identity: identity.clone(),
                password_hash: principal.password_hash,
            },
        );
        Ok(identity)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<(Identity, PasswordHash)> {
        simulate_latency(self.latency).await;
        let table = read(&self.users);
        table
            .emails
            .get(&email.to_lowercase())
            .and_then(|id| table.rows.get(id))
            .map(|row| (row.identity.clone(), row.password_hash.clone()))
            .ok_or(StoreError::NotFound)
    }

    async fn insert_token(&self, token: StoredToken) -> StoreResult<()> {
        simulate_latency(self.latency).await;
        if !read(&self.users).rows.contains_key(&token.principal_id) {
            return Err(StoreError::NotFound);
        }
        self.tokens.insert(token.hash, token);
        Ok(())
    }

    async fn find_token_principal(
        &self,
        hash: &TokenHash,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> StoreResult<Identity> {
        simulate_latency(self.latency).await;
        let principal_id = self
            .tokens
            .get(hash)
            .filter(|token| token.is_live(scope, now))
            .map(|token| token.principal_id)
            .ok_or(StoreError::NotFound)?;

        read(&self.users)
            .rows
            .get(&principal_id)
            .map(|row| row.identity.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn permissions_for(&self, id: ResourceId) -> StoreResult<PermissionSet> {
        simulate_latency(self.latency).await;
        Ok(self
            .permissions
            .get(&id)
            .map(|set| set.clone())
            .unwrap_or_default())
    }

    async fn grant_permissions(&self, id: ResourceId, codes: &[&str]) -> StoreResult<()> {
        simulate_latency(self.latency).await;
        if !read(&self.users).rows.contains_key(&id) {
            return Err(StoreError::NotFound);
        }
        let mut set = self.permissions.entry(id).or_default();
        for code in codes {
            set.insert(*code);
        }
        Ok(())
    }

    async fn invalidate_tokens(&self, id: ResourceId, scope: Scope) -> StoreResult<()> {
        simulate_latency(self.latency).await;
        self.tokens
            .retain(|_, token| !(token.principal_id == id && token.scope == scope));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::AuthToken;
    use crate::store::filters::Filters;
    use crate::store::record::SORT_SAFELIST;
    use chrono::TimeDelta;

    fn fields(title: &str, year: i32, tags: &[&str]) -> RecordFields {
        RecordFields {
            title: title.into(),
            year,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn query(title: &str, tags: &[&str], page: i64, page_size: i64, sort: &str) -> RecordQuery {
        RecordQuery {
            title: title.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            filters: Filters::new(page, page_size, sort, &SORT_SAFELIST).unwrap(),
        }
    }

    fn principal(email: &str) -> NewPrincipal {
        NewPrincipal::new("Test", email, PasswordHash::new("hash").unwrap())
    }

    #[tokio::test]
    async fn test_insert_starts_at_initial_version() {
        let store = MemoryRecordStore::new();
        let record = store.insert(fields("Moana", 2016, &["animation"])).await.unwrap();
        assert_eq!(record.id, ResourceId(1));
        assert_eq!(record.version, Version::INITIAL);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_conditional_update_checks_version() {
        let store = MemoryRecordStore::new();
        let record = store.insert(fields("Moana", 2016, &["animation"])).await.unwrap();

        let v2 = store
            .conditional_update(record.id, Version::INITIAL, fields("Moana", 2017, &["animation"]))
            .await
            .unwrap();
        assert_eq!(v2, Version::new(2));

        let stale = store
            .conditional_update(record.id, Version::INITIAL, fields("Moana", 2018, &["animation"]))
            .await;
        assert!(matches!(stale, Err(StoreError::Conflict)));

        let missing = store
            .conditional_update(ResourceId(99), Version::INITIAL, fields("X", 2000, &["a"]))
            .await;
        assert!(matches!(missing, Err(StoreError::NotFound)));

        assert_eq!(store.get(record.id).await.unwrap().year, 2017);
    }

    #[tokio::test]
    async fn test_duplicate_titles_rejected() {
        let store = MemoryRecordStore::new();
        store.insert(fields("Moana", 2016, &["a"])).await.unwrap();
        let other = store.insert(fields("Heat", 1995, &["b"])).await.unwrap();

        let dup = store.insert(fields("moana", 2016, &["a"])).await;
        assert!(matches!(dup, Err(StoreError::DuplicateKey { field: "title" })));

        let renamed = store
            .conditional_update(other.id, other.version, fields("MOANA", 1995, &["b"]))
            .await;
        assert!(matches!(renamed, Err(StoreError::DuplicateKey { .. })));
    }

    #[tokio::test]
    async fn test_delete_frees_title() {
        let store = MemoryRecordStore::new();
        let record = store.insert(fields("Moana", 2016, &["a"])).await.unwrap();
        store.delete(record.id).await.unwrap();
        assert!(matches!(store.delete(record.id).await, Err(StoreError::NotFound)));
        assert!(store.insert(fields("Moana", 2016, &["a"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_paginates() {
        let store = MemoryRecordStore::new();
        store.insert(fields("Black Panther", 2018, &["action", "adventure"])).await.unwrap();
        store.insert(fields("Deadpool", 2016, &["action", "comedy"])).await.unwrap();
        store.insert(fields("The Breakfast Club", 1985, &["drama"])).await.unwrap();
        store.insert(fields("Panther Hunt", 2001, &["action"])).await.unwrap();

        let (rows, meta) = store.list(&query("", &["action"], 1, 2, "-year")).await.unwrap();
        assert_eq!(meta.total_records, 3);
        assert_eq!(meta.last_page, 2);
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Black Panther", "Deadpool"]);

        let (rows, _) = store.list(&query("panther", &[], 1, 10, "title")).await.unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Black Panther", "Panther Hunt"]);

        let (rows, meta) = store.list(&query("nothing", &[], 1, 10, "id")).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(meta, Metadata::default());
    }

    #[tokio::test]
    async fn test_descending_sort_keeps_ids_ascending_on_ties() {
        let store = MemoryRecordStore::new();
        for title in ["Alpha", "Bravo", "Charlie"] {
            store.insert(fields(title, 2000, &["a"])).await.unwrap();
        }
        store.insert(fields("Delta", 2010, &["a"])).await.unwrap();

        let (rows, _) = store.list(&query("", &[], 1, 10, "-year")).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, [4, 1, 2, 3]);

        let (rows, _) = store.list(&query("", &[], 1, 10, "-id")).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, [4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_exhausted_version_is_backend_error() {
        let store = MemoryRecordStore::new();
        let record = store.insert(fields("Moana", 2016, &["a"])).await.unwrap();
        let last = Version::new(u32::MAX);
        if let Some(row) = write(&store.table).rows.get_mut(&record.id) {
            row.version = last;
        }

        let result = store
            .conditional_update(record.id, last, fields("Moana", 2017, &["a"]))
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.get(record.id).await.unwrap().version, last);
    }

    #[tokio::test]
    async fn test_get_by_email_ignores_case() {
        let store = MemoryPrincipalStore::new();
        let user = store.insert(principal("Ada@Example.com")).await.unwrap();

        let (found, hash) = store.get_by_email("ada@example.COM").await.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(hash.as_str(), "hash");
        assert!(matches!(
            store.get_by_email("nobody@example.com").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_token_lookup_honours_scope_and_expiry() {
        let store = MemoryPrincipalStore::new();
        let user = store.insert(principal("a@example.com")).await.unwrap();

        let token = AuthToken::generate(user.id, TimeDelta::hours(1), Scope::Authentication);
        store.insert_token(token.stored()).await.unwrap();

        let now = Utc::now();
        let found = store
            .find_token_principal(&token.hash, Scope::Authentication, now)
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        let wrong_scope = store
            .find_token_principal(&token.hash, Scope::Activation, now)
            .await;
        assert!(matches!(wrong_scope, Err(StoreError::NotFound)));

        let later = now + TimeDelta::hours(2);
        let expired = store
            .find_token_principal(&token.hash, Scope::Authentication, later)
            .await;
        assert!(matches!(expired, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn test_invalidate_tokens_only_touches_scope() {
        let store = MemoryPrincipalStore::new();
        let user = store.insert(principal("a@example.com")).await.unwrap();
        for scope in [Scope::Activation, Scope::Activation, Scope::Authentication] {
            let token = AuthToken::generate(user.id, TimeDelta::hours(1), scope);
            store.insert_token(token.stored()).await.unwrap();
        }

        store.invalidate_tokens(user.id, Scope::Activation).await.unwrap();
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn test_permissions_and_duplicate_email() {
        let store = MemoryPrincipalStore::new();
        let user = store.insert(principal("a@example.com")).await.unwrap();
        assert!(!store.permissions_for(user.id).await.unwrap().includes("records:read"));

        store.grant_permissions(user.id, &["records:read"]).await.unwrap();
        assert!(store.permissions_for(user.id).await.unwrap().includes("records:read"));

        let dup = store.insert(principal("A@example.com")).await;
        assert!(matches!(dup, Err(StoreError::DuplicateKey { field: "email" })));
    }

    #[tokio::test]
    async fn test_principal_update_bumps_version() {
        let store = MemoryPrincipalStore::new();
        let user = store.insert(principal("a@example.com")).await.unwrap();
        let mut changes = user.changes();
        changes.activated = true;

        let version = store
            .conditional_update(user.id, user.version, changes.clone())
            .await
            .unwrap();
        assert_eq!(version, Version::new(2));
        assert!(store.get(user.id).await.unwrap().activated);
        assert!(matches!(
            store.conditional_update(user.id, user.version, changes).await,
            Err(StoreError::Conflict)
        ));
    }
}
