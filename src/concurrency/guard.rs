//! Optimistic concurrency over versioned stores.

use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::observability::metrics;
use crate::resilience::Deadline;
use crate::store::{ResourceId, Revise, StoreError, Version, Versioned, VersionedStore};

/// Mediates every write to a versioned resource.
///
/// Each update is one conditional write keyed by the version the caller
/// read. A stale version fails with `Conflict`; nothing here retries.
pub struct ConcurrencyGuard<S: ?Sized> {
    store: Arc<S>,
    deadline: Deadline,
}

impl<S: ?Sized> Clone for ConcurrencyGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            deadline: self.deadline,
        }
    }
}

impl<S> ConcurrencyGuard<S>
where
    S: VersionedStore + ?Sized,
{
    pub fn new(store: Arc<S>, deadline: Deadline) -> Self {
        Self { store, deadline }
    }

    /// The underlying store, for non-versioned calls like inserts.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub async fn fetch(&self, id: ResourceId) -> PipelineResult<S::Resource> {
        self.deadline
            .run("get", self.store.get(id))
            .await
            .map_err(PipelineError::from)
    }

    /// Write `changes` if the resource is still at `read_version`.
    pub async fn update(
        &self,
        id: ResourceId,
        read_version: Version,
        changes: S::Changes,
    ) -> PipelineResult<Version> {
        let result = self
            .deadline
            .run(
                "conditional_update",
                self.store.conditional_update(id, read_version, changes),
            )
            .await;

        match result {
            Ok(version) => {
                tracing::debug!(
                    kind = self.store.kind(),
                    id = %id,
                    from = %read_version,
                    to = %version,
                    "Versioned write applied"
                );
                Ok(version)
            }
            Err(StoreError::Conflict) => {
                tracing::info!(
                    kind = self.store.kind(),
                    id = %id,
                    read_version = %read_version,
                    "Edit conflict"
                );
                metrics::record_edit_conflict(self.store.kind());
                Err(PipelineError::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read, apply `mutate` locally, then write once at the version read.
    ///
    /// Returns the resource as written, without reading it back. `mutate`
    /// may reject the change.
    pub async fn modify<F>(&self, id: ResourceId, mutate: F) -> PipelineResult<S::Resource>
    where
        F: FnOnce(&S::Resource) -> PipelineResult<S::Changes>,
    {
        let current = self.fetch(id).await?;
        let changes = mutate(&current)?;
        let version = self.update(id, current.version(), changes.clone()).await?;
        Ok(current.revise(changes, version))
    }

    pub async fn delete(&self, id: ResourceId) -> PipelineResult<()> {
        self.deadline
            .run("delete", self.store.delete(id))
            .await
            .map_err(PipelineError::from)
    }
}
