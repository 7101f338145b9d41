//! Layered authorization checks.
//!
//! Each requirement implies the ones before it:
//! `authenticated < activated < permitted(code)`. A failure names the first
//! unmet layer.

use std::sync::Arc;

use crate::auth::principal::{Identity, Principal};
use crate::error::{AuthorizationError, PipelineError, PipelineResult};
use crate::resilience::Deadline;
use crate::store::PrincipalStore;

#[derive(Clone)]
pub struct AuthorizationGate {
    store: Arc<dyn PrincipalStore>,
    deadline: Deadline,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn PrincipalStore>, deadline: Deadline) -> Self {
        Self { store, deadline }
    }

    pub fn require_authenticated(principal: &Principal) -> Result<&Identity, AuthorizationError> {
        principal
            .identity()
            .ok_or(AuthorizationError::Unauthenticated)
    }

    pub fn require_activated(principal: &Principal) -> Result<&Identity, AuthorizationError> {
        let identity = Self::require_authenticated(principal)?;
        if !identity.activated {
            return Err(AuthorizationError::Inactive);
        }
        Ok(identity)
    }

    /// Require an activated principal holding `code`. The permission set is
    /// fetched fresh under the backend deadline.
    pub async fn require_permission<'p>(
        &self,
        principal: &'p Principal,
        code: &str,
    ) -> PipelineResult<&'p Identity> {
        let identity = Self::require_activated(principal)?;

        let permissions = self
            .deadline
            .run("permissions_for", self.store.permissions_for(identity.id))
            .await
            .map_err(PipelineError::internal)?;

        if !permissions.includes(code) {
            tracing::debug!(principal_id = %identity.id, permission = code, "Permission denied");
            return Err(AuthorizationError::Forbidden.into());
        }
        Ok(identity)
    }
}
