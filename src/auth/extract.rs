//! Authorization as axum extractors.
//!
//! Handlers declare what they need in their signature:
//!
//! ```text
//! async fn show(Permitted(identity, _): Permitted<ReadRecords>, ...)
//! ```
//!
//! `Permitted<P>` runs the whole gate, so a handler cannot ask for a
//! permission without also requiring activation and authentication.

use std::marker::PhantomData;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;

use crate::auth::gate::AuthorizationGate;
use crate::auth::principal::{codes, Identity, Principal};
use crate::error::{PipelineError, PipelineResult};

/// Per-request context attached by the authentication middleware.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub principal: Principal,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = PipelineError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> PipelineResult<Self> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| PipelineError::internal("request context missing from extensions"))
    }
}

/// Any identified principal.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = PipelineError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> PipelineResult<Self> {
        let context = RequestContext::from_request_parts(parts, state).await?;
        let identity = AuthorizationGate::require_authenticated(&context.principal)?;
        Ok(Self(identity.clone()))
    }
}

/// An identified principal whose account is activated.
#[derive(Debug, Clone)]
pub struct Activated(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for Activated {
    type Rejection = PipelineError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> PipelineResult<Self> {
        let context = RequestContext::from_request_parts(parts, state).await?;
        let identity = AuthorizationGate::require_activated(&context.principal)?;
        Ok(Self(identity.clone()))
    }
}

/// A capability a route can demand.
pub trait RequiredPermission: Send + Sync + 'static {
    const CODE: &'static str;
}

pub struct ReadRecords;

impl RequiredPermission for ReadRecords {
    const CODE: &'static str = codes::RECORDS_READ;
}

pub struct WriteRecords;

impl RequiredPermission for WriteRecords {
    const CODE: &'static str = codes::RECORDS_WRITE;
}

/// An activated principal holding `P::CODE`.
#[derive(Debug)]
pub struct Permitted<P>(pub Identity, pub PhantomData<P>);

impl<S, P> FromRequestParts<S> for Permitted<P>
where
    S: Send + Sync,
    P: RequiredPermission,
    AuthorizationGate: FromRef<S>,
{
    type Rejection = PipelineError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> PipelineResult<Self> {
        let context = RequestContext::from_request_parts(parts, state).await?;
        let gate = AuthorizationGate::from_ref(state);
        let identity = gate.require_permission(&context.principal, P::CODE).await?;
        Ok(Self(identity.clone(), PhantomData))
    }
}
