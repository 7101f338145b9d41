//! Bearer-token authentication.
//!
//! Runs as middleware after rate limiting. The outcome is a [`Principal`]
//! stored in the request's [`RequestContext`]; an absent credential is not
//! an error, only a bad one is.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;

use crate::auth::extract::RequestContext;
use crate::auth::principal::{Identity, Principal};
use crate::auth::token::{validate_plaintext, Scope, TokenHash};
use crate::error::{PipelineError, PipelineResult};
use crate::http::request::request_id;
use crate::http::AppState;
use crate::resilience::Deadline;
use crate::store::{PrincipalStore, StoreError};

/// Resolves credentials to principals.
#[derive(Clone)]
pub struct TokenAuthenticator {
    store: Arc<dyn PrincipalStore>,
    deadline: Deadline,
}

impl TokenAuthenticator {
    pub fn new(store: Arc<dyn PrincipalStore>, deadline: Deadline) -> Self {
        Self { store, deadline }
    }

    /// Resolve an `Authorization` header value.
    ///
    /// A missing or blank header yields [`Principal::Anonymous`]. Anything other than
    /// `Bearer <token>` with a live token of `scope` is an authentication
    /// error.
    pub async fn resolve(&self, header: Option<&str>, scope: Scope) -> PipelineResult<Principal> {
        let Some(header) = header.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(Principal::Anonymous);
        };
        let token = parse_bearer(header).ok_or(PipelineError::Authentication)?;
        self.resolve_token(token, scope)
            .await
            .map(Principal::Identified)
    }

    /// Look up the owner of a token plaintext.
    ///
    /// Malformed, unknown, expired and wrong-scope tokens all fail the same
    /// way. A malformed token never reaches the store.
    pub async fn resolve_token(&self, plaintext: &str, scope: Scope) -> PipelineResult<Identity> {
        if validate_plaintext(plaintext).is_err() {
            return Err(PipelineError::Authentication);
        }

        let hash = TokenHash::of(plaintext);
        let lookup = self
            .deadline
            .run(
                "find_token_principal",
                self.store.find_token_principal(&hash, scope, Utc::now()),
            )
            .await;

        match lookup {
            Ok(identity) => Ok(identity),
            Err(StoreError::NotFound) => Err(PipelineError::Authentication),
            Err(e) => Err(PipelineError::internal(e)),
        }
    }
}

/// Extract the token from `Bearer <token>`. The scheme is case-sensitive
/// and exactly one space separates it from the token.
fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if scheme != "Bearer" || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}

/// Middleware attaching a [`RequestContext`] to every request.
///
/// Every response, including failures, varies on `Authorization`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = request_id(request.headers());

    let credential = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map(str::to_owned));

    let resolved = match credential {
        None => Ok(Principal::Anonymous),
        Some(Ok(value)) => {
            state
                .authenticator
                .resolve(Some(value.as_str()), Scope::Authentication)
                .await
        }
        Some(Err(_)) => Err(PipelineError::Authentication),
    };

    let mut response = match resolved {
        Ok(principal) => {
            if let Some(identity) = principal.identity() {
                tracing::debug!(request_id = %request_id, principal_id = %identity.id, "Request authenticated");
            }
            request.extensions_mut().insert(RequestContext {
                request_id,
                principal,
            });
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!(request_id = %request_id, error = %e, "Authentication failed");
            e.into_response()
        }
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}
