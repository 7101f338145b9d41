//! `/v1/tokens` handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::auth::password::{check_plaintext, verify_password};
use crate::auth::principal::check_email;
use crate::auth::token::Scope;
use crate::error::{FieldErrors, PipelineError, PipelineResult};
use crate::http::handlers::ApiJson;
use crate::http::AppState;
use crate::store::{PrincipalStore, StoreError};

/// Holds a plaintext password, so it has no `Debug`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsInput {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// `POST /v1/tokens/authentication`
///
/// Exchanges an email and password for an authentication token. An unknown
/// email and a wrong password fail the same way.
pub async fn create_authentication_token(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<CredentialsInput>,
) -> PipelineResult<Response> {
    let mut errors = FieldErrors::new();
    check_email(&mut errors, &input.email);
    check_plaintext(&mut errors, &input.password);
    errors.into_result()?;

    let lookup = state
        .deadline
        .run(
            "get_by_email",
            state.principals.store().get_by_email(&input.email),
        )
        .await;
    let (identity, hash) = match lookup {
        Ok(found) => found,
        Err(StoreError::NotFound) => return Err(PipelineError::InvalidCredentials),
        Err(e) => return Err(e.into()),
    };

    if !verify_password(hash, input.password).await? {
        tracing::info!(principal_id = %identity.id, "Password mismatch");
        return Err(PipelineError::InvalidCredentials);
    }

    let token = state.issue_token(identity.id, Scope::Authentication).await?;
    tracing::info!(principal_id = %identity.id, "Authentication token issued");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    )
        .into_response())
}
