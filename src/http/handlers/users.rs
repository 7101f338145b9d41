//! `/v1/users` handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::password::{check_plaintext, hash_password};
use crate::auth::principal::{check_email, check_name, codes};
use crate::auth::token::{validate_plaintext, Scope};
use crate::auth::{Activated, Authenticated, NewPrincipal};
use crate::error::{FieldErrors, PipelineError, PipelineResult};
use crate::http::handlers::ApiJson;
use crate::http::AppState;
use crate::store::{PrincipalStore, Revise, StoreError};
use crate::tasks::Notification;

/// Holds a plaintext password, so it has no `Debug`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistrationInput {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

impl RegistrationInput {
    fn validate(&self) -> PipelineResult<()> {
        let mut errors = FieldErrors::new();
        check_name(&mut errors, &self.name);
        check_email(&mut errors, &self.email);
        check_plaintext(&mut errors, &self.password);
        errors.into_result()
    }
}

/// `POST /v1/users`
///
/// Creates an inactive principal with read access to records, issues an
/// activation token and hands it to the notifier in the background.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<RegistrationInput>,
) -> PipelineResult<Response> {
    input.validate()?;
    let RegistrationInput {
        name,
        email,
        password,
    } = input;
    let password_hash = hash_password(password).await?;

    let inserted = state
        .deadline
        .run(
            "insert_principal",
            state
                .principals
                .store()
                .insert(NewPrincipal::new(name, email, password_hash)),
        )
        .await;
    let identity = match inserted {
        Ok(identity) => identity,
        Err(StoreError::DuplicateKey { field: "email" }) => {
            return Err(PipelineError::invalid(
                "email",
                "a user with this email address already exists",
            ))
        }
        Err(e) => return Err(e.into()),
    };

    state
        .deadline
        .run(
            "grant_permissions",
            state
                .principals
                .store()
                .grant_permissions(identity.id, &[codes::RECORDS_READ]),
        )
        .await?;

    let token = state.issue_token(identity.id, Scope::Activation).await?;

    let notifier = state.notifier.clone();
    let recipient = identity.email.clone();
    let notification = Notification::Welcome {
        principal_id: identity.id,
        name: identity.name.clone(),
        activation_token: token.plaintext,
    };
    state.tasks.schedule("welcome_notice", async move {
        notifier.send(&recipient, notification).await
    });

    tracing::info!(principal_id = %identity.id, "Principal registered");
    Ok((StatusCode::CREATED, Json(json!({ "user": identity }))).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivationInput {
    token: String,
}

/// `PUT /v1/users/activated`
///
/// Redeems an activation token: marks the owner activated with a versioned
/// write, revokes every activation token they hold, then hands the welcome
/// notification to the background runner.
pub async fn activate(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ActivationInput>,
) -> PipelineResult<Json<Value>> {
    validate_plaintext(&input.token).map_err(PipelineError::Validation)?;

    let identity = match state
        .authenticator
        .resolve_token(&input.token, Scope::Activation)
        .await
    {
        Ok(identity) => identity,
        Err(PipelineError::Authentication) => {
            return Err(PipelineError::invalid(
                "token",
                "invalid or expired activation token",
            ))
        }
        Err(e) => return Err(e),
    };

    let mut changes = identity.changes();
    changes.activated = true;
    let version = state
        .principals
        .update(identity.id, identity.version, changes.clone())
        .await?;

    state
        .deadline
        .run(
            "invalidate_tokens",
            state
                .principals
                .store()
                .invalidate_tokens(identity.id, Scope::Activation),
        )
        .await?;

    let notifier = state.notifier.clone();
    let recipient = identity.email.clone();
    let notification = Notification::AccountActivated {
        principal_id: identity.id,
        name: identity.name.clone(),
    };
    state.tasks.schedule("activation_notice", async move {
        notifier.send(&recipient, notification).await
    });

    tracing::info!(principal_id = %identity.id, version = %version, "Account activated");
    let user = identity.revise(changes, version);
    Ok(Json(json!({ "user": user })))
}

/// `GET /v1/users/me`
pub async fn me(Authenticated(identity): Authenticated) -> Json<Value> {
    Json(json!({ "user": identity }))
}

/// `GET /v1/users/me/permissions`
pub async fn my_permissions(
    Activated(identity): Activated,
    State(state): State<AppState>,
) -> PipelineResult<Json<Value>> {
    let permissions = state
        .deadline
        .run(
            "permissions_for",
            state.principals.store().permissions_for(identity.id),
        )
        .await?;
    Ok(Json(json!({ "permissions": permissions.sorted() })))
}
