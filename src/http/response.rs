//! Mapping pipeline errors to HTTP responses.
//!
//! # Design Decisions
//! - Every error body is JSON: `{"error": <message or field map>}`
//! - Internal details are logged here and replaced with a generic message

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};

use crate::error::{AuthorizationError, FieldErrors, PipelineError};

const INTERNAL_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

fn field_map(errors: &FieldErrors) -> Value {
    let map: Map<String, Value> = errors
        .iter()
        .map(|(field, msg)| (field.to_string(), Value::String(msg.to_string())))
        .collect();
    Value::Object(map)
}

fn error_body(status: StatusCode, error: Value) -> Response {
    (status, Json(json!({ "error": error }))).into_response()
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            PipelineError::Validation(errors) => {
                error_body(StatusCode::UNPROCESSABLE_ENTITY, field_map(&errors))
            }
            PipelineError::Duplicate { field } => {
                let message = format!("a record with this {} already exists", field);
                error_body(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ field: message }),
                )
            }
            PipelineError::MalformedRequest(message) => {
                error_body(StatusCode::BAD_REQUEST, Value::String(message))
            }
            PipelineError::Authentication => {
                let mut response = error_body(
                    StatusCode::UNAUTHORIZED,
                    Value::String(PipelineError::Authentication.to_string()),
                );
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            err @ PipelineError::InvalidCredentials => {
                error_body(StatusCode::UNAUTHORIZED, Value::String(err.to_string()))
            }
            PipelineError::Authorization(reason) => {
                let status = match reason {
                    AuthorizationError::Unauthenticated => StatusCode::UNAUTHORIZED,
                    AuthorizationError::Inactive | AuthorizationError::Forbidden => {
                        StatusCode::FORBIDDEN
                    }
                };
                error_body(status, Value::String(reason.to_string()))
            }
            err @ PipelineError::RateLimited => {
                error_body(StatusCode::TOO_MANY_REQUESTS, Value::String(err.to_string()))
            }
            err @ PipelineError::Conflict => {
                error_body(StatusCode::CONFLICT, Value::String(err.to_string()))
            }
            err @ PipelineError::NotFound => {
                error_body(StatusCode::NOT_FOUND, Value::String(err.to_string()))
            }
            PipelineError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Value::String(INTERNAL_MESSAGE.to_string()),
                )
            }
        }
    }
}

/// Response for a request whose handler panicked.
pub fn panic_response() -> Response {
    let mut response = error_body(
        StatusCode::INTERNAL_SERVER_ERROR,
        Value::String(INTERNAL_MESSAGE.to_string()),
    );
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
