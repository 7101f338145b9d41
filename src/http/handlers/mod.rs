//! Route handlers and their shared extractors.

pub mod health;
pub mod records;
pub mod tokens;
pub mod users;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{PipelineError, PipelineResult};
use crate::store::ResourceId;

/// JSON body extractor whose failures are pipeline errors (400).
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = PipelineError;

    async fn from_request(req: Request, state: &S) -> PipelineResult<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(malformed_body(rejection)),
        }
    }
}

fn malformed_body(rejection: JsonRejection) -> PipelineError {
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "body must have a Content-Type of application/json".to_string()
        }
        JsonRejection::JsonSyntaxError(_) => "body contains badly-formed JSON".to_string(),
        JsonRejection::BytesRejection(_) => "body could not be read or is too large".to_string(),
        other => other.body_text(),
    };
    PipelineError::MalformedRequest(message)
}

/// `{id}` path parameter. Anything but a positive integer is a 404.
#[derive(Debug, Clone, Copy)]
pub struct RecordId(pub ResourceId);

impl<S: Send + Sync> FromRequestParts<S> for RecordId {
    type Rejection = PipelineError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> PipelineResult<Self> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| PipelineError::NotFound)?;
        ResourceId::parse(&raw)
            .map(Self)
            .ok_or(PipelineError::NotFound)
    }
}
