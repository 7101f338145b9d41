//! Pipeline error taxonomy.
//!
//! Every layer fails fast with one of these variants; the HTTP boundary
//! (`http::response`) is the only place that turns them into status codes.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Field-keyed validation messages, first message per field wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless the field already has one.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    /// Record `message` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Convert into a `Result`, failing when any field has a message.
    pub fn into_result(self) -> Result<(), PipelineError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, msg)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field, msg)?;
        }
        Ok(())
    }
}

/// Why the authorization gate refused a principal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("you must be authenticated to access this resource")]
    Unauthenticated,

    #[error("your user account must be activated to access this resource")]
    Inactive,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    Forbidden,
}

/// Errors surfaced by the request pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed input to a core operation.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// Request body or parameters could not be decoded.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Missing, invalid, expired or wrong-scope credential.
    #[error("invalid or missing authentication token")]
    Authentication,

    /// Email and password do not identify an account.
    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error("rate limit exceeded")]
    RateLimited,

    /// The resource changed since it was read.
    #[error("unable to update the record due to an edit conflict, please try again")]
    Conflict,

    /// Input collides with existing data on a unique field.
    #[error("a record with this {field} already exists")]
    Duplicate { field: String },

    #[error("the requested resource could not be found")]
    NotFound,

    /// Infrastructure failure or unrecovered fault. Never shown to clients.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn internal(context: impl fmt::Display) -> Self {
        Self::Internal(context.to_string())
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
