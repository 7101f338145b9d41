//! Request identification.
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing (`SetRequestIdLayer`
//!   is the outermost layer) and echoed back on the response
//! - Client-supplied IDs are kept so calls can be correlated across services

use axum::http::{HeaderMap, HeaderName};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request ID set by the request-id layer, or `"unknown"` outside it.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}
