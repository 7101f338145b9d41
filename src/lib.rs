//! greenlight request pipeline library.
//!
//! Turns an untrusted HTTP request into an authorized, rate-controlled,
//! consistency-safe operation against shared resources.

pub mod auth;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;
pub mod store;
pub mod tasks;

pub use config::AppConfig;
pub use error::{PipelineError, PipelineResult};
pub use http::{AppState, HttpServer};
pub use lifecycle::Shutdown;
