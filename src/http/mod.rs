//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request id, trace, body limit, timeout, panic recovery,
//!                  metrics, rate limit, authentication)
//!     → handlers/ (authorization extractors, then the operation)
//!     → response.rs (pipeline errors → status codes + JSON bodies)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
