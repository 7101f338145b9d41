//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_key.rs (peer address, or forwarded IP when trusted)
//!     → rate_limit.rs (per-client token bucket)
//!     → auth (credential resolution)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a request whose client cannot be identified is an error
//! - No trust in client input: forwarding headers are opt-in
//! - Idle clients are swept so memory stays bounded under churn

pub mod client_key;
pub mod rate_limit;

pub use rate_limit::RateLimiter;
