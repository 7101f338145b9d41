//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Store call made for a request:
//!     → timeouts.rs (enforce backend deadline)
//!     → on timeout: InternalError at the HTTP boundary
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every backend call has a deadline
//! - No automatic retries: a conflict is reported, the caller decides

pub mod timeouts;

pub use timeouts::Deadline;
