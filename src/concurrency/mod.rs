//! Optimistic concurrency control.
//!
//! # Data Flow
//! ```text
//! handler reads resource (id, version)
//!     → guard.rs update(id, read_version, changes)
//!     → store conditional write: WHERE id = ? AND version = ?
//!     → new version, or Conflict if another writer got there first
//! ```
//!
//! # Design Decisions
//! - No locks are held between read and write
//! - Conflicts go back to the client; the guard never retries
//! - Works over any `VersionedStore`, including trait objects

pub mod guard;

pub use guard::ConcurrencyGuard;
