//! Background task execution.
//!
//! # Data Flow
//! ```text
//! handler
//!     → runner.schedule(name, future)   (returns immediately)
//!     → tokio::spawn + catch_unwind     (fault isolated per task)
//!     → in-flight counter
//!
//! shutdown
//!     → runner.drain(grace)             (waits for counter to reach zero)
//! ```
//!
//! # Design Decisions
//! - A failing or panicking task is logged and counted, nothing more
//! - Tasks outlive the request that scheduled them, including client
//!   disconnects
//! - No ordering between tasks

pub mod notify;
pub mod runner;

pub use notify::{LogNotifier, Notification, Notifier, NotifyError};
pub use runner::{BackgroundTaskRunner, DrainOutcome};
