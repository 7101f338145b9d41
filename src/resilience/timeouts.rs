//! Timeout enforcement for backend calls.
//!
//! # Design Decisions
//! - Every store call made on behalf of a request runs under a deadline
//! - Timeouts surface as `StoreError::Timeout`, which the pipeline treats
//!   as an internal error
//! - Background tasks are never wrapped; they are not bound by request deadlines

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::store::{StoreError, StoreResult};

/// A per-call deadline for backend operations.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Run `call`, failing with `StoreError::Timeout` once the deadline passes.
    pub async fn run<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    operation,
                    limit_ms = self.limit.as_millis() as u64,
                    "Backend call timed out"
                );
                Err(StoreError::Timeout(operation))
            }
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let deadline = Deadline::new(Duration::from_secs(3));
        let result: StoreResult<()> = deadline
            .run("slow", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(StoreError::Timeout("slow"))));
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let deadline = Deadline::default();
        let result = deadline.run("fast", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let result: StoreResult<()> = deadline
            .run("fast", async { Err(StoreError::NotFound) })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }
}
