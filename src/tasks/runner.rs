//! Fire-and-forget background work with panic isolation.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::Notify;

use crate::observability::metrics;

#[derive(Debug, Default)]
struct RunnerState {
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight count when the task ends, however it ends.
struct InFlight {
    state: Arc<RunnerState>,
}

impl InFlight {
    fn enter(state: &Arc<RunnerState>) -> Self {
        let count = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_tasks_in_flight(count);
        Self {
            state: Arc::clone(state),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let remaining = self.state.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_tasks_in_flight(remaining);
        if remaining == 0 {
            self.state.idle.notify_waiters();
        }
    }
}

/// How a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Drained,
    TimedOut { remaining: usize },
}

/// Runs deferred side effects outside the request that scheduled them.
///
/// Cheap to clone; all clones share one in-flight counter.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTaskRunner {
    state: Arc<RunnerState>,
}

impl BackgroundTaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `task` and return immediately.
    ///
    /// Errors and panics are logged at the task boundary; they never reach
    /// the caller or the server.
    pub fn schedule<F, E>(&self, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let guard = InFlight::enter(&self.state);
        tokio::spawn(async move {
            let _guard = guard;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {
                    tracing::debug!(task = name, "Background task finished");
                    metrics::record_background_task(name, "success");
                }
                Ok(Err(e)) => {
                    tracing::error!(task = name, error = %e, "Background task failed");
                    metrics::record_background_task(name, "error");
                }
                Err(panic) => {
                    tracing::error!(task = name, panic = %panic_message(panic.as_ref()), "Background task panicked");
                    metrics::record_background_task(name, "panic");
                }
            }
        });
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Wait for every scheduled task to finish, up to `grace`.
    pub async fn drain(&self, grace: Duration) -> DrainOutcome {
        let wait = async {
            loop {
                let idle = self.state.idle.notified();
                tokio::pin!(idle);
                idle.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                idle.await;
            }
        };

        match tokio::time::timeout(grace, wait).await {
            Ok(()) => {
                tracing::info!("Background tasks drained");
                DrainOutcome::Drained
            }
            Err(_) => {
                let remaining = self.in_flight();
                tracing::warn!(remaining, "Background tasks still running after grace period");
                DrainOutcome::TimedOut { remaining }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
