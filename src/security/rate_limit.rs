//! Per-client token-bucket rate limiting.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::http::AppState;
use crate::observability::metrics;
use crate::security::client_key::client_key;

/// A simple token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    /// A bucket seen for the first time starts full.
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

#[derive(Debug)]
struct LimiterState {
    clients: Mutex<HashMap<String, ClientEntry>>,
    rate: f64,
    burst: f64,
    idle_window: Duration,
}

impl LimiterState {
    fn clients(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission control keyed by client. Cheap to clone.
///
/// The client table is private; `allow` and `sweep` are its only writers
/// and both take the same mutex.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Option<Arc<LimiterState>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self {
            inner: Some(Arc::new(LimiterState {
                clients: Mutex::new(HashMap::new()),
                rate: config.requests_per_second,
                burst: f64::from(config.burst_size),
                idle_window: config.idle_window(),
            })),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Consume one token for `client`, creating its bucket on first sight.
    /// A rejected call leaves the bucket's token count as it was after refill.
    pub fn allow(&self, client: &str) -> bool {
        let Some(state) = &self.inner else {
            return true;
        };
        let now = Instant::now();
        let mut clients = state.clients();

        let entry = clients
            .entry(client.to_string())
            .or_insert_with(|| ClientEntry {
                bucket: TokenBucket::new(state.burst, now),
                last_seen: now,
            });
        entry.last_seen = now;
        entry.bucket.try_acquire(state.burst, state.rate, now)
    }

    /// Evict clients idle for longer than the idle window. Returns how many
    /// were removed.
    pub fn sweep(&self) -> usize {
        let Some(state) = &self.inner else {
            return 0;
        };
        let now = Instant::now();
        let mut clients = state.clients();
        let before = clients.len();
        clients.retain(|_, entry| now.duration_since(entry.last_seen) <= state.idle_window);
        metrics::record_limiter_clients(clients.len());
        before - clients.len()
    }

    pub fn client_count(&self) -> usize {
        self.inner
            .as_ref()
            .map(|state| state.clients().len())
            .unwrap_or(0)
    }

    /// Run `sweep` every `interval` until shutdown is signalled.
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }
        let limiter = self.clone();
        Some(tokio::spawn(async move {
            tokio::pin!(shutdown);
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.sweep();
                        if evicted > 0 {
                            tracing::debug!(evicted, remaining = limiter.client_count(), "Evicted idle rate limiter clients");
                        }
                    }
                    _ = &mut shutdown => {
                        tracing::debug!("Rate limiter sweeper stopping");
                        break;
                    }
                }
            }
        }))
    }
}

/// Middleware rejecting clients that have exhausted their bucket.
pub async fn rate_limit(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> PipelineResult<Response> {
    if !state.limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let key = client_key(&request, state.config.rate_limit.trust_forwarded_headers)?;
    if state.limiter.allow(&key) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        Err(PipelineError::RateLimited)
    }
}
