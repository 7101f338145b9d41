//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the API.
//! All types derive Serde traits for deserialization from config files.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment (development, staging, production).
    pub environment: String,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Request and backend deadlines.
    pub timeouts: TimeoutConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Token lifetimes.
    pub tokens: TokenConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            listener: ListenerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            shutdown: ShutdownConfig::default(),
            tokens: TokenConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:4000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:4000".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained permits per second per client.
    pub requests_per_second: f64,

    /// Bucket capacity.
    pub burst_size: u32,

    /// Clients unseen for longer than this are evicted.
    pub idle_window_secs: u64,

    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,

    /// Derive the client key from X-Real-IP / X-Forwarded-For.
    /// Only enable behind a proxy that overwrites these headers.
    pub trust_forwarded_headers: bool,
}

impl RateLimitConfig {
    pub fn idle_window(&self) -> Duration {
        Duration::from_secs(self.idle_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 2.0,
            burst_size: 4,
            idle_window_secs: 180,
            sweep_interval_secs: 60,
            trust_forwarded_headers: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for a request/response in seconds.
    pub request_secs: u64,

    /// Deadline for a single store call in seconds.
    pub backend_secs: u64,
}

impl TimeoutConfig {
    pub fn backend(&self) -> Duration {
        Duration::from_secs(self.backend_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 10,
            backend_secs: 3,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight requests and background tasks to finish.
    pub grace_period_secs: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
        }
    }
}

/// Token lifetimes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Activation token lifetime in seconds (default 3 days).
    pub activation_ttl_secs: u64,

    /// Authentication token lifetime in seconds (default 24 hours).
    pub authentication_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            activation_ttl_secs: 3 * 24 * 60 * 60,
            authentication_ttl_secs: 24 * 60 * 60,
        }
    }
}

impl TokenConfig {
    pub fn activation_ttl(&self) -> TimeDelta {
        seconds_to_delta(self.activation_ttl_secs)
    }

    pub fn authentication_ttl(&self) -> TimeDelta {
        seconds_to_delta(self.authentication_ttl_secs)
    }
}

fn seconds_to_delta(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
