//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and addresses. All
//! problems are collected rather than stopping at the first one.

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::AppConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending key, e.g. `rate_limit.burst_size`.
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut check = |ok: bool, field: &'static str, message: &str| {
        if !ok {
            errors.push(ValidationError {
                field,
                message: message.to_string(),
            });
        }
    };

    check(
        config.listener.bind_address.parse::<SocketAddr>().is_ok(),
        "listener.bind_address",
        "must be a socket address",
    );

    let limiter = &config.rate_limit;
    if limiter.enabled {
        check(
            limiter.requests_per_second.is_finite() && limiter.requests_per_second > 0.0,
            "rate_limit.requests_per_second",
            "must be a positive number",
        );
        check(
            limiter.burst_size >= 1,
            "rate_limit.burst_size",
            "must be at least 1",
        );
        check(
            limiter.idle_window_secs > 0,
            "rate_limit.idle_window_secs",
            "must be greater than zero",
        );
        check(
            limiter.sweep_interval_secs > 0,
            "rate_limit.sweep_interval_secs",
            "must be greater than zero",
        );
    }

    check(
        config.timeouts.request_secs > 0,
        "timeouts.request_secs",
        "must be greater than zero",
    );
    check(
        config.timeouts.backend_secs > 0,
        "timeouts.backend_secs",
        "must be greater than zero",
    );
    check(
        config.tokens.activation_ttl_secs > 0,
        "tokens.activation_ttl_secs",
        "must be greater than zero",
    );
    check(
        config.tokens.authentication_ttl_secs > 0,
        "tokens.authentication_ttl_secs",
        "must be greater than zero",
    );

    let observability = &config.observability;
    check(
        LOG_LEVELS.contains(&observability.log_level.as_str()),
        "observability.log_level",
        "must be one of trace, debug, info, warn, error",
    );
    if observability.metrics_enabled {
        check(
            observability.metrics_address.parse::<SocketAddr>().is_ok(),
            "observability.metrics_address",
            "must be a socket address",
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
