//! Metrics collection and exposition.
//!
//! # Metrics
//! - `greenlight_requests_received_total` (counter)
//! - `greenlight_responses_sent_total` (counter): by status
//! - `greenlight_request_duration_seconds` (histogram)
//! - `greenlight_rate_limited_total` (counter)
//! - `greenlight_rate_limiter_clients` (gauge): live limiter entries
//! - `greenlight_edit_conflicts_total` (counter): by resource kind
//! - `greenlight_background_tasks_total` (counter): by task, outcome
//! - `greenlight_background_tasks_in_flight` (gauge)
//!
//! Recording is a no-op until a recorder is installed, so tests and
//! metrics-disabled deployments pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Middleware counting requests, responses and processing time.
pub async fn track_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    counter!("greenlight_requests_received_total").increment(1);

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!("greenlight_responses_sent_total", "status" => status).increment(1);
    histogram!("greenlight_request_duration_seconds").record(start.elapsed().as_secs_f64());
    response
}

pub fn record_rate_limited() {
    counter!("greenlight_rate_limited_total").increment(1);
}

pub fn record_limiter_clients(count: usize) {
    gauge!("greenlight_rate_limiter_clients").set(count as f64);
}

pub fn record_edit_conflict(kind: &'static str) {
    counter!("greenlight_edit_conflicts_total", "kind" => kind).increment(1);
}

pub fn record_background_task(task: &'static str, outcome: &'static str) {
    counter!("greenlight_background_tasks_total", "task" => task, "outcome" => outcome)
        .increment(1);
}

pub fn record_tasks_in_flight(count: usize) {
    gauge!("greenlight_background_tasks_in_flight").set(count as f64);
}
