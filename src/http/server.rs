//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up the pipeline layers in order
//! - Bind server to listener
//! - Coordinate graceful shutdown with background task draining

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{FromRef, Request},
    middleware,
    response::Response,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::token::{issue, AuthToken, Scope};
use crate::auth::{authenticate, AuthorizationGate, TokenAuthenticator};
use crate::concurrency::ConcurrencyGuard;
use crate::config::AppConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::http::handlers::{health, records, tokens, users};
use crate::http::request::{request_id, X_REQUEST_ID};
use crate::http::response::panic_response;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::resilience::Deadline;
use crate::security::rate_limit::{rate_limit, RateLimiter};
use crate::store::{MemoryPrincipalStore, MemoryRecordStore, PrincipalStore, RecordStore, ResourceId};
use crate::tasks::{BackgroundTaskRunner, DrainOutcome, LogNotifier, Notifier};

/// Maximum accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub limiter: RateLimiter,
    pub authenticator: TokenAuthenticator,
    pub gate: AuthorizationGate,
    pub records: ConcurrencyGuard<dyn RecordStore>,
    pub principals: ConcurrencyGuard<dyn PrincipalStore>,
    pub deadline: Deadline,
    pub tasks: BackgroundTaskRunner,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        records: Arc<dyn RecordStore>,
        principals: Arc<dyn PrincipalStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let deadline = Deadline::new(config.timeouts.backend());
        Self {
            limiter: RateLimiter::new(&config.rate_limit),
            authenticator: TokenAuthenticator::new(principals.clone(), deadline),
            gate: AuthorizationGate::new(principals.clone(), deadline),
            records: ConcurrencyGuard::new(records, deadline),
            principals: ConcurrencyGuard::new(principals, deadline),
            deadline,
            tasks: BackgroundTaskRunner::new(),
            notifier,
            config: Arc::new(config),
        }
    }

    /// State backed by empty in-memory stores and a logging notifier.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::new(
            config,
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryPrincipalStore::new()),
            Arc::new(LogNotifier),
        )
    }

    /// Issue and store a token for `principal_id`, valid for the configured
    /// lifetime of `scope`.
    pub async fn issue_token(
        &self,
        principal_id: ResourceId,
        scope: Scope,
    ) -> PipelineResult<AuthToken> {
        let ttl = match scope {
            Scope::Activation => self.config.tokens.activation_ttl(),
            Scope::Authentication => self.config.tokens.authentication_ttl(),
        };
        let token = self
            .deadline
            .run(
                "insert_token",
                issue(self.principals.store().as_ref(), principal_id, ttl, scope),
            )
            .await?;
        tracing::debug!(principal_id = %principal_id, scope = %scope, "Token issued");
        Ok(token)
    }
}

impl FromRef<AppState> for AuthorizationGate {
    fn from_ref(state: &AppState) -> Self {
        state.gate.clone()
    }
}

/// HTTP server for the API.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers listed last run first: request id, trace, body limit,
    /// timeout, panic recovery, metrics, rate limit, authentication.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        Router::new()
            .route("/v1/healthcheck", get(health::healthcheck))
            .route("/v1/records", get(records::list).post(records::create))
            .route(
                "/v1/records/{id}",
                get(records::show)
                    .patch(records::update)
                    .delete(records::delete),
            )
            .route("/v1/users", post(users::register))
            .route("/v1/users/activated", put(users::activate))
            .route("/v1/users/me", get(users::me))
            .route("/v1/users/me/permissions", get(users::my_permissions))
            .route(
                "/v1/tokens/authentication",
                post(tokens::create_authentication_token),
            )
            .fallback(not_found)
            .method_not_allowed_fallback(method_not_allowed)
            .layer(middleware::from_fn_with_state(state.clone(), authenticate))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
            .layer(middleware::from_fn(metrics::track_metrics))
            .layer(CatchPanicLayer::custom(recover_panic))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request| {
                    tracing::info_span!(
                        "request",
                        request_id = %request_id(request.headers()),
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                }),
            )
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
            .with_state(state)
    }

    /// The runner background work is scheduled on.
    pub fn tasks(&self) -> BackgroundTaskRunner {
        self.state.tasks.clone()
    }

    /// Serve until `shutdown` triggers, then let in-flight requests finish
    /// and drain background tasks, all within the configured grace period.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let grace = self.state.config.shutdown.grace_period();
        tracing::info!(
            address = %addr,
            environment = %self.state.config.environment,
            "HTTP server starting"
        );

        let _sweeper = self.state.limiter.spawn_sweeper(
            self.state.config.rate_limit.sweep_interval(),
            shutdown.signalled(),
        );

        let stop_signal = shutdown.signalled();

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.signalled())
            .into_future();
        tokio::pin!(server);

        let mut stopped = false;
        tokio::select! {
            result = &mut server => {
                result?;
                stopped = true;
            }
            _ = stop_signal => {}
        }
        let started = Instant::now();

        if !stopped {
            tracing::info!(grace_secs = grace.as_secs(), "Shutting down, finishing in-flight requests");
            match tokio::time::timeout(grace, &mut server).await {
                Ok(result) => result?,
                Err(_) => tracing::warn!("In-flight requests still running after grace period"),
            }
        }

        let remaining = grace.saturating_sub(started.elapsed());
        tracing::info!(in_flight = self.state.tasks.in_flight(), "Draining background tasks");
        if let DrainOutcome::TimedOut { remaining } = self.state.tasks.drain(remaining).await {
            tracing::warn!(remaining, "Abandoning unfinished background tasks");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.state.config
    }
}

fn recover_panic(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %detail, "Request handler panicked");
    panic_response()
}

async fn not_found() -> PipelineError {
    PipelineError::NotFound
}

async fn method_not_allowed() -> Response {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    (
        StatusCode::METHOD_NOT_ALLOWED,
        axum::Json(serde_json::json!({
            "error": "the method is not supported for this resource"
        })),
    )
        .into_response()
}
