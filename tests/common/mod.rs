//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use greenlight::auth::token::Scope;
use greenlight::auth::{Identity, NewPrincipal, PasswordHash};
use greenlight::config::AppConfig;
use greenlight::http::{AppState, HttpServer};
use greenlight::lifecycle::Shutdown;
use greenlight::store::{MemoryPrincipalStore, MemoryRecordStore, PrincipalStore};
use greenlight::tasks::{BackgroundTaskRunner, LogNotifier, Notification, Notifier, NotifyError};

/// A running server plus handles on its stores.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub principals: Arc<MemoryPrincipalStore>,
    pub records: Arc<MemoryRecordStore>,
    pub tasks: BackgroundTaskRunner,
    pub state: AppState,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

/// Defaults with rate limiting off so tests can make as many calls as they
/// like; rate limit tests turn it back on.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit.enabled = false;
    config.shutdown.grace_period_secs = 5;
    config
}

pub async fn spawn_app(config: AppConfig) -> TestApp {
    spawn_app_with_notifier(config, Arc::new(LogNotifier)).await
}

pub async fn spawn_app_with_notifier(config: AppConfig, notifier: Arc<dyn Notifier>) -> TestApp {
    let principals = Arc::new(MemoryPrincipalStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    let state = AppState::new(config, records.clone(), principals.clone(), notifier);

    let server = HttpServer::new(state.clone());
    let tasks = server.tasks();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestApp {
        addr,
        client,
        principals,
        records,
        tasks,
        state,
        shutdown,
        handle,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Create a principal, grant `permissions` and return it with a live
    /// authentication token.
    pub async fn seed_principal(
        &self,
        email: &str,
        activated: bool,
        permissions: &[&str],
    ) -> (Identity, String) {
        let identity = self
            .principals
            .insert(
                NewPrincipal::new("Test User", email, PasswordHash::new("stored-hash").unwrap())
                    .activated(activated),
            )
            .await
            .unwrap();
        if !permissions.is_empty() {
            self.principals
                .grant_permissions(identity.id, permissions)
                .await
                .unwrap();
        }
        let token = self.issue_token(&identity, Scope::Authentication).await;
        (identity, token)
    }

    pub async fn issue_token(&self, identity: &Identity, scope: Scope) -> String {
        self.state
            .issue_token(identity.id, scope)
            .await
            .unwrap()
            .plaintext
            .expose()
            .to_string()
    }

    pub async fn stop(self) -> std::io::Result<()> {
        self.shutdown.trigger();
        self.handle.await.unwrap()
    }
}

/// Notifier that remembers what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, Notification)>>,
    pub delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn slow(delay: Duration) -> Self {
        Self {
            sent: Mutex::default(),
            delay: Some(delay),
        }
    }

    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, notification: Notification) -> Result<(), NotifyError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), notification));
        Ok(())
    }
}

/// Notifier whose every delivery panics.
pub struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    async fn send(&self, _recipient: &str, _notification: Notification) -> Result<(), NotifyError> {
        panic!("mail relay exploded");
    }
}
