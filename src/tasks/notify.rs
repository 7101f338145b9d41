//! Outbound notifications sent from background tasks.

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::token::TokenPlaintext;
use crate::store::ResourceId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Sent on registration; carries the token that activates the account.
    Welcome {
        principal_id: ResourceId,
        name: String,
        activation_token: TokenPlaintext,
    },
    /// Sent once an account has been activated.
    AccountActivated { principal_id: ResourceId, name: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Welcome { .. } => "welcome",
            Notification::AccountActivated { .. } => "account_activated",
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivery channel for notifications (mail, chat, queue).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, notification: Notification) -> Result<(), NotifyError>;
}

/// Notifier that only writes a log line. Recipient addresses are not logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, _recipient: &str, notification: Notification) -> Result<(), NotifyError> {
        let (Notification::Welcome { principal_id, .. }
        | Notification::AccountActivated { principal_id, .. }) = &notification;
        tracing::info!(
            principal_id = %principal_id,
            kind = notification.kind(),
            "Notification delivered"
        );
        Ok(())
    }
}
