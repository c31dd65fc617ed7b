//! Outcome notifications.
//!
//! After the health check has run, the invoker hands a [`NotificationContext`] to a
//! [`Notifier`], calling `on_success` or `on_failure` depending on the status code.
//! Notifiers decide for themselves whether the configuration asks for a message.

pub mod slack;

use async_trait::async_trait;

use crate::config::Configuration;
use crate::secrets::{SecretError, SecretProcessor};

pub use slack::SlackNotifier;

/// What happened during one health check, as seen by a notifier.
pub struct NotificationContext<'a> {
    /// Resolves tokens in notification settings, e.g. the webhook URL
    pub secrets: &'a dyn SecretProcessor,
    pub config: &'a Configuration,
    /// URL the health-check request was sent to
    pub url: String,
    /// HTTP status of the check, 0 when the request could not be sent
    pub status_code: u16,
    /// Overrides the generated note
    pub note: Option<String>,
    /// Span of the invocation, for diagnostic logging
    pub span: tracing::Span,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Never carries the webhook URL
    #[error("Failed to send notification: {0}")]
    Send(reqwest::Error),

    #[error("Failed to render notification: {0}")]
    Template(#[from] tera::Error),

    #[error("Failed to resolve notification secrets: {0}")]
    Secret(#[from] SecretError),
}

impl From<reqwest::Error> for NotificationError {
    fn from(e: reqwest::Error) -> Self {
        // Webhook URLs are credentials
        NotificationError::Send(e.without_url())
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn on_success(&self, ctx: &NotificationContext<'_>) -> Result<(), NotificationError>;

    async fn on_failure(&self, ctx: &NotificationContext<'_>) -> Result<(), NotificationError>;
}
