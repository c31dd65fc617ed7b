use crate::config::ConfigError;
use crate::notify::NotificationError;
use crate::secrets::SecretError;

/// Errors that abort an invocation before a result can be produced.
///
/// Network failures of the health check or the notification never show up here;
/// they are reported in the [`InvocationResult`](crate::invoker::InvocationResult).
#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to set up notifications: {0}")]
    Notifier(#[from] NotificationError),
}
