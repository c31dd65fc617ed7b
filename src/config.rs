//! Configuration loading and constants.
//!
//! Two kinds of configuration feed an invocation. `Configuration` describes a single
//! ping (target request, deployment metadata, notification settings) and is loaded
//! from a JSON or TOML file. `HandlerOptions` carries process-level knobs (timeouts,
//! TLS relaxation, template overrides) read once from the environment.

use const_format::formatcp;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::duration::parse_iso8601;

// =============================================================================
// Time Unit Constants
// =============================================================================

/// Seconds in a minute
pub const SECONDS_PER_MINUTE: u64 = 60;
/// Seconds in an hour
pub const SECONDS_PER_HOUR: u64 = 3600;
/// Seconds in a day
pub const SECONDS_PER_DAY: u64 = 86400;

// =============================================================================
// Timeout Defaults
// =============================================================================

/// Default connect timeout for the health-check request (PT20S)
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 20;

/// Default overall timeout for the health-check request (PT120S)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// Environment Variables
// =============================================================================

const ENV_PREFIX: &str = "CALLCULON_";

/// ISO-8601 connect timeout override
pub const ENV_CONNECT_TIMEOUT: &str = formatcp!("{}CONNECT_TIMEOUT", ENV_PREFIX);

/// ISO-8601 request timeout override
pub const ENV_REQUEST_TIMEOUT: &str = formatcp!("{}REQUEST_TIMEOUT", ENV_PREFIX);

/// Accept certificates that do not chain to a trusted root ("true"/"1")
pub const ENV_RELAXED_TLS: &str = formatcp!("{}RELAXED_TLS", ENV_PREFIX);

/// Directory holding replacement Slack message templates
pub const ENV_TEMPLATE_DIR: &str = formatcp!("{}TEMPLATE_DIR", ENV_PREFIX);

// =============================================================================
// Secrets, Templates and Strings
// =============================================================================

/// Token identifier for secrets held in AWS SSM Parameter Store
pub const PARAMETER_STORE_IDENTIFIER: &str = "aws-secret";

/// Template name for successful checks
pub const SUCCESS_TEMPLATE: &str = "slack-success.json";

/// Template name for failed checks
pub const FAILURE_TEMPLATE: &str = "slack-failure.json";

/// Full-width asterisk; Slack treats `*` as bold markup
pub const CRON_ASTERISK_LOOKALIKE: char = '\u{FF0A}';

/// User agent sent with the health-check and webhook requests
pub const USER_AGENT: &str = formatcp!("callculon/{}", env!("CARGO_PKG_VERSION"));

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "callculon=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

// =============================================================================
// Invocation Configuration
// =============================================================================

/// Everything needed to perform and report a single ping.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    /// Name of this check, shown in notifications
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub deployment: Deployment,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub notification: Notification,
}

/// Metadata describing how the check was deployed. Only reported, never executed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    pub enabled: bool,
    /// Schedule the external trigger runs on
    pub cron: String,
    pub product: String,
    pub version: String,
    pub id: String,
    pub environment: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[serde(alias = "HTTP")]
    Http,
    #[default]
    #[serde(alias = "HTTPS")]
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Https => write!(f, "https"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    #[default]
    #[serde(alias = "get")]
    Get,
}

/// The request to send. Path and header values may contain secret tokens.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestConfig {
    /// Defaults to HTTPS when unset
    pub protocol: Option<Protocol>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    pub method: RequestMethod,
    /// Sent in the order they are configured
    pub headers: IndexMap<String, String>,
}

impl RequestConfig {
    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Notification {
    pub slack: Option<SlackConfig>,
}

/// Slack webhook settings. The webhook may contain secret tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    pub webhook: String,
    #[serde(default)]
    pub channel: String,
    /// Notify when the check fails (default: true)
    #[serde(default = "SlackConfig::default_on_failure")]
    pub on_failure: bool,
    /// Notify when the check succeeds (default: false)
    #[serde(default)]
    pub on_success: bool,
}

impl SlackConfig {
    fn default_on_failure() -> bool {
        true
    }
}

impl Configuration {
    /// Load a configuration file. `.json` files are parsed as JSON, anything else as TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents)?
        };
        Ok(config)
    }
}

// =============================================================================
// Handler Options
// =============================================================================

/// Process-level options, constructed once per invocation setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Accept certificates that do not chain to a trusted root
    pub relaxed_tls: bool,
    /// Directory with replacement message templates
    pub template_dir: Option<PathBuf>,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            relaxed_tls: false,
            template_dir: None,
        }
    }
}

impl HandlerOptions {
    /// Read options from the process environment
    pub fn from_env() -> Self {
        Self::from_env_vars(&std::env::vars().collect())
    }

    /// Read options from a set of environment variables.
    ///
    /// Missing or unparsable timeouts fall back to their defaults with a warning.
    pub fn from_env_vars(env: &HashMap<String, String>) -> Self {
        let defaults = Self::default();
        Self {
            connect_timeout: duration_var(env, ENV_CONNECT_TIMEOUT, defaults.connect_timeout),
            request_timeout: duration_var(env, ENV_REQUEST_TIMEOUT, defaults.request_timeout),
            relaxed_tls: env
                .get(ENV_RELAXED_TLS)
                .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")),
            template_dir: env
                .get(ENV_TEMPLATE_DIR)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        }
    }
}

fn duration_var(env: &HashMap<String, String>, name: &str, default: Duration) -> Duration {
    let Some(raw) = env.get(name) else {
        return default;
    };
    match parse_iso8601(raw) {
        Some(duration) => duration,
        None => {
            tracing::warn!(variable = name, value = %raw, "Unparsable ISO-8601 duration, using default");
            default
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}
