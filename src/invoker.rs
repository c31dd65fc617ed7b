//! Health-check orchestration.
//!
//! One invocation walks a fixed sequence: validate the request configuration, build
//! the request (resolving secrets in the path and header values), send it, classify
//! the status, notify, and return an [`InvocationResult`].
//!
//! Configuration and secret errors abort the invocation. Transport failures become
//! status code 0 and notification failures become a flag on the result, so any
//! check that got as far as sending always produces a result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Serialize, Serializer};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{Configuration, HandlerOptions, Protocol, RequestConfig, USER_AGENT};
use crate::duration::format_iso8601;
use crate::error::InvocationError;
use crate::notify::{NotificationContext, Notifier};
use crate::secrets::{self, SecretProcessor};

/// What the caller gets back from an invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    /// HTTP status of the check, 0 when the request could not be sent
    pub status_code: u16,
    /// When the request was sent
    pub request_time: DateTime<Utc>,
    /// Time spent waiting for the response, as ISO-8601
    #[serde(serialize_with = "serialize_iso8601")]
    pub duration: Duration,
    /// Sending the notification failed
    pub notification_error: bool,
}

fn serialize_iso8601<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_iso8601(*duration))
}

/// Classification of a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Success,
    Failure,
}

impl CheckOutcome {
    /// Only 2xx is a success; everything else, including 0, is a failure
    pub fn from_status(status_code: u16) -> Self {
        if (200..300).contains(&status_code) {
            CheckOutcome::Success
        } else {
            CheckOutcome::Failure
        }
    }
}

/// The validated pieces of a request configuration
#[derive(Debug)]
struct Target<'a> {
    protocol: Protocol,
    hostname: &'a str,
    port: u16,
    path: &'a str,
    headers: &'a IndexMap<String, String>,
}

fn validate(request: &RequestConfig) -> Result<Target<'_>, InvocationError> {
    let hostname = request
        .hostname
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| InvocationError::InvalidConfiguration("request.hostname is required".to_string()))?;
    let path = request
        .path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| InvocationError::InvalidConfiguration("request.path is required".to_string()))?;
    let port = request
        .port
        .filter(|p| *p != 0)
        .ok_or_else(|| InvocationError::InvalidConfiguration("request.port is required".to_string()))?;

    Ok(Target {
        protocol: request.protocol(),
        hostname,
        port,
        path,
        headers: &request.headers,
    })
}

/// `protocol://hostname:port/path`, adding the slash only when the path lacks one
fn compose_url(protocol: Protocol, hostname: &str, port: u16, path: &str) -> String {
    let separator = if path.starts_with('/') { "" } else { "/" };
    format!("{}://{}:{}{}{}", protocol, hostname, port, separator, path)
}

/// Runs health checks against configured targets.
#[derive(Clone)]
pub struct Invoker {
    options: HandlerOptions,
    http_client: reqwest::Client,
    secrets: Arc<dyn SecretProcessor>,
    notifier: Arc<dyn Notifier>,
}

impl Invoker {
    pub fn new(
        options: HandlerOptions,
        secrets: Arc<dyn SecretProcessor>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, InvocationError> {
        // Redirects must surface as observed status codes
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(options.connect_timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(options.relaxed_tls)
            .build()?;

        Ok(Self {
            options,
            http_client,
            secrets,
            notifier,
        })
    }

    /// Perform one health check and report it.
    pub async fn invoke(&self, config: &Configuration) -> Result<InvocationResult, InvocationError> {
        let span = tracing::info_span!(
            "invocation",
            name = %config.name,
            id = %Uuid::new_v4(),
        );
        self.run(config).instrument(span).await
    }

    async fn run(&self, config: &Configuration) -> Result<InvocationResult, InvocationError> {
        let target = validate(&config.request)?;
        let (url, request) = self.build_request(&target).await?;

        tracing::debug!(
            host = %target.hostname,
            port = target.port,
            "Sending health-check request"
        );
        let request_time = Utc::now();
        let started = Instant::now();
        let status_code = match self.http_client.execute(request).await {
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                // The URL may carry resolved secrets
                tracing::warn!(error = %e.without_url(), "Health-check request failed");
                0
            }
        };
        let duration = started.elapsed();

        let outcome = CheckOutcome::from_status(status_code);
        tracing::info!(
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            outcome = ?outcome,
            "Health check complete"
        );

        let ctx = NotificationContext {
            secrets: self.secrets.as_ref(),
            config,
            url,
            status_code,
            note: None,
            span: tracing::Span::current(),
        };
        let notified = match outcome {
            CheckOutcome::Success => self.notifier.on_success(&ctx).await,
            CheckOutcome::Failure => self.notifier.on_failure(&ctx).await,
        };
        let notification_error = match notified {
            Ok(()) => false,
            Err(e) => {
                tracing::error!(error = %e, "Failed to send notification");
                true
            }
        };

        Ok(InvocationResult {
            status_code,
            request_time,
            duration,
            notification_error,
        })
    }

    /// Resolve secrets and assemble the GET request, returning it with its URL.
    async fn build_request(&self, target: &Target<'_>) -> Result<(String, reqwest::Request), InvocationError> {
        let secrets = self.secrets.as_ref();
        let path = secrets::resolve(secrets, target.path).await?;
        let url = compose_url(target.protocol, target.hostname, target.port, &path);

        let mut headers = HeaderMap::with_capacity(target.headers.len());
        for (name, value) in target.headers {
            let resolved = secrets::resolve(secrets, value).await?;
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                InvocationError::InvalidConfiguration(format!("invalid header name '{}'", name))
            })?;
            if headers.contains_key(&header_name) {
                return Err(InvocationError::InvalidConfiguration(format!(
                    "header '{}' is configured more than once",
                    name
                )));
            }
            // The value may hold a secret, so only the name is reported
            let header_value = HeaderValue::from_str(&resolved).map_err(|_| {
                InvocationError::InvalidConfiguration(format!("invalid value for header '{}'", name))
            })?;
            headers.insert(header_name, header_value);
        }

        let request = self
            .http_client
            .get(&url)
            .headers(headers)
            .timeout(self.options.request_timeout)
            .build()
            .map_err(|_| {
                InvocationError::InvalidConfiguration(format!(
                    "cannot build a request for host '{}'",
                    target.hostname
                ))
            })?;

        Ok((url, request))
    }
}
