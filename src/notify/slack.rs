//! Slack incoming-webhook notifier.
//!
//! Renders one of two message templates and POSTs it to the configured webhook.
//! The webhook URL may itself contain secret tokens, resolved just before sending.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::CONTENT_TYPE;
use tera::Tera;
use tracing::Instrument;

use super::{NotificationContext, NotificationError, Notifier};
use crate::config::{HandlerOptions, SlackConfig, FAILURE_TEMPLATE, SUCCESS_TEMPLATE, USER_AGENT};
use crate::secrets;
use crate::templates::init_templates;

const EMOJIS: &[&str] = &[
    "100",
    "dagger_knife",
    "grin",
    "guitar",
    "icecream",
    "motor_scooter",
    "pizza",
    "sparkling_heart",
    "sunglasses",
    "taco",
    "the_horns",
    "trumpet",
    "unicorn_face",
];

const PHRASES: &[&str] = &[
    "All quiet on the western front.",
    "Another day, another 200.",
    "Nothing to see here, carry on.",
    "Still standing. Still fabulous.",
    "The hamsters are running at full speed.",
    "Green across the board.",
    "It answered on the first ring.",
    "Checked twice, still nice.",
    "No news is good news, but here is some good news anyway.",
    "Smooth like butter.",
];

#[derive(Clone)]
pub struct SlackNotifier {
    http_client: reqwest::Client,
    templates: Tera,
}

impl SlackNotifier {
    /// Create a notifier with its own HTTP client bounded by the request timeout.
    pub fn new(options: &HandlerOptions) -> Result<Self, NotificationError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(options.relaxed_tls)
            .build()?;
        let templates = init_templates(options.template_dir.as_deref())?;
        Ok(Self::with_client(http_client, templates))
    }

    pub fn with_client(http_client: reqwest::Client, templates: Tera) -> Self {
        Self {
            http_client,
            templates,
        }
    }

    /// Values shared by both templates
    fn base_context(ctx: &NotificationContext<'_>, slack: &SlackConfig) -> tera::Context {
        let deployment = &ctx.config.deployment;
        let mut context = tera::Context::new();
        context.insert("environment", &deployment.environment);
        context.insert("channel", &slack.channel);
        context.insert("name", &ctx.config.name);
        context.insert("url", &ctx.url);
        context.insert("statusCode", &ctx.status_code.to_string());
        context.insert("product", &deployment.product);
        context.insert("version", &deployment.version);
        context.insert("cron", &deployment.cron);
        context.insert("deploymentId", &deployment.id);
        context
    }

    async fn post(
        &self,
        ctx: &NotificationContext<'_>,
        slack: &SlackConfig,
        message: String,
    ) -> Result<(), NotificationError> {
        tracing::info!(channel = %slack.channel, "Notifying Slack channel");
        let webhook = secrets::resolve(ctx.secrets, &slack.webhook).await?;

        let response = self
            .http_client
            .post(&webhook)
            .header(CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Slack rejected notification");
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Slack settings, when present and enabled by `wanted`
fn slack_config<'a>(
    ctx: &'a NotificationContext<'_>,
    wanted: impl Fn(&SlackConfig) -> bool,
) -> Option<&'a SlackConfig> {
    ctx.config.notification.slack.as_ref().filter(|s| wanted(s))
}

fn random_emoji() -> &'static str {
    EMOJIS.choose(&mut rand::thread_rng()).copied().unwrap_or("100")
}

fn random_phrase() -> String {
    let phrase = PHRASES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("All good.");
    format!("_{}_", phrase)
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn on_success(&self, ctx: &NotificationContext<'_>) -> Result<(), NotificationError> {
        let Some(slack) = slack_config(ctx, |s| s.on_success) else {
            return Ok(());
        };

        let mut context = Self::base_context(ctx, slack);
        context.insert("emoji", random_emoji());
        context.insert("note", &ctx.note.clone().unwrap_or_else(random_phrase));
        let message = self.templates.render(SUCCESS_TEMPLATE, &context)?;

        self.post(ctx, slack, message)
            .instrument(ctx.span.clone())
            .await
    }

    async fn on_failure(&self, ctx: &NotificationContext<'_>) -> Result<(), NotificationError> {
        let Some(slack) = slack_config(ctx, |s| s.on_failure) else {
            return Ok(());
        };

        let mut context = Self::base_context(ctx, slack);
        let note = ctx
            .note
            .clone()
            .unwrap_or_else(|| format!("HTTP status {}", ctx.status_code));
        context.insert("note", &note);
        let message = self.templates.render(FAILURE_TEMPLATE, &context)?;

        self.post(ctx, slack, message)
            .instrument(ctx.span.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, Deployment, Notification};
    use crate::secrets::NoSecrets;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(webhook: &str, on_failure: bool, on_success: bool) -> Configuration {
        Configuration {
            name: "fugazi-manual-test".to_string(),
            deployment: Deployment {
                enabled: true,
                cron: "0 0 * * *".to_string(),
                product: "fugazi".to_string(),
                version: "1.0.0".to_string(),
                id: "1-fugazi-1-0-0-oicu812".to_string(),
                environment: "qa".to_string(),
            },
            notification: Notification {
                slack: Some(SlackConfig {
                    webhook: webhook.to_string(),
                    channel: "shanktovoid".to_string(),
                    on_failure,
                    on_success,
                }),
            },
            ..Default::default()
        }
    }

    fn context<'a>(config: &'a Configuration, status_code: u16, note: Option<&str>) -> NotificationContext<'a> {
        NotificationContext {
            secrets: &NoSecrets,
            config,
            url: "https://fugazi.com/velocipastor".to_string(),
            status_code,
            note: note.map(str::to_string),
            span: tracing::Span::none(),
        }
    }

    fn notifier() -> SlackNotifier {
        SlackNotifier::new(&HandlerOptions::default()).unwrap()
    }

    async fn slack_server(status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/hook"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_on_failure_does_not_send_when_disabled() {
        let server = slack_server(200).await;
        let config = config(&format!("{}/services/hook", server.uri()), false, true);
        notifier().on_failure(&context(&config, 419, None)).await.unwrap();
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_slack_configuration_sends_nothing() {
        let config = Configuration::default();
        // Would fail to connect if anything were sent
        notifier().on_failure(&context(&config, 419, None)).await.unwrap();
        notifier().on_success(&context(&config, 200, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_on_failure_sends_message_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services/hook"))
            .and(header("content-type", "application/json"))
            .and(body_string_contains("wow this is the greatest"))
            .and(body_string_contains("0 0 ＊ ＊ ＊"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&format!("{}/services/hook", server.uri()), true, false);
        notifier()
            .on_failure(&context(&config, 419, Some("wow this is the greatest")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_on_failure_default_note_is_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("HTTP status 0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let config = config(&format!("{}/services/hook", server.uri()), true, false);
        notifier().on_failure(&context(&config, 0, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_on_success_does_not_send_when_disabled() {
        let server = slack_server(200).await;
        let config = config(&format!("{}/services/hook", server.uri()), true, false);
        notifier().on_success(&context(&config, 200, None)).await.unwrap();
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_on_success_sends_message_when_enabled() {
        let server = slack_server(200).await;
        let config = config(&format!("{}/services/hook", server.uri()), true, true);
        notifier().on_success(&context(&config, 200, None)).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["channel"], "shanktovoid");
        let note = body["attachments"][0]["text"].as_str().unwrap();
        assert!(note.starts_with('_') && note.ends_with('_'));
    }

    #[tokio::test]
    async fn test_unsuccessful_status_is_rejected() {
        let server = slack_server(404).await;
        let config = config(&format!("{}/services/hook", server.uri()), true, false);
        let err = notifier()
            .on_failure(&context(&config, 419, None))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Rejected { status: 404, ref body } if body == "nope"));
    }

    #[tokio::test]
    async fn test_webhook_secrets_are_resolved() {
        let server = slack_server(200).await;
        let config = config(
            &format!("{}/services/no-secret(hook)", server.uri()),
            true,
            false,
        );
        notifier().on_failure(&context(&config, 500, None)).await.unwrap();
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_webhook_secret_fails() {
        let config = config("https://hooks.example.com/no-secret(", true, false);
        let err = notifier()
            .on_failure(&context(&config, 500, None))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Secret(_)));
    }

    #[tokio::test]
    async fn test_send_error_omits_webhook_url() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = config(
            &format!("http://127.0.0.1:{}/services/no-secret(T0KEN)", port),
            true,
            false,
        );
        let err = notifier()
            .on_failure(&context(&config, 500, None))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Send(_)));
        assert!(!err.to_string().contains("T0KEN"), "{}", err);
        assert!(!err.to_string().contains("/services/"), "{}", err);
    }
}
