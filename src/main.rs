//! Callculon: a scheduled HTTP health check.
//!
//! This is the entry point for one invocation. It initializes tracing, reads handler
//! options from the environment, loads the check configuration, wires up the secret
//! store and Slack notifier, runs the check and prints the result as JSON on stdout.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use callculon::config::{
    Configuration, HandlerOptions, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER, DEFAULT_LOG_FORMAT,
};
use callculon::notify::SlackNotifier;
use callculon::secrets::SecretBackend;
use callculon::Invoker;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    /// Human-readable
    Text,
    /// Structured, one JSON object per line
    Json,
}

/// Callculon: ping an endpoint once and report the outcome to Slack
#[derive(Parser, Debug)]
#[command(name = "callculon", version, about)]
struct Args {
    /// Path to the check configuration (.json or .toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "callculon=debug")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = DEFAULT_LOG_FORMAT)]
    log_format: LogFormat,

    /// Secret store used to resolve tokens in the configuration
    #[arg(long, value_enum, default_value_t = SecretBackend::ParameterStore)]
    secrets: SecretBackend,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    // stdout carries the result, so logs go to stderr
    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    match args.log_format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    let options = HandlerOptions::from_env();
    tracing::debug!(
        connect_timeout = ?options.connect_timeout,
        request_timeout = ?options.request_timeout,
        relaxed_tls = options.relaxed_tls,
        "Loaded handler options"
    );

    let config = Configuration::load(&args.config)?;
    tracing::info!(name = %config.name, path = %args.config, "Loaded configuration");
    if !config.deployment.enabled {
        tracing::warn!(
            deployment = %config.deployment.id,
            "Deployment is marked disabled; running anyway"
        );
    }

    let secrets = args.secrets.processor(&options).await;
    tracing::info!(backend = ?args.secrets, identifier = secrets.identifier(), "Initialized secret store");

    let notifier = Arc::new(SlackNotifier::new(&options)?);
    let invoker = Invoker::new(options, secrets, notifier)?;

    match invoker.invoke(&config).await {
        Ok(result) => {
            println!("{}", serde_json::to_string(&result)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "Invocation failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
