//! Secret token substitution.
//!
//! Configuration values reference secrets with tokens of the form
//! `identifier(token)`, e.g. `aws-secret(/dvp/qa/api-key)`. A [`SecretProcessor`]
//! owns one identifier and knows how to look up a batch of tokens; [`resolve`]
//! finds the tokens in a string, asks the processor for all of them at once and
//! splices the values back in.
//!
//! A token is recognized only on a boundary: at the start of the string, after
//! whitespace or ASCII punctuation, or directly after the previous token. Inside
//! the parentheses the token may be padded with whitespace (`id( value )`) but
//! must itself be a single run of non-whitespace characters.

pub mod parameter_store;

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::config::HandlerOptions;

pub use parameter_store::{ParameterStore, ParameterStoreClient, StoredParameter};

/// Matches the remainder of a token after its identifier: `(`, padded value, `)`.
static TOKEN_BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(\s*(\S+?)\s*\)").expect("token pattern is valid"));

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// A token was left malformed. Carries the input as it was before substitution.
    #[error("Invalid secret specification: {0}")]
    InvalidSecretSpecification(String),

    #[error("Expected {expected} secret values, got {got}: {secrets:?}")]
    MissingLookupValue {
        secrets: Vec<String>,
        expected: usize,
        got: usize,
    },

    #[error("Secret lookup failed: {0}")]
    Lookup(String),
}

/// Resolves a batch of secret tokens for one identifier.
#[async_trait]
pub trait SecretProcessor: Send + Sync {
    /// Marker that introduces this processor's tokens, e.g. `aws-secret`
    fn identifier(&self) -> &str;

    /// Look up every token, returning values in the same order as requested.
    ///
    /// Unknown tokens may simply be left out; the caller detects the shortfall.
    async fn lookup(&self, secrets: &[String]) -> Result<Vec<String>, SecretError>;
}

/// Processor for deployments without a secret store.
///
/// Its identifier is `no-secret`, so tokens for other stores pass through untouched
/// and `no-secret(value)` resolves to `value`.
#[derive(Debug, Clone, Default)]
pub struct NoSecrets;

#[async_trait]
impl SecretProcessor for NoSecrets {
    fn identifier(&self) -> &str {
        "no-secret"
    }

    async fn lookup(&self, secrets: &[String]) -> Result<Vec<String>, SecretError> {
        Ok(secrets.to_vec())
    }
}

/// The secret stores a deployment can be wired to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SecretBackend {
    /// AWS SSM Parameter Store, `aws-secret(...)` tokens
    #[default]
    ParameterStore,
    /// No secret store, only `no-secret(...)` tokens are recognized
    #[value(name = "none")]
    Disabled,
}

impl SecretBackend {
    /// Build the processor for this backend. Store calls are bounded by the request timeout.
    pub async fn processor(self, options: &HandlerOptions) -> Arc<dyn SecretProcessor> {
        match self {
            SecretBackend::ParameterStore => {
                Arc::new(ParameterStore::from_env(options.request_timeout).await)
            }
            SecretBackend::Disabled => Arc::new(NoSecrets),
        }
    }
}

/// One recognized token within the scanned string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TokenMatch {
    /// Byte offset where the match begins, including the anchor character
    start: usize,
    /// Byte offset just past the closing parenthesis
    end: usize,
    /// Boundary text preceding the identifier (empty at start or when chained)
    anchor: String,
    token: String,
}

/// Result of scanning a string for one identifier.
#[derive(Debug, Default)]
struct Scan {
    matches: Vec<TokenMatch>,
    /// An `identifier(` on a boundary that did not form a valid token
    dangling: bool,
}

/// Find the boundary anchor for a marker found at `at`, if it sits on a boundary.
fn anchor_at(text: &str, at: usize, previous_end: Option<usize>) -> Option<(usize, &str)> {
    if at == 0 || previous_end == Some(at) {
        return Some((at, ""));
    }
    let before = text[..at].chars().next_back()?;
    if before.is_ascii_punctuation() || before.is_whitespace() {
        let start = at - before.len_utf8();
        return Some((start, &text[start..at]));
    }
    None
}

fn scan(identifier: &str, text: &str) -> Scan {
    let marker = format!("{}(", identifier);
    let mut scan = Scan::default();
    let mut previous_end = None;
    let mut pos = 0;

    while let Some(found) = text[pos..].find(&marker) {
        let at = pos + found;
        let Some((start, anchor)) = anchor_at(text, at, previous_end) else {
            pos = at + marker.len();
            continue;
        };

        let body_start = at + identifier.len();
        match TOKEN_BODY.captures(&text[body_start..]) {
            Some(captures) => {
                let end = body_start + captures[0].len();
                scan.matches.push(TokenMatch {
                    start,
                    end,
                    anchor: anchor.to_string(),
                    token: captures[1].to_string(),
                });
                previous_end = Some(end);
                pos = end;
            }
            None => {
                scan.dangling = true;
                pos = at + marker.len();
            }
        }
    }

    scan
}

/// True when `identifier(` appears at the start of `text` or after whitespace or
/// punctuation.
fn has_residual_marker(identifier: &str, text: &str) -> bool {
    let marker = format!("{}(", identifier);
    text.match_indices(&marker)
        .any(|(at, _)| anchor_at(text, at, None).is_some())
}

/// Replace every token for `processor` in `text` with its looked-up value.
///
/// The processor is called at most once, with all tokens in order of appearance.
/// Errors from the processor propagate unchanged. Malformed tokens fail with
/// [`SecretError::InvalidSecretSpecification`] carrying the original `text`, so
/// values that were already resolved never end up in an error message.
pub async fn resolve(processor: &dyn SecretProcessor, text: &str) -> Result<String, SecretError> {
    let identifier = processor.identifier();
    let scan = scan(identifier, text);

    if scan.matches.is_empty() {
        if scan.dangling {
            return Err(SecretError::InvalidSecretSpecification(text.to_string()));
        }
        return Ok(text.to_string());
    }

    let secrets: Vec<String> = scan.matches.iter().map(|m| m.token.clone()).collect();
    tracing::debug!(identifier, count = secrets.len(), "Resolving secret tokens");
    let values = processor.lookup(&secrets).await?;
    if values.len() != secrets.len() {
        return Err(SecretError::MissingLookupValue {
            expected: secrets.len(),
            got: values.len(),
            secrets,
        });
    }

    // Splice from the last match backwards so earlier offsets stay valid
    let mut result = text.to_string();
    for (m, value) in scan.matches.iter().zip(&values).rev() {
        result.replace_range(m.start..m.end, &format!("{}{}", m.anchor, value));
    }

    if scan.dangling || has_residual_marker(identifier, &result) {
        return Err(SecretError::InvalidSecretSpecification(text.to_string()));
    }

    Ok(result)
}
