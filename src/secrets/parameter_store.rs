//! Secrets held in AWS SSM Parameter Store.
//!
//! Tokens look like `aws-secret(/dvp/qa/app/api-key)`; the token is the parameter
//! name. All tokens of a string are fetched in one batch with decryption enabled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_ssm::error::DisplayErrorContext;

use super::{SecretError, SecretProcessor};
use crate::config::PARAMETER_STORE_IDENTIFIER;

/// GetParameters accepts at most this many names per call
const SSM_MAX_NAMES_PER_REQUEST: usize = 10;

/// A decrypted parameter returned by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParameter {
    pub name: String,
    pub value: String,
}

/// The remote half of the parameter store: a batched, decrypting lookup by name.
///
/// Implementations may return parameters in any order and omit unknown names.
#[async_trait]
pub trait ParameterStoreClient: Send + Sync {
    async fn fetch(&self, names: &[String]) -> Result<Vec<StoredParameter>, SecretError>;
}

#[async_trait]
impl ParameterStoreClient for aws_sdk_ssm::Client {
    async fn fetch(&self, names: &[String]) -> Result<Vec<StoredParameter>, SecretError> {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !unique.contains(name) {
                unique.push(name.clone());
            }
        }

        let mut parameters = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(SSM_MAX_NAMES_PER_REQUEST) {
            let output = self
                .get_parameters()
                .set_names(Some(chunk.to_vec()))
                .with_decryption(true)
                .send()
                .await
                .map_err(|e| SecretError::Lookup(DisplayErrorContext(&e).to_string()))?;

            if !output.invalid_parameters().is_empty() {
                tracing::debug!(
                    invalid = output.invalid_parameters().len(),
                    "Parameter store did not recognize some names"
                );
            }

            parameters.extend(output.parameters().iter().filter_map(|p| {
                Some(StoredParameter {
                    name: p.name()?.to_string(),
                    value: p.value()?.to_string(),
                })
            }));
        }

        Ok(parameters)
    }
}

/// [`SecretProcessor`] for `aws-secret(...)` tokens.
#[derive(Clone)]
pub struct ParameterStore {
    client: Arc<dyn ParameterStoreClient>,
}

impl ParameterStore {
    pub fn new(client: impl ParameterStoreClient + 'static) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Build an SSM client from the default AWS credential and region chain.
    ///
    /// Every store call is bounded by `operation_timeout`.
    pub async fn from_env(operation_timeout: Duration) -> Self {
        let timeouts = TimeoutConfig::builder()
            .operation_timeout(operation_timeout)
            .build();
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .timeout_config(timeouts)
            .load()
            .await;
        Self::new(aws_sdk_ssm::Client::new(&sdk_config))
    }
}

#[async_trait]
impl SecretProcessor for ParameterStore {
    fn identifier(&self) -> &str {
        PARAMETER_STORE_IDENTIFIER
    }

    async fn lookup(&self, secrets: &[String]) -> Result<Vec<String>, SecretError> {
        let parameters = self.client.fetch(secrets).await?;

        // The store's ordering is not guaranteed, so key by name and follow the request
        let values: HashMap<String, String> = parameters
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect();

        Ok(secrets
            .iter()
            .filter_map(|name| values.get(name).cloned())
            .collect())
    }
}
