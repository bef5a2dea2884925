//! Secret lookup for credentials the job needs at runtime
//!
//! A missing required secret fails the whole run.

use async_trait::async_trait;
use aws_sdk_secretsmanager::Client;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret {0} is not defined")]
    Missing(String),

    #[error("failed to read secret {name}: {message}")]
    Provider { name: String, message: String },
}

/// Capability for resolving named secrets
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError>;
}

/// Secrets stored in AWS Secrets Manager as plain strings
pub struct SecretsManagerProvider {
    client: Client,
    prefix: Option<String>,
}

impl SecretsManagerProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            prefix: None,
        }
    }

    /// Prefix every secret id, e.g. `reports/prod/`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn secret_id(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }
}

#[async_trait]
impl SecretProvider for SecretsManagerProvider {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        let secret_id = self.secret_id(name);
        debug!(secret_id = %secret_id, "Reading secret");

        let output = self
            .client
            .get_secret_value()
            .secret_id(&secret_id)
            .send()
            .await
            .map_err(|err| {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);
                if not_found {
                    SecretError::Missing(secret_id.clone())
                } else {
                    SecretError::Provider {
                        name: secret_id.clone(),
                        message: aws_sdk_secretsmanager::error::DisplayErrorContext(err)
                            .to_string(),
                    }
                }
            })?;

        match output.secret_string() {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(SecretError::Missing(secret_id)),
        }
    }
}

/// Secrets read from environment variables, for local runs
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider;

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        match std::env::var(name) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(SecretError::Missing(name.to_string())),
        }
    }
}

/// Fixed set of secrets held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, String>,
}

impl StaticSecretProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn get_secret(&self, name: &str) -> Result<String, SecretError> {
        self.secrets
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or_else(|| SecretError::Missing(name.to_string()))
    }
}
