//! Job configuration
//!
//! Layered, lowest precedence first: optional TOML file, `REPORT_*`
//! environment variables, then the orchestrator's parameter map.

use anyhow::{Context, Result};
use report_lib::fetcher::CONTAINER_INSIGHTS_NAMESPACE;
use report_lib::RetryPolicy;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keys holding comma-separated lists when given as strings
const LIST_KEYS: &[&str] = &["clusters", "recipients"];

/// Where secrets are resolved from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretSource {
    /// AWS Secrets Manager
    #[default]
    Aws,
    /// Process environment
    Env,
}

/// Job configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Clusters to scan; empty scans every cluster in the region
    #[serde(default)]
    pub clusters: Vec<String>,

    /// AWS region override (defaults to the SDK provider chain)
    #[serde(default)]
    pub region: Option<String>,

    /// Report recipients
    #[serde(default)]
    pub recipients: Vec<String>,

    #[serde(default = "default_sender")]
    pub sender: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Name of the secret holding the SMTP username
    #[serde(default = "default_smtp_username_secret")]
    pub smtp_username_secret: String,

    /// Name of the secret holding the SMTP password
    #[serde(default = "default_smtp_password_secret")]
    pub smtp_password_secret: String,

    #[serde(default)]
    pub secret_source: SecretSource,

    /// Prefix applied to Secrets Manager ids
    #[serde(default)]
    pub secret_prefix: Option<String>,

    #[serde(default = "default_metric_namespace")]
    pub metric_namespace: String,

    /// Whole-job retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Prometheus textfile written after each run
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

fn default_sender() -> String {
    "ECS Reports <ecs-reports@example.com>".to_string()
}

fn default_subject() -> String {
    "ECS Task Utilization Report".to_string()
}

fn default_smtp_host() -> String {
    "email-smtp.us-east-1.amazonaws.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_username_secret() -> String {
    "SMTP_USERNAME".to_string()
}

fn default_smtp_password_secret() -> String {
    "SMTP_PASSWORD".to_string()
}

fn default_metric_namespace() -> String {
    CONTAINER_INSIGHTS_NAMESPACE.to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    30
}

impl JobConfig {
    /// Load configuration from the file, process environment and parameters
    pub fn load(file: Option<&Path>, params: &BTreeMap<String, String>) -> Result<Self> {
        Self::load_from(file, None, params)
    }

    /// Load with an explicit environment map instead of the process environment
    pub fn load_from(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
        params: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(
                config::File::new(&path.to_string_lossy(), config::FileFormat::Toml).required(true),
            );
        }

        let mut environment = config::Environment::with_prefix("REPORT")
            .try_parsing(true)
            .list_separator(",");
        for key in LIST_KEYS {
            environment = environment.with_list_parse_key(key);
        }
        builder = builder.add_source(environment.source(env));

        for (key, value) in params {
            let key = key.trim().to_lowercase();
            builder = if LIST_KEYS.contains(&key.as_str()) {
                builder.set_override(&key, split_list(value))?
            } else {
                builder.set_override(&key, value.clone())?
            };
        }

        let config = builder.build().context("Failed to load job configuration")?;
        config
            .try_deserialize()
            .context("Invalid job configuration")
    }

    /// Replace clusters and recipients with values given on the command line
    pub fn apply_cli(&mut self, clusters: &[String], recipients: &[String]) {
        if !clusters.is_empty() {
            self.clusters = clusters.to_vec();
        }
        if !recipients.is_empty() {
            self.recipients = recipients.to_vec();
        }
    }

    pub fn validate(&self, dry_run: bool) -> Result<()> {
        if !dry_run && self.recipients.iter().all(|r| r.trim().is_empty()) {
            anyhow::bail!("At least one recipient is required unless running with --dry-run");
        }
        if self.smtp_port == 0 {
            anyhow::bail!("smtp_port must be non-zero");
        }
        if self.metric_namespace.trim().is_empty() {
            anyhow::bail!("metric_namespace must not be empty");
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_secs(self.retry_delay_secs))
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Parse a `key=value` orchestrator parameter
pub fn parse_param(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", input))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", input));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
