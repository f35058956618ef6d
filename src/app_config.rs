use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::{Path, PathBuf};

use crate::errors::CredentialsError;

/// Application configuration module
/// This module handles loading and validating the settings of a batch run:
/// credentials, service endpoints and the tuning knobs of each stage.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Translator and storage credentials
    #[serde(default)]
    pub credentials: Credentials,

    /// Batch translation endpoint; derived from the resource name when empty
    #[serde(default)]
    pub endpoint: String,

    /// Public endpoint listing the supported languages
    #[serde(default = "default_languages_endpoint")]
    pub languages_endpoint: String,

    /// Custom Translator category applied to every target
    #[serde(default)]
    pub category: Option<String>,

    /// Run tuning
    #[serde(default)]
    pub run: RunConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Secrets identifying the Translator resource and the storage account
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct Credentials {
    /// Subscription key of the Translator resource
    #[serde(default)]
    pub subscription_key: String,

    /// Name of the Translator resource
    #[serde(default)]
    pub resource_name: String,

    /// Connection string of the storage account
    #[serde(default)]
    pub storage_connection_string: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |s: &str| if s.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Credentials")
            .field("subscription_key", &redact(&self.subscription_key))
            .field("resource_name", &self.resource_name)
            .field("storage_connection_string", &redact(&self.storage_connection_string))
            .finish()
    }
}

/// Settings of a single batch run
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RunConfig {
    /// Maximum number of uploads or downloads in flight at once
    #[serde(default = "default_max_concurrent_transfers")]
    pub max_concurrent_transfers: usize,

    /// Total number of submission attempts
    #[serde(default = "default_submit_attempts")]
    pub submit_attempts: u32,

    /// Fixed wait between submission attempts in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Delay between status queries in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive transient status failures tolerated before polling gives up
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,

    /// Lifetime of the delegated container URIs in seconds
    #[serde(default = "default_sas_ttl_secs")]
    pub sas_ttl_secs: u64,

    /// Age after which leftover run containers are swept
    #[serde(default = "default_stale_container_age_days")]
    pub stale_container_age_days: u32,

    /// Capacity of the progress event channel
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where results are written; next to the inputs when unset
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: default_max_concurrent_transfers(),
            submit_attempts: default_submit_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_errors: default_max_poll_errors(),
            sas_ttl_secs: default_sas_ttl_secs(),
            stale_container_age_days: default_stale_container_age_days(),
            progress_buffer: default_progress_buffer(),
            request_timeout_secs: default_request_timeout_secs(),
            output_dir: None,
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_languages_endpoint() -> String {
    "https://api.cognitive.microsofttranslator.com/languages?api-version=3.0&scope=translation".to_string()
}

fn default_max_concurrent_transfers() -> usize {
    100
}

fn default_submit_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // fixed, not doubled
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_errors() -> u32 {
    3
}

fn default_sas_ttl_secs() -> u64 {
    3600
}

fn default_stale_container_age_days() -> u32 {
    10
}

fn default_progress_buffer() -> usize {
    64
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Check that every credential is present, before any network call
    pub fn validate(&self) -> Result<(), CredentialsError> {
        if self.credentials.subscription_key.trim().is_empty() {
            return Err(CredentialsError::Missing("key"));
        }
        if self.credentials.resource_name.trim().is_empty() && self.endpoint.trim().is_empty() {
            return Err(CredentialsError::Missing("name"));
        }
        if self.credentials.storage_connection_string.trim().is_empty() {
            return Err(CredentialsError::Missing("storage"));
        }
        Ok(())
    }

    /// Batch endpoint, from the override or the resource name
    pub fn translation_endpoint(&self) -> String {
        if !self.endpoint.trim().is_empty() {
            return self.endpoint.trim_end_matches('/').to_string();
        }
        format!(
            "https://{}.cognitiveservices.azure.com/translator/text/batch/v1.0",
            self.credentials.resource_name
        )
    }
}
