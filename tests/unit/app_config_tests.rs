/*!
 * Tests for application configuration functionality
 */

use std::path::PathBuf;

use doctrans::app_config::{Config, Credentials, LogLevel};
use doctrans::errors::{CredentialsError, RunError, RunPhase};
use doctrans::orchestrator::{RunOrchestrator, RunSettings};

use crate::common::{create_temp_dir, create_test_file};

fn complete_config() -> Config {
    Config {
        credentials: Credentials {
            subscription_key: "key".to_string(),
            resource_name: "contoso-translator".to_string(),
            storage_connection_string: "AccountName=docs;AccountKey=c2VjcmV0".to_string(),
        },
        ..Config::default()
    }
}

/// Test default configuration values
#[test]
fn test_default_config_should_have_documented_defaults() {
    let config = Config::default();

    assert_eq!(config.run.max_concurrent_transfers, 100);
    assert_eq!(config.run.submit_attempts, 3);
    assert_eq!(config.run.retry_backoff_ms, 1000);
    assert_eq!(config.run.poll_interval_ms, 1000);
    assert_eq!(config.run.max_poll_errors, 3);
    assert_eq!(config.run.sas_ttl_secs, 3600);
    assert_eq!(config.run.stale_container_age_days, 10);
    assert_eq!(config.run.progress_buffer, 64);
    assert_eq!(config.run.request_timeout_secs, 120);
    assert!(config.run.output_dir.is_none());
    assert!(config.category.is_none());
    assert_eq!(config.log_level, LogLevel::Info);
}

#[test]
fn test_partial_json_should_fill_defaults() {
    let config: Config = serde_json::from_str(
        r#"{
            "credentials": { "subscription_key": "abc", "resource_name": "res" },
            "run": { "poll_interval_ms": 250, "output_dir": "/tmp/out" },
            "log_level": "debug"
        }"#,
    )
    .unwrap();

    assert_eq!(config.credentials.subscription_key, "abc");
    assert_eq!(config.run.poll_interval_ms, 250);
    assert_eq!(config.run.max_concurrent_transfers, 100);
    assert_eq!(config.run.output_dir, Some(PathBuf::from("/tmp/out")));
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.languages_endpoint.contains("scope=translation"));
}

#[test]
fn test_validate_should_name_the_missing_credential() {
    assert!(complete_config().validate().is_ok());

    let mut config = complete_config();
    config.credentials.subscription_key.clear();
    assert!(matches!(config.validate(), Err(CredentialsError::Missing("key"))));

    let mut config = complete_config();
    config.credentials.resource_name.clear();
    assert!(matches!(config.validate(), Err(CredentialsError::Missing("name"))));

    let mut config = complete_config();
    config.credentials.storage_connection_string = "  ".to_string();
    assert!(matches!(config.validate(), Err(CredentialsError::Missing("storage"))));
}

#[test]
fn test_explicit_endpoint_should_replace_resource_name() {
    let mut config = complete_config();
    assert_eq!(
        config.translation_endpoint(),
        "https://contoso-translator.cognitiveservices.azure.com/translator/text/batch/v1.0"
    );

    config.endpoint = "http://localhost:5000/batch/".to_string();
    config.credentials.resource_name.clear();
    assert!(config.validate().is_ok());
    assert_eq!(config.translation_endpoint(), "http://localhost:5000/batch");
}

#[test]
fn test_debug_output_should_redact_secrets() {
    let rendered = format!("{:?}", complete_config());
    assert!(!rendered.contains("c2VjcmV0"));
    assert!(rendered.contains("<redacted>"));
    assert!(rendered.contains("contoso-translator"));
}

#[test]
fn test_from_file_should_load_json_config() {
    let dir = create_temp_dir().unwrap();
    let path = create_test_file(
        dir.path(),
        "conf.json",
        r#"{ "credentials": { "subscription_key": "k" }, "category": "general" }"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.category.as_deref(), Some("general"));

    let missing = Config::from_file(dir.path().join("absent.json")).unwrap_err();
    assert!(missing.to_string().contains("Failed to read config file"));
}

#[test]
fn test_run_settings_should_follow_run_config() {
    let mut config = Config::default();
    config.run.poll_interval_ms = 20;
    config.run.stale_container_age_days = 2;

    let settings = RunSettings::from(&config.run);

    assert_eq!(settings.poll_interval, std::time::Duration::from_millis(20));
    assert_eq!(settings.stale_container_age, chrono::Duration::days(2));
    assert_eq!(settings.max_concurrent_transfers, 100);
}

#[test]
fn test_orchestrator_from_config_should_fail_before_any_request() {
    let mut config = complete_config();
    config.credentials.storage_connection_string.clear();

    let result = tokio_test::block_on(async { RunOrchestrator::from_config(&config).await });

    match result {
        Err(error @ RunError::Credentials(CredentialsError::Missing("storage"))) => {
            assert_eq!(error.phase(), RunPhase::Credentials);
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
}
