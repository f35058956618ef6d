/*!
 * Common test utilities for the doctrans test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use doctrans::containers::ContainerManager;
use doctrans::service::models::{FileFormat, JobStatus, Language, Summary};
use doctrans::service::{DocumentTranslationService, ServiceCatalog, SubmitOptions};
use doctrans::storage::MemoryStorage;
use doctrans::{RunOrchestrator, RunSettings};


pub use fake_translator::FakeTranslator;

pub const TEST_ENDPOINT: &str = "https://unit.cognitiveservices.azure.com/translator/text/batch/v1.0";

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

fn format(name: &str, extensions: &[&str]) -> FileFormat {
    FileFormat {
        format: name.to_string(),
        file_extensions: extensions.iter().map(|e| e.to_string()).collect(),
        content_types: Vec::new(),
        default_version: None,
        versions: None,
    }
}

/// Catalog accepting text and Word documents, TSV glossaries, French and German
pub fn test_catalog() -> ServiceCatalog {
    let language = |name: &str| Language {
        name: name.to_string(),
        native_name: name.to_string(),
        dir: "ltr".to_string(),
    };
    ServiceCatalog {
        document_formats: vec![
            format("PlainText", &[".txt"]),
            format("WordDocument", &[".docx"]),
        ],
        glossary_formats: vec![format("TSV", &[".tsv", ".tab"])],
        languages: [("fr".to_string(), language("French")), ("de".to_string(), language("German"))]
            .into_iter()
            .collect(),
    }
}

/// Settings with millisecond timings
pub fn test_settings() -> RunSettings {
    RunSettings {
        poll_interval: Duration::from_millis(1),
        ..RunSettings::default()
    }
}

/// Route library logs to the test harness output
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Orchestrator wired to the fake translator and in-memory storage
pub fn test_orchestrator(translator: Arc<FakeTranslator>, storage: Arc<MemoryStorage>) -> RunOrchestrator {
    init_test_logging();
    let service = DocumentTranslationService::new(translator, TEST_ENDPOINT, "https://languages.test/languages")
        .with_submit_options(SubmitOptions {
            attempts: 3,
            backoff: Duration::from_millis(1),
        });
    let containers = ContainerManager::new(storage, Duration::from_secs(3600));
    RunOrchestrator::new(service, containers, test_catalog(), test_settings())
}

/// A status snapshot with the given document counts
pub fn job_status(state: &str, total: u32, in_progress: u32, success: u32, last_action: &str) -> JobStatus {
    JobStatus {
        id: "job-1".to_string(),
        created_date_time_utc: "2024-05-01T10:00:00Z".to_string(),
        last_action_date_time_utc: last_action.to_string(),
        status: state.to_string(),
        error: None,
        summary: Summary {
            total,
            in_progress,
            success,
            not_yet_started: total.saturating_sub(in_progress + success),
            ..Default::default()
        },
    }
}

/// NotStarted, then running, then succeeded
pub fn successful_run(total: u32) -> Vec<JobStatus> {
    vec![
        job_status("NotStarted", total, 0, 0, "2024-05-01T10:00:01Z"),
        job_status("Running", total, total, 0, "2024-05-01T10:00:02Z"),
        job_status("Succeeded", total, 0, total, "2024-05-01T10:00:03Z"),
    ]
}
