/*!
 * Wire types for the document translation REST API.
 *
 * Field names are part of the contract with the service and are pinned with
 * serde attributes; do not rename them.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Storage type marker for container-level sources and targets
pub const STORAGE_TYPE_FOLDER: &str = "folder";

/// Default `storageSource` for glossary references
pub const GLOSSARY_STORAGE_SOURCE: &str = "folder";

/// Body of `POST /batches`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub inputs: Vec<BatchInput>,
}

/// One source container and the targets it is translated into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInput {
    pub storage_type: String,
    pub source: SourceDescriptor,
    pub targets: Vec<TargetDescriptor>,
}

impl BatchInput {
    /// Input for a whole source container
    pub fn folder(source_url: impl Into<String>, targets: Vec<TargetDescriptor>) -> Self {
        Self {
            storage_type: STORAGE_TYPE_FOLDER.to_string(),
            source: SourceDescriptor {
                source_url: source_url.into(),
            },
            targets,
        }
    }
}

/// Where the documents to translate live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    #[serde(rename = "SourceUrl")]
    pub source_url: String,
}

/// A target language and the container receiving its results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub language: String,
    pub target_url: String,
    /// Custom Translator category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossaries: Option<Vec<ServiceGlossary>>,
}

impl TargetDescriptor {
    pub fn new(language: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            target_url: target_url.into(),
            category: None,
            glossaries: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.is_empty());
        self
    }

    /// Attach glossaries; an empty list leaves the field out of the request
    pub fn with_glossaries(mut self, glossaries: Vec<ServiceGlossary>) -> Self {
        self.glossaries = if glossaries.is_empty() { None } else { Some(glossaries) };
        self
    }
}

/// Reference to one uploaded glossary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceGlossary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub glossary_url: String,
    pub storage_source: String,
}

impl ServiceGlossary {
    pub fn new(glossary_url: impl Into<String>, format: Option<String>) -> Self {
        Self {
            format,
            glossary_url: glossary_url.into(),
            storage_source: GLOSSARY_STORAGE_SOURCE.to_string(),
        }
    }
}

/// Error object returned by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub inner_error: Option<InnerError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

impl ErrorDetail {
    /// Parse the body of a rejected request.
    ///
    /// The service wraps the detail in `{"error": {...}}`; a bare detail object
    /// is accepted too, and anything else is kept verbatim as the message.
    pub fn from_body(body: &str) -> Self {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            return envelope.error;
        }
        match serde_json::from_str::<ErrorDetail>(body) {
            Ok(detail) if !detail.code.is_empty() || !detail.message.is_empty() => detail,
            _ => Self {
                code: "BadRequest".to_string(),
                message: body.trim().to_string(),
                ..Default::default()
            },
        }
    }
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(inner) = &self.inner_error {
            write!(f, " ({}: {})", inner.code, inner.message)?;
        }
        Ok(())
    }
}

/// Document counts of a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub in_progress: u32,
    #[serde(default)]
    pub not_yet_started: u32,
    #[serde(default)]
    pub cancelled: u32,
    #[serde(default)]
    pub total_character_charged: u64,
}

/// Lifecycle state derived from a status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Terminal, but not one of the named outcomes
    TerminalOther,
}

/// Response of the status and cancel endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created_date_time_utc: String,
    #[serde(default)]
    pub last_action_date_time_utc: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub summary: Summary,
}

impl JobStatus {
    /// A job stays live while it has not started or documents are in flight
    pub fn is_terminal(&self) -> bool {
        !(self.status == "NotStarted" || self.summary.in_progress != 0)
    }

    pub fn phase(&self) -> JobPhase {
        if self.status == "NotStarted" {
            return JobPhase::NotStarted;
        }
        if self.summary.in_progress != 0 {
            return JobPhase::Running;
        }
        match self.status.as_str() {
            "Succeeded" => JobPhase::Succeeded,
            "Failed" | "ValidationFailed" => JobPhase::Failed,
            "Cancelled" | "Cancelling" => JobPhase::Cancelled,
            _ => JobPhase::TerminalOther,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}/{} succeeded, {} failed, {} in progress",
            self.id,
            self.status,
            self.summary.success,
            self.summary.total,
            self.summary.failed,
            self.summary.in_progress
        )?;
        if let Some(error) = &self.error {
            write!(f, " - {}", error)?;
        }
        Ok(())
    }
}

/// Entry of the document or glossary formats listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFormat {
    pub format: String,
    #[serde(default)]
    pub file_extensions: Vec<String>,
    #[serde(default)]
    pub content_types: Vec<String>,
    #[serde(default)]
    pub default_version: Option<String>,
    #[serde(default)]
    pub versions: Option<Vec<String>>,
}

/// Body of `GET /documents/formats` and `GET /glossaries/formats`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormatsResponse {
    #[serde(default)]
    pub value: Vec<FileFormat>,
}

/// A language the service can translate into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    pub name: String,
    #[serde(default)]
    pub native_name: String,
    #[serde(default)]
    pub dir: String,
}

/// Body of the languages endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LanguagesResponse {
    #[serde(default)]
    pub translation: BTreeMap<String, Language>,
}
