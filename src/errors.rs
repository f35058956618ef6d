/*!
 * Error types for the doctrans library.
 *
 * This module contains custom error types for the different stages of a
 * batch run, using the thiserror crate for ergonomic error definitions.
 * `RunError` is what callers of the orchestrator see; it always names the
 * phase that failed.
 */

use std::path::PathBuf;
use thiserror::Error;

use crate::service::models::{ErrorDetail, JobStatus};

/// Errors raised when required configuration is missing or malformed
#[derive(Error, Debug)]
pub enum CredentialsError {
    /// A required credential was not supplied ("key", "name" or "storage")
    #[error("Missing credential: {0}")]
    Missing(&'static str),

    /// The storage connection string could not be understood
    #[error("Invalid storage connection string: {0}")]
    InvalidConnectionString(String),
}

/// Errors that can occur when talking to object storage
#[derive(Error, Debug)]
pub enum StorageError {
    /// A container-level operation was refused by the storage service
    #[error("Container operation on '{container}' failed: {message}")]
    Container {
        /// Container the operation targeted
        container: String,
        /// Status and body returned by the service
        message: String,
    },

    /// Uploading a blob failed
    #[error("Upload of '{name}' failed: {message}")]
    UploadFailed { name: String, message: String },

    /// Downloading a blob failed
    #[error("Download of '{name}' failed: {message}")]
    DownloadFailed { name: String, message: String },

    /// The container or blob does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A listing or header could not be parsed
    #[error("Failed to parse storage response: {0}")]
    ParseError(String),

    /// The request never produced a response
    #[error("Storage request failed: {0}")]
    RequestFailed(String),

    /// Signing a delegated-access URI failed
    #[error("Failed to sign access token: {0}")]
    Signing(String),

    /// Local file I/O around a transfer failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur when calling the translation service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Error when sending the request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },
}

impl ServiceError {
    /// Whether repeating the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(_) => true,
            Self::ApiError { status_code, .. } => *status_code == 429 || *status_code >= 500,
            Self::ParseError(_) => false,
        }
    }
}

/// Errors that can occur when submitting a translation request
#[derive(Error, Debug)]
pub enum SubmissionError {
    /// The service rejected the request body (HTTP 400); never retried
    #[error("Translation request rejected: {0}")]
    Rejected(ErrorDetail),

    /// Every attempt failed without producing a job handle
    #[error("No job handle after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Number of requests issued
        attempts: u32,
        /// Description of the final failure
        last_error: String,
    },

    /// The request body could not be serialized
    #[error("Failed to serialize translation request: {0}")]
    Serialize(String),
}

/// Problems with the files handed to a run, detected before any remote call
#[derive(Error, Debug)]
pub enum InputError {
    /// Nothing left to translate after filtering
    #[error("No translatable documents among {0} input file(s)")]
    NoDocuments(usize),

    /// Two inputs would be stored under the same object name
    #[error("Files {first:?} and {second:?} share the storage name '{name}'")]
    NameCollision {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// The target language is not offered by the service
    #[error("Unsupported target language: {0}")]
    UnsupportedLanguage(String),

    /// Reading the input paths failed
    #[error("Failed to read input: {0}")]
    Io(String),
}

/// Errors that end a status-polling loop early
#[derive(Error, Debug)]
pub enum PollError {
    /// The status endpoint failed with a non-transient error, or too many transient ones
    #[error("Status query failed: {0}")]
    Service(#[from] ServiceError),

    /// The caller's cancellation token fired
    #[error("Polling cancelled")]
    Cancelled {
        /// Last status observed before cancellation
        last_status: Option<JobStatus>,
    },
}

/// Stage of a batch run, used to report where a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Credentials,
    Initialize,
    Input,
    Provision,
    Upload,
    Submission,
    Poll,
    Job,
    Download,
    Cancelled,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Credentials => "credentials",
            Self::Initialize => "initialize",
            Self::Input => "input",
            Self::Provision => "provision",
            Self::Upload => "upload",
            Self::Submission => "submission",
            Self::Poll => "poll",
            Self::Job => "job",
            Self::Download => "download",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Fatal error of a batch run
#[derive(Error, Debug)]
pub enum RunError {
    /// Configuration was missing before any network call
    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    /// Format or language discovery failed
    #[error("Initialization failed: {0}")]
    Initialize(ServiceError),

    /// The input files cannot be translated as given
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    /// Containers could not be created or signed
    #[error("Provisioning failed: {0}")]
    Provision(StorageError),

    /// No document reached the source container
    #[error("Upload failed: {failed} of {total} document(s) could not be uploaded")]
    Upload { failed: usize, total: usize },

    /// The translation request was rejected or never accepted
    #[error("Submission failed: {0}")]
    Submission(#[from] SubmissionError),

    /// Status polling failed
    #[error("Status polling failed: {0}")]
    Poll(ServiceError),

    /// The remote job finished in a failed state
    #[error("Translation job ended unsuccessfully: {status}")]
    JobFailed { status: JobStatus },

    /// Listing or downloading results failed
    #[error("Download failed: {0}")]
    Download(StorageError),

    /// The caller cancelled the run
    #[error("Run cancelled")]
    Cancelled { last_status: Option<JobStatus> },
}

impl RunError {
    /// The phase in which the run stopped
    pub fn phase(&self) -> RunPhase {
        match self {
            Self::Credentials(_) => RunPhase::Credentials,
            Self::Initialize(_) => RunPhase::Initialize,
            Self::Input(_) => RunPhase::Input,
            Self::Provision(_) => RunPhase::Provision,
            Self::Upload { .. } => RunPhase::Upload,
            Self::Submission(_) => RunPhase::Submission,
            Self::Poll(_) => RunPhase::Poll,
            Self::JobFailed { .. } => RunPhase::Job,
            Self::Download(_) => RunPhase::Download,
            Self::Cancelled { .. } => RunPhase::Cancelled,
        }
    }

    /// Error detail reported by the remote service, if it sent one
    pub fn error_detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Submission(SubmissionError::Rejected(detail)) => Some(detail),
            Self::JobFailed { status } => status.error.as_ref(),
            _ => None,
        }
    }
}

impl From<PollError> for RunError {
    fn from(error: PollError) -> Self {
        match error {
            PollError::Service(e) => Self::Poll(e),
            PollError::Cancelled { last_status } => Self::Cancelled { last_status },
        }
    }
}
