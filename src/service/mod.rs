/*!
 * Client for the remote document translation service.
 *
 * The service is reached through a `ServiceTransport`, which hides the HTTP
 * stack from the submission, status and cancellation logic:
 * - `http`: reqwest-backed transport used in production
 * - `mock`: scripted transport for tests
 * - `catalog`: format and language discovery
 * - `models`: request and response bodies
 */

use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::Config;
use crate::errors::{CredentialsError, ServiceError, SubmissionError};

pub mod catalog;
pub mod http;
pub mod mock;
pub mod models;

pub use catalog::ServiceCatalog;
use models::{BatchInput, BatchRequest, ErrorDetail, JobStatus};

/// Header carrying the subscription key
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header carrying the job status URL after a successful submission
pub const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// HTTP verbs used against the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// A single call to the service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub method: Method,
    pub url: String,
    /// JSON body, for POST only
    pub body: Option<String>,
    /// Whether the subscription key header is attached
    pub authenticated: bool,
}

impl ServiceRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            authenticated: true,
        }
    }

    pub fn post(url: impl Into<String>, body: String) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body),
            authenticated: true,
        }
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            url: url.into(),
            body: None,
            authenticated: true,
        }
    }

    /// Drop the subscription key (for public endpoints)
    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

/// What came back from the service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub status: u16,
    /// Value of the `Operation-Location` header, if present
    pub operation_location: Option<String>,
    pub body: String,
}

impl ServiceResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            operation_location: None,
            body: body.into(),
        }
    }

    /// 202 Accepted carrying a job status URL
    pub fn accepted(operation_location: impl Into<String>) -> Self {
        Self {
            status: 202,
            operation_location: Some(operation_location.into()),
            body: String::new(),
        }
    }

    /// 200 OK with a JSON body
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        Self::new(200, serde_json::to_string(value).unwrap_or_default())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse a successful JSON body, mapping failures to `ServiceError`
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, ServiceError> {
        if !self.is_success() {
            return Err(ServiceError::ApiError {
                status_code: self.status,
                message: self.body.clone(),
            });
        }
        serde_json::from_str(&self.body).map_err(|e| ServiceError::ParseError(e.to_string()))
    }
}

/// Common trait for all ways of reaching the translation service
#[async_trait]
pub trait ServiceTransport: Send + Sync + Debug {
    /// Send one request and return the raw response.
    ///
    /// Only failures to obtain a response are errors; HTTP error statuses are
    /// returned as responses so callers can classify them.
    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, ServiceError>;
}

/// Retry settings for submissions
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    /// Total number of POST attempts
    pub attempts: u32,
    /// Fixed wait after a transient failure
    pub backoff: Duration,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Document translation service client.
///
/// Cheap to clone and shared read-only between runs; it holds no per-run state.
#[derive(Debug, Clone)]
pub struct DocumentTranslationService {
    transport: Arc<dyn ServiceTransport>,
    endpoint: String,
    languages_endpoint: String,
    options: SubmitOptions,
}

impl DocumentTranslationService {
    /// Create a client for the given batch endpoint
    pub fn new(
        transport: Arc<dyn ServiceTransport>,
        endpoint: impl Into<String>,
        languages_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            languages_endpoint: languages_endpoint.into(),
            options: SubmitOptions::default(),
        }
    }

    /// Build an HTTP-backed client from validated configuration
    pub fn from_config(config: &Config) -> Result<Self, CredentialsError> {
        config.validate()?;
        let transport = http::HttpTransport::new(
            &config.credentials.subscription_key,
            Duration::from_secs(config.run.request_timeout_secs),
        );
        Ok(Self::new(
            Arc::new(transport),
            config.translation_endpoint(),
            config.languages_endpoint.clone(),
        )
        .with_submit_options(SubmitOptions {
            attempts: config.run.submit_attempts,
            backoff: Duration::from_millis(config.run.retry_backoff_ms),
        }))
    }

    pub fn with_submit_options(mut self, options: SubmitOptions) -> Self {
        self.options = SubmitOptions {
            attempts: options.attempts.max(1),
            backoff: options.backoff,
        };
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit the translation request and return the job handle (status URL).
    ///
    /// A 400 is terminal and carries the parsed error detail. Any other failure
    /// waits the fixed backoff and tries again, up to the attempt budget.
    pub async fn submit(&self, input: BatchInput) -> Result<String, SubmissionError> {
        let request = BatchRequest { inputs: vec![input] };
        let body = serde_json::to_string(&request)
            .map_err(|e| SubmissionError::Serialize(e.to_string()))?;
        trace!("SubmitTranslationRequest: RequestJson: {}", body);

        let url = format!("{}/batches", self.endpoint);
        let attempts = self.options.attempts;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            let mut backoff = true;
            match self.transport.send(ServiceRequest::post(&url, body.clone())).await {
                Ok(response) if response.is_success() => {
                    debug!("Translation request response code: {}", response.status);
                    if let Some(location) = response.operation_location {
                        info!("Translation job accepted: {}", location);
                        return Ok(location);
                    }
                    warn!(
                        "Translation request succeeded without {} header - attempt {}/{}",
                        OPERATION_LOCATION_HEADER, attempt, attempts
                    );
                    last_error = format!("HTTP {} without {} header", response.status, OPERATION_LOCATION_HEADER);
                    backoff = false;
                }
                Ok(response) if response.status == 400 => {
                    let detail = ErrorDetail::from_body(&response.body);
                    error!("Translation request rejected: {}", detail);
                    return Err(SubmissionError::Rejected(detail));
                }
                Ok(response) => {
                    warn!(
                        "Translation request failed ({}): {} - attempt {}/{}",
                        response.status, response.body, attempt, attempts
                    );
                    last_error = format!("HTTP {}: {}", response.status, response.body);
                }
                Err(e) => {
                    warn!("Translation request error: {} - attempt {}/{}", e, attempt, attempts);
                    last_error = e.to_string();
                }
            }

            if backoff && attempt < attempts {
                tokio::time::sleep(self.options.backoff).await;
            }
        }

        error!("Start of translation job failed after {} attempts", attempts);
        Err(SubmissionError::Exhausted { attempts, last_error })
    }

    /// Retrieve the status of a job
    pub async fn check_status(&self, job_handle: &str) -> Result<JobStatus, ServiceError> {
        let response = self.transport.send(ServiceRequest::get(job_handle)).await?;
        let status: JobStatus = response.parse()?;
        debug!(
            "CheckStatus: Status: {} inProgress: {}",
            status.status, status.summary.in_progress
        );
        Ok(status)
    }

    /// Ask the service to cancel a job.
    ///
    /// Returns the status reported by the service; a running poll loop sees the
    /// cancellation on its next query.
    pub async fn cancel(&self, job_handle: &str) -> Result<JobStatus, ServiceError> {
        let response = self.transport.send(ServiceRequest::delete(job_handle)).await?;
        let status: JobStatus = response.parse()?;
        info!("CancelStatus: Status: {} inProgress: {}", status.status, status.summary.in_progress);
        Ok(status)
    }
}
