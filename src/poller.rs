/*!
 * Status polling.
 *
 * The poller queries the job at a fixed interval until the job is terminal,
 * i.e. it has started and no document is in progress. A progress event is
 * emitted whenever the job's last-action timestamp moves. Polling stops
 * early when the cancellation token fires, even while it waits on a full
 * progress channel, or when the status endpoint keeps failing.
 */

use log::{debug, info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::PollError;
use crate::events::{EventSink, RunEvent};
use crate::service::DocumentTranslationService;
use crate::service::models::JobStatus;

/// Tracks the last-action timestamp to suppress duplicate notifications
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_action: Option<String>,
}

impl ChangeDetector {
    /// Whether this status differs from the previously observed one
    pub fn observe(&mut self, status: &JobStatus) -> bool {
        if self.last_action.as_deref() == Some(status.last_action_date_time_utc.as_str()) {
            return false;
        }
        self.last_action = Some(status.last_action_date_time_utc.clone());
        true
    }
}

/// Polls one job until it is terminal
#[derive(Debug, Clone)]
pub struct StatusPoller {
    service: DocumentTranslationService,
    interval: Duration,
    /// Consecutive transient failures tolerated
    max_errors: u32,
}

impl StatusPoller {
    pub fn new(service: DocumentTranslationService, interval: Duration) -> Self {
        Self {
            service,
            interval,
            max_errors: 3,
        }
    }

    pub fn with_max_errors(mut self, max_errors: u32) -> Self {
        self.max_errors = max_errors;
        self
    }

    /// Poll until the job is terminal and return the final status.
    ///
    /// Each iteration waits the interval, then queries. Transient failures
    /// are retried on the next iteration until `max_errors` are seen in a row.
    pub async fn poll_until_terminal(
        &self,
        job_handle: &str,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<JobStatus, PollError> {
        let mut detector = ChangeDetector::default();
        let mut last_status: Option<JobStatus> = None;
        let mut consecutive_errors = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled { last_status }),
                _ = tokio::time::sleep(self.interval) => {}
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PollError::Cancelled { last_status }),
                result = self.service.check_status(job_handle) => result,
            };

            match result {
                Ok(status) => {
                    consecutive_errors = 0;
                    if detector.observe(&status) {
                        debug!("Job status changed: {}", status);
                        if !events.emit(RunEvent::Status(status.clone()), cancel).await {
                            return Err(PollError::Cancelled {
                                last_status: Some(status),
                            });
                        }
                    }
                    if status.is_terminal() {
                        info!("Job reached terminal status: {}", status);
                        return Ok(status);
                    }
                    last_status = Some(status);
                }
                Err(e) if e.is_transient() && consecutive_errors < self.max_errors => {
                    consecutive_errors += 1;
                    warn!(
                        "Status query failed: {} - attempt {}/{}",
                        e, consecutive_errors, self.max_errors
                    );
                }
                Err(e) => return Err(PollError::Service(e)),
            }
        }
    }
}
