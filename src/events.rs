/*!
 * Progress events of a run.
 *
 * Events flow over a bounded `mpsc` channel owned by the caller. Sending
 * waits for room in the channel, so the caller should drain the receiver
 * while the run is in progress. During a run every send also races the
 * run's cancellation token: a full channel never outlives cancellation. A
 * receiver that has gone away is ignored so that losing interest in
 * progress never fails a run.
 */

use log::{debug, trace};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::service::models::JobStatus;

/// Notification sent to the caller while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// The job status changed
    Status(JobStatus),
    /// Results were written locally
    DownloadComplete { files: Vec<String> },
    /// Containers were cleaned up; nothing more will be sent
    RunComplete,
}

/// Sending half of a run's progress channel
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<RunEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::Sender<RunEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Create a sink and the receiver the caller reads from
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self::new(sender), receiver)
    }

    /// Send an event unless `cancel` fires while waiting for room.
    ///
    /// Returns false when cancellation won and the event was dropped.
    pub async fn emit(&self, event: RunEvent, cancel: &CancellationToken) -> bool {
        let Some(sender) = &self.sender else {
            return true;
        };
        let event = match sender.try_send(event) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Progress receiver dropped; event discarded");
                return true;
            }
            Err(mpsc::error::TrySendError::Full(event)) => event,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Run cancelled while waiting for the progress receiver");
                false
            }
            result = sender.send(event) => {
                if result.is_err() {
                    trace!("Progress receiver dropped; event discarded");
                }
                true
            }
        }
    }
}
