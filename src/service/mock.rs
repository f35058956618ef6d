/*!
 * Scripted transport for testing.
 *
 * Responses are queued per HTTP method and handed out in order. Routes
 * registered with `route` answer every matching URL and take precedence over
 * the queues, which is how discovery endpoints are served. Every request is
 * recorded so tests can assert on call counts and bodies.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

use super::{Method, ServiceRequest, ServiceResponse, ServiceTransport};
use crate::errors::ServiceError;

type Scripted = Result<ServiceResponse, String>;

/// Mock transport returning predetermined responses
#[derive(Debug, Default)]
pub struct MockTransport {
    queues: Mutex<HashMap<Method, VecDeque<Scripted>>>,
    routes: Mutex<Vec<(Method, String, ServiceResponse)>>,
    requests: Mutex<Vec<ServiceRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next request with this method
    pub fn push(&self, method: Method, response: ServiceResponse) {
        self.queues.lock().entry(method).or_default().push_back(Ok(response));
    }

    /// Queue a transport failure for the next request with this method
    pub fn push_error(&self, method: Method, message: impl Into<String>) {
        self.queues
            .lock()
            .entry(method)
            .or_default()
            .push_back(Err(message.into()));
    }

    /// Answer every request whose URL ends with `url_suffix`
    pub fn route(&self, method: Method, url_suffix: impl Into<String>, response: ServiceResponse) {
        self.routes.lock().push((method, url_suffix.into(), response));
    }

    /// All requests received so far, oldest first
    pub fn requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, method: Method) -> usize {
        self.requests.lock().iter().filter(|r| r.method == method).count()
    }
}

#[async_trait]
impl ServiceTransport for MockTransport {
    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let method = request.method;
        let url = request.url.clone();
        self.requests.lock().push(request);

        let routed = self
            .routes
            .lock()
            .iter()
            .find(|(m, suffix, _)| *m == method && url.ends_with(suffix.as_str()))
            .map(|(_, _, response)| response.clone());
        if let Some(response) = routed {
            return Ok(response);
        }

        let next = self.queues.lock().get_mut(&method).and_then(VecDeque::pop_front);
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(ServiceError::RequestFailed(message)),
            None => Err(ServiceError::RequestFailed(format!(
                "no scripted response for {:?} {}",
                method, url
            ))),
        }
    }
}
