use async_trait::async_trait;
use log::trace;
use reqwest::{Client, header};
use std::time::Duration;

use super::{Method, OPERATION_LOCATION_HEADER, SUBSCRIPTION_KEY_HEADER, ServiceRequest, ServiceResponse, ServiceTransport};
use crate::errors::ServiceError;

/// reqwest-backed transport authenticating with a subscription key
pub struct HttpTransport {
    /// HTTP client for API requests
    client: Client,
    /// Subscription key of the Translator resource
    subscription_key: String,
}

impl HttpTransport {
    pub fn new(subscription_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            subscription_key: subscription_key.into(),
        }
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("subscription_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl ServiceTransport for HttpTransport {
    async fn send(&self, request: ServiceRequest) -> Result<ServiceResponse, ServiceError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        if request.authenticated {
            builder = builder.header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key);
        }
        if let Some(body) = request.body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ServiceError::RequestFailed(format!("{:?} {}: {}", request.method, request.url, e)))?;

        let status = response.status().as_u16();
        let operation_location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::RequestFailed(format!("Failed to read response body: {}", e)))?;
        trace!("{:?} {} -> {}: {}", request.method, request.url, status, body);

        Ok(ServiceResponse {
            status,
            operation_location,
            body,
        })
    }
}
