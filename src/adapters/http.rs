//! Shared reqwest plumbing for HTTP-backed adapters.

use crate::adapters::{AdapterError, AdapterResult};
use crate::config::HttpClientConfig;
use log::trace;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;

/// Build a client with JSON defaults, the configured timeout and extra headers.
pub fn build_client(config: &HttpClientConfig, mut headers: HeaderMap) -> AdapterResult<Client> {
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .build()
        .map_err(|e| AdapterError::invalid_configuration(format!("HTTP client: {}", e)))
}

pub fn header_value(value: &str) -> AdapterResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| AdapterError::invalid_configuration("credential is not a valid header value"))
}

/// Map a reqwest failure to an adapter error, keeping timeouts distinguishable.
pub fn transport_error(operation: &str, error: reqwest::Error, config: &HttpClientConfig) -> AdapterError {
    if error.is_timeout() {
        AdapterError::Timeout {
            operation: operation.to_string(),
            timeout_ms: config.request_timeout.as_millis() as u64,
        }
    } else {
        AdapterError::Transport {
            message: format!("{} failed: {}", operation, error),
            source: Some(Box::new(error)),
        }
    }
}

/// A non-success response, with its body parsed as JSON when possible.
pub struct ErrorResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl ErrorResponse {
    pub async fn read(response: Response) -> Self {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);
        trace!("Remote error response {}: {}", status, text);
        Self { status, body, text }
    }

    pub fn into_error(self, resource: &str) -> AdapterError {
        if self.status == StatusCode::NOT_FOUND {
            return AdapterError::not_found(resource);
        }
        AdapterError::Http {
            status: self.status.as_u16(),
            message: if self.text.is_empty() {
                self.status.to_string()
            } else {
                self.text
            },
        }
    }
}

/// Pass successful responses through; turn the rest into adapter errors.
pub async fn check(response: Response, resource: &str) -> AdapterResult<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ErrorResponse::read(response).await.into_error(resource))
    }
}

pub async fn json_body(response: Response) -> AdapterResult<Value> {
    if response.status() == StatusCode::NO_CONTENT {
        return Ok(Value::Null);
    }
    response
        .json()
        .await
        .map_err(|e| AdapterError::invalid_response(e.to_string()))
}
