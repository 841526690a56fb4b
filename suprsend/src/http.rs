//! HTTP client abstraction for making signed requests.
//!
//! This module defines the `HttpClient` trait to abstract request execution, enabling
//! testability with mock implementations. Requests are fully signed before they reach
//! a client, so implementations only move bytes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::errors::{Error, Result};
use crate::signing::{self, HEADER_DATE_FMT, SigningHeaders};

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request with its signed headers and the exact body text that was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub url: String,
    /// Path plus query, as signed
    pub request_uri: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl SignedRequest {
    /// Serialize `body`, sign it and attach `Content-Type`, `Date`, `User-Agent` and
    /// `Authorization` headers.
    pub fn build(method: &str, url: &str, body: Option<&Value>, config: &ClientConfig, now: DateTime<Utc>) -> Result<Self> {
        let signing_headers = SigningHeaders {
            content_type: CONTENT_TYPE_JSON.to_string(),
            date: now.format(HEADER_DATE_FMT).to_string(),
        };
        let signature = signing::sign(url, method, body, &signing_headers, &config.workspace_secret)?;
        let authorization = signing::authorization_header(&config.workspace_key, &signature);

        Ok(Self {
            method: method.to_string(),
            url: url.to_string(),
            request_uri: signing::request_uri(url)?,
            headers: vec![
                ("Content-Type".to_string(), signing_headers.content_type),
                ("Date".to_string(), signing_headers.date),
                ("User-Agent".to_string(), config.user_agent()),
                ("Authorization".to_string(), authorization),
            ],
            body: signature.content_txt,
        })
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Trait for executing signed HTTP requests.
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new();
/// let response = client.execute(&signed_request).await?;
/// println!("Status: {}, Body: {}", response.status, response.body);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute a request.
    ///
    /// Any received status is `Ok`; only transport failures are errors.
    async fn execute(&self, request: &SignedRequest) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Client with a per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Client honouring `http_timeout_secs` from the config.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        match config.http_timeout_secs {
            Some(secs) => Self::with_timeout(Duration::from_secs(secs)),
            None => Ok(Self::new()),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, uri = %request.request_uri))]
    async fn execute(&self, request: &SignedRequest) -> Result<HttpResponse> {
        let method: reqwest::Method = request.method.parse().map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
            Error::input(format!("Invalid HTTP method '{}': {}", request.method, e))
        })?;

        let mut req = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if !request.body.is_empty() {
            req = req.body(request.body.clone());
            tracing::trace!(body_len = request.body.len(), "Added request body");
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(url = %request.url, error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::debug!(status = status, response_len = body.len(), "HTTP request completed");

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Mock HTTP client for testing.
///
/// Responses are queued per `"{METHOD} {request_uri}"` key and returned in FIFO order.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response("POST /trigger/", Ok(HttpResponse::new(202, r#"{"success": true}"#)));
/// ```
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<Result<HttpResponse>>>>>,
    calls: Arc<Mutex<Vec<SignedRequest>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.responses.lock().entry(key.to_string()).or_default().push(response);
    }

    /// Every request executed so far, in order.
    pub fn get_calls(&self) -> Vec<SignedRequest> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &SignedRequest) -> Result<HttpResponse> {
        self.calls.lock().push(request.clone());

        let key = format!("{} {}", request.method, request.request_uri);
        let mut responses = self.responses.lock();
        if let Some(queue) = responses.get_mut(&key)
            && !queue.is_empty()
        {
            return queue.remove(0);
        }

        Err(Error::Transport {
            message: format!("No mock response configured for {key}"),
        })
    }
}
