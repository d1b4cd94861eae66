use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use serde_json::Value;

use crate::transport::{ApiRequest, ApiResponse, ConsoleTransport, HttpMethod, TransportError};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_REQUEST_ATTEMPTS: usize = 1;
const MIN_TIMEOUT_MS: u64 = 250;

#[derive(Debug, Clone)]
pub struct ConsoleClientConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub request_attempts: usize,
}

impl ConsoleClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            request_attempts: DEFAULT_REQUEST_ATTEMPTS,
        }
    }
}

/// reqwest-backed [`ConsoleTransport`].
///
/// Every request carries the caller's cookie header verbatim, an
/// `x-request-id`, and the configured timeout budget. Reads are retried up to
/// `request_attempts` times on transport errors; writes are sent exactly once.
#[derive(Debug, Clone)]
pub struct ConsoleHttpClient {
    base_url: String,
    timeout: Duration,
    request_attempts: usize,
    http: reqwest::Client,
}

impl ConsoleHttpClient {
    pub fn new(config: ConsoleClientConfig) -> Result<Self, TransportError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(TransportError::InvalidPath);
        }
        Ok(Self {
            base_url,
            timeout: Duration::from_millis(config.timeout_ms.max(MIN_TIMEOUT_MS)),
            request_attempts: config.request_attempts.max(1),
            http: reqwest::Client::new(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    fn build(&self, url: &str, request: &ApiRequest) -> reqwest::RequestBuilder {
        let builder = match request.method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
            HttpMethod::Put => self.http.put(url),
            HttpMethod::Delete => self.http.delete(url),
        };
        let builder = builder
            .header("x-request-id", format!("req_{}", uuid::Uuid::new_v4().simple()))
            .timeout(self.timeout);
        let builder = match request.cookie.as_deref() {
            Some(cookie) if !cookie.trim().is_empty() => builder.header(COOKIE, cookie),
            _ => builder,
        };
        match request.body.as_ref() {
            Some(body) => builder.json(body),
            None if request.method == HttpMethod::Post => {
                builder.header(CONTENT_TYPE, "application/json")
            }
            None => builder,
        }
    }
}

#[async_trait]
impl ConsoleTransport for ConsoleHttpClient {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self
            .endpoint(&request.path)
            .ok_or(TransportError::InvalidPath)?;
        let attempts = if request.is_idempotent() {
            self.request_attempts
        } else {
            1
        };
        let mut last_error: Option<String> = None;

        for attempt in 0..attempts {
            match self.build(&url, &request).send().await {
                Ok(response) => {
                    tracing::debug!(
                        method = request.method.as_str(),
                        path = %request.path,
                        status = response.status().as_u16(),
                        "console api response"
                    );
                    return read_response(response).await;
                }
                Err(error) => {
                    tracing::warn!(
                        method = request.method.as_str(),
                        path = %request.path,
                        attempt = attempt + 1,
                        error = %error,
                        "console api request failed"
                    );
                    last_error = Some(error.to_string());
                }
            }
        }

        Err(TransportError::Request {
            message: last_error.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

async fn read_response(response: reqwest::Response) -> Result<ApiResponse, TransportError> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|error| TransportError::Read {
            message: error.to_string(),
        })?;
    Ok(ApiResponse::new(status, decode_body(&bytes)))
}

// Non-JSON bodies (proxy error pages, empty 204s) are kept as text or null so
// status handling still works.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).trim().to_string()))
}
