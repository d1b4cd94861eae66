use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A single call against the console API, path relative to the API origin.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
    pub cookie: Option<String>,
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
            cookie: None,
        }
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body,
            cookie: None,
        }
    }

    #[must_use]
    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Put,
            path: path.into(),
            body: Some(body),
            cookie: None,
        }
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            body: None,
            cookie: None,
        }
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    /// Only reads may be retried by a transport.
    #[must_use]
    pub fn is_idempotent(&self) -> bool {
        matches!(self.method, HttpMethod::Get)
    }
}

/// A response that reached us, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, 401 | 403)
    }

    /// Operator-facing message carried by an error body, if any.
    ///
    /// Looks at `error` (string or `{ message }`), then `message`, then `msg`.
    #[must_use]
    pub fn server_message(&self) -> Option<String> {
        let error = self.body.get("error");
        error
            .and_then(Value::as_str)
            .or_else(|| {
                error
                    .and_then(|value| value.get("message"))
                    .and_then(Value::as_str)
            })
            .or_else(|| self.body.get("message").and_then(Value::as_str))
            .or_else(|| self.body.get("msg").and_then(Value::as_str))
            .map(str::trim)
            .filter(|message| !message.is_empty())
            .map(ToString::to_string)
    }

    pub fn decode<T>(&self) -> Result<T, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        T::deserialize(&self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("console_api_invalid_path")]
    InvalidPath,
    #[error("console_api_request_failed:{message}")]
    Request { message: String },
    #[error("console_api_read_failed:{message}")]
    Read { message: String },
}

/// Seam between orchestration and the network.
///
/// `Ok` means a response arrived (any status); `Err` means none did.
#[async_trait]
pub trait ConsoleTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}
