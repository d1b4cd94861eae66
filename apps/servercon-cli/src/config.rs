use std::env;
use std::time::Duration;

use servercon_api::{DEFAULT_REQUEST_ATTEMPTS, DEFAULT_TIMEOUT_MS};
use servercon_core::config::{ConsoleOrigin, OriginError, OriginSource};
use thiserror::Error;

pub const ENV_REQUEST_TIMEOUT_MS: &str = "SERVERCON_REQUEST_TIMEOUT_MS";
pub const ENV_REQUEST_ATTEMPTS: &str = "SERVERCON_REQUEST_ATTEMPTS";
pub const ENV_PING_INTERVAL_SECS: &str = "SERVERCON_PING_INTERVAL_SECS";
pub const ENV_SESSION_COOKIE: &str = "SERVERCON_SESSION_COOKIE";
pub const ENV_LOG_FILTER: &str = "SERVERCON_LOG_FILTER";
pub const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub origin: ConsoleOrigin,
    pub timeout_ms: u64,
    pub request_attempts: usize,
    pub ping_interval: Option<Duration>,
    pub session_cookie: Option<String>,
    pub log_filter: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid console base url: {0}")]
    InvalidOrigin(#[from] OriginError),
    #[error("invalid SERVERCON_REQUEST_TIMEOUT_MS: {0}")]
    InvalidRequestTimeout(String),
    #[error("invalid SERVERCON_REQUEST_ATTEMPTS: {0}")]
    InvalidRequestAttempts(String),
    #[error("invalid SERVERCON_PING_INTERVAL_SECS: {0}")]
    InvalidPingInterval(String),
}

/// Command-line values that win over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub cookie: Option<String>,
    pub ping_interval_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let origin = ConsoleOrigin::from_env()?;
        let timeout_ms = parse_timeout_ms(env_non_empty(ENV_REQUEST_TIMEOUT_MS))?;
        let request_attempts = parse_request_attempts(env_non_empty(ENV_REQUEST_ATTEMPTS))?;
        let ping_interval = parse_ping_interval(env_non_empty(ENV_PING_INTERVAL_SECS))?;
        let session_cookie = env_non_empty(ENV_SESSION_COOKIE);
        let log_filter =
            env_non_empty(ENV_LOG_FILTER).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            origin,
            timeout_ms,
            request_attempts,
            ping_interval,
            session_cookie,
            log_filter,
        })
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Result<Self, ConfigError> {
        if let Some(base_url) = overrides.base_url {
            self.origin = ConsoleOrigin::parse(&base_url, OriginSource::Flag)?;
        }
        if let Some(cookie) = overrides.cookie.filter(|cookie| !cookie.trim().is_empty()) {
            self.session_cookie = Some(cookie.trim().to_string());
        }
        if let Some(seconds) = overrides.ping_interval_secs {
            self.ping_interval = interval_from_secs(seconds);
        }
        Ok(self)
    }
}

fn parse_timeout_ms(raw: Option<String>) -> Result<u64, ConfigError> {
    raw.map_or(Ok(DEFAULT_TIMEOUT_MS), |value| {
        value
            .parse::<u64>()
            .map_err(|error| ConfigError::InvalidRequestTimeout(error.to_string()))
    })
}

fn parse_request_attempts(raw: Option<String>) -> Result<usize, ConfigError> {
    let attempts = raw.map_or(Ok(DEFAULT_REQUEST_ATTEMPTS), |value| {
        value
            .parse::<usize>()
            .map_err(|error| ConfigError::InvalidRequestAttempts(error.to_string()))
    })?;
    if attempts == 0 {
        return Err(ConfigError::InvalidRequestAttempts(
            "must be at least 1".to_string(),
        ));
    }
    Ok(attempts)
}

/// Unset or `0` means one check per subject.
fn parse_ping_interval(raw: Option<String>) -> Result<Option<Duration>, ConfigError> {
    let Some(value) = raw else {
        return Ok(None);
    };
    let seconds = value
        .parse::<u64>()
        .map_err(|error| ConfigError::InvalidPingInterval(error.to_string()))?;
    Ok(interval_from_secs(seconds))
}

fn interval_from_secs(seconds: u64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
