//! Where the fleet console lives.
//!
//! The session guard needs both the API origin and the bare host: cookies are
//! expired per domain during a hard clear, so the host is parsed once here
//! instead of being re-derived at every call site.

use std::fmt;

pub const DEFAULT_CONSOLE_ORIGIN: &str = "http://127.0.0.1:8080";
pub const ENV_CONSOLE_ORIGIN: &str = "SERVERCON_BASE_URL";
/// Older deployments exported the API root under this name.
pub const ENV_CONSOLE_ORIGIN_ALIAS: &str = "SERVERCON_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OriginError {
    #[error("console origin must not be empty")]
    Empty,
    #[error("console origin must use http or https, got {0:?}")]
    UnsupportedScheme(String),
    #[error("console origin has no host")]
    MissingHost,
}

/// Which setting an origin was taken from, for the startup log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginSource {
    Env(&'static str),
    Flag,
    DefaultLocal,
}

impl fmt::Display for OriginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env(key) => f.write_str(key),
            Self::Flag => f.write_str("--base-url"),
            Self::DefaultLocal => f.write_str("default_local"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleOrigin {
    url: String,
    host: String,
    secure: bool,
    source: OriginSource,
}

impl ConsoleOrigin {
    /// Accepts `http(s)://host[:port][/prefix]`. Surrounding whitespace and
    /// trailing slashes are dropped so paths can be appended directly.
    pub fn parse(raw: &str, source: OriginSource) -> Result<Self, OriginError> {
        let url = raw.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(OriginError::Empty);
        }
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| OriginError::UnsupportedScheme(String::new()))?;
        let secure = match scheme.to_ascii_lowercase().as_str() {
            "https" => true,
            "http" => false,
            other => return Err(OriginError::UnsupportedScheme(other.to_string())),
        };
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
        let host = cookie_host(authority);
        if host.is_empty() {
            return Err(OriginError::MissingHost);
        }
        Ok(Self {
            url: url.to_string(),
            host: host.to_ascii_lowercase(),
            secure,
            source,
        })
    }

    /// First non-blank of the primary variable, its alias, then the local default.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, OriginError> {
        for key in [ENV_CONSOLE_ORIGIN, ENV_CONSOLE_ORIGIN_ALIAS] {
            if let Some(raw) = lookup(key).filter(|value| !value.trim().is_empty()) {
                return Self::parse(&raw, OriginSource::Env(key));
            }
        }
        Self::parse(DEFAULT_CONSOLE_ORIGIN, OriginSource::DefaultLocal)
    }

    pub fn from_env() -> Result<Self, OriginError> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Host used as the cookie domain when expiring session cookies.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    #[must_use]
    pub fn source(&self) -> OriginSource {
        self.source
    }
}

impl fmt::Display for ConsoleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

// Cookie domains never carry a port; bracketed IPv6 literals lose the brackets.
fn cookie_host(authority: &str) -> &str {
    if let Some(bracketed) = authority.strip_prefix('[') {
        return bracketed.split(']').next().unwrap_or_default();
    }
    authority.split(':').next().unwrap_or_default()
}
