//! Session gating: identity resolution, the shared auth-failure check, and
//! the redirect/clear side effects that terminate a failed session.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use servercon_api::{
    ApiRequest, ApiResponse, ConsoleTransport, TransportError, UserIdentity, paths,
};
use thiserror::Error;

use crate::error::ActionError;

/// Substring of the cookie header that proves a session once existed.
pub const SESSION_COOKIE_MARKER: &str = "auth-session";
pub const ADMIN_GROUPS: [&str; 2] = ["*", "callowaysutton"];
const EPOCH_EXPIRY: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub groups: BTreeSet<String>,
}

impl Identity {
    #[must_use]
    pub fn new<I, S>(email: impl Into<String>, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            email: email.into(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        is_admin(self)
    }
}

impl From<UserIdentity> for Identity {
    fn from(value: UserIdentity) -> Self {
        Self::new(value.email, value.groups)
    }
}

#[must_use]
pub fn is_admin(identity: &Identity) -> bool {
    ADMIN_GROUPS
        .iter()
        .any(|group| identity.groups.contains(*group))
}

/// Terminal navigation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Redirect {
    Landing,
    Login,
    Dashboard,
}

impl Redirect {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
        }
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, target: Redirect);
}

/// Supplies the session cookie for outgoing calls and owns client-side state
/// that a hard clear must wipe.
pub trait CredentialProvider: Send + Sync {
    fn cookie_header(&self) -> Option<String>;

    fn has_session_marker(&self) -> bool {
        self.cookie_header()
            .is_some_and(|header| header.contains(SESSION_COOKIE_MARKER))
    }

    /// Expires every cookie and clears local and session storage.
    ///
    /// Returns the expiry directives that were issued.
    fn hard_clear(&self) -> Vec<String>;
}

/// Cookie names in a `Cookie` header, in order of appearance.
#[must_use]
pub fn cookie_names(header: &str) -> Vec<String> {
    header
        .split(';')
        .map(|pair| pair.split_once('=').map_or(pair, |(name, _)| name).trim())
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Expiry directives covering the bare path, the host, and the host's
/// subdomain wildcard for each cookie.
#[must_use]
pub fn expiry_directives(names: &[String], host: &str) -> Vec<String> {
    names
        .iter()
        .flat_map(|name| {
            let base = format!("{name}=;expires={EPOCH_EXPIRY};path=/");
            [
                base.clone(),
                format!("{base};domain={host}"),
                format!("{base};domain=.{host}"),
            ]
        })
        .collect()
}

#[derive(Debug, Default)]
struct ClientState {
    cookies: Vec<(String, String)>,
    local_storage: BTreeMap<String, String>,
    session_storage: BTreeMap<String, String>,
    issued_expiries: Vec<String>,
}

/// In-process cookie jar and storage, scoped to one console session.
#[derive(Debug)]
pub struct MemoryCredentials {
    host: String,
    state: Mutex<ClientState>,
}

impl MemoryCredentials {
    #[must_use]
    pub fn new(host: impl Into<String>, cookie_header: Option<&str>) -> Self {
        let cookies = cookie_header
            .unwrap_or_default()
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                let name = name.trim();
                (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self {
            host: host.into(),
            state: Mutex::new(ClientState {
                cookies,
                ..ClientState::default()
            }),
        }
    }

    pub fn set_local_item(&self, key: impl Into<String>, value: impl Into<String>) {
        self.with_state(|state| {
            state.local_storage.insert(key.into(), value.into());
        });
    }

    pub fn set_session_item(&self, key: impl Into<String>, value: impl Into<String>) {
        self.with_state(|state| {
            state.session_storage.insert(key.into(), value.into());
        });
    }

    #[must_use]
    pub fn stored_item_count(&self) -> usize {
        self.with_state(|state| state.local_storage.len() + state.session_storage.len())
    }

    #[must_use]
    pub fn issued_expiries(&self) -> Vec<String> {
        self.with_state(|state| state.issued_expiries.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ClientState) -> T) -> T {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl CredentialProvider for MemoryCredentials {
    fn cookie_header(&self) -> Option<String> {
        self.with_state(|state| {
            if state.cookies.is_empty() {
                return None;
            }
            Some(
                state
                    .cookies
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        })
    }

    fn hard_clear(&self) -> Vec<String> {
        let host = self.host.clone();
        self.with_state(|state| {
            let names = state
                .cookies
                .iter()
                .map(|(name, _)| name.clone())
                .collect::<Vec<_>>();
            let directives = expiry_directives(&names, &host);
            state.cookies.clear();
            state.local_storage.clear();
            state.session_storage.clear();
            state.issued_expiries.extend(directives.iter().cloned());
            directives
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailureCause {
    #[error("rejected with status {status}")]
    Unauthorized { status: u16 },
    #[error("unexpected status {status}")]
    Unexpected { status: u16 },
    #[error("unreachable: {message}")]
    Unreachable { message: String },
    #[error("malformed identity: {message}")]
    Malformed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Session evidence existed: wipe client state, land on `/`.
    HardClear,
    /// No session evidence: send to `/login`.
    Login,
}

impl Remedy {
    #[must_use]
    pub fn redirect(self) -> Redirect {
        match self {
            Self::HardClear => Redirect::Landing,
            Self::Login => Redirect::Login,
        }
    }
}

impl fmt::Display for Remedy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HardClear => f.write_str("session expired, local state cleared"),
            Self::Login => f.write_str("not signed in"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("authentication failed ({cause}); {remedy}")]
pub struct AuthFailure {
    pub cause: AuthFailureCause,
    pub remedy: Remedy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error(transparent)]
    Unauthenticated(AuthFailure),
    #[error("{email} is not an administrator")]
    NotAdmin { email: String },
}

/// Gate for every guarded view and every guarded call.
///
/// Cloning is cheap; all clones share the same transport, credentials,
/// navigator and the terminal remedy once one has been applied.
#[derive(Clone)]
pub struct SessionGuard {
    transport: Arc<dyn ConsoleTransport>,
    credentials: Arc<dyn CredentialProvider>,
    navigator: Arc<dyn Navigator>,
    terminated: Arc<Mutex<Option<Remedy>>>,
}

impl SessionGuard {
    pub fn new(
        transport: Arc<dyn ConsoleTransport>,
        credentials: Arc<dyn CredentialProvider>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            transport,
            credentials,
            navigator,
            terminated: Arc::new(Mutex::new(None)),
        }
    }

    /// The remedy already applied to this session, if it has ended.
    #[must_use]
    pub fn terminated(&self) -> Option<Remedy> {
        *self.lock_terminated()
    }

    /// Sends with the current session cookie attached; no status handling.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let request = request.with_cookie(self.credentials.cookie_header());
        self.transport.send(request).await
    }

    pub async fn resolve_identity(&self) -> Result<Identity, AuthFailure> {
        self.fetch_identity()
            .await
            .map_err(|cause| self.terminate(cause, None))
    }

    /// Asks the console who the session belongs to, with no side effects.
    async fn fetch_identity(&self) -> Result<Identity, AuthFailureCause> {
        let response = self
            .send(ApiRequest::get(paths::user_path()))
            .await
            .map_err(|error| AuthFailureCause::Unreachable {
                message: error.to_string(),
            })?;

        if response.is_auth_failure() {
            return Err(AuthFailureCause::Unauthorized {
                status: response.status,
            });
        }
        if !response.is_success() {
            return Err(AuthFailureCause::Unexpected {
                status: response.status,
            });
        }

        let user = response
            .decode::<UserIdentity>()
            .map_err(|error| AuthFailureCause::Malformed {
                message: error.to_string(),
            })?;
        tracing::debug!(email = %user.email, "session identity resolved");
        Ok(user.into())
    }

    /// Identity must resolve and carry an admin group.
    ///
    /// An unresolved session goes to `/login` whatever cookies remain; a
    /// non-admin lands on the standard dashboard.
    pub async fn require_admin(&self) -> Result<Identity, AccessDenied> {
        let identity = self
            .fetch_identity()
            .await
            .map_err(|cause| {
                AccessDenied::Unauthenticated(self.terminate(cause, Some(Remedy::Login)))
            })?;
        if identity.is_admin() {
            return Ok(identity);
        }
        tracing::warn!(email = %identity.email, "admin view denied");
        self.navigator.navigate(Redirect::Dashboard);
        Err(AccessDenied::NotAdmin {
            email: identity.email,
        })
    }

    /// The shared 401/403 check. `Some` means the redirect already happened
    /// and the caller must stop handling the response.
    pub fn handle_auth_failure(&self, response: &ApiResponse) -> Option<AuthFailure> {
        response.is_auth_failure().then(|| {
            self.terminate(
                AuthFailureCause::Unauthorized {
                    status: response.status,
                },
                None,
            )
        })
    }

    /// Sends a guarded call and classifies the outcome.
    ///
    /// `fallback` is the operator-facing message used when the server gives
    /// none.
    pub async fn call(&self, request: ApiRequest, fallback: &str) -> Result<ApiResponse, ActionError> {
        let method = request.method.as_str();
        let path = request.path.clone();
        let response = self.send(request).await.map_err(|error| {
            tracing::warn!(method, path = %path, error = %error, "guarded call got no response");
            ActionError::Transport {
                message: fallback.to_string(),
                detail: error.to_string(),
            }
        })?;

        if let Some(failure) = self.handle_auth_failure(&response) {
            return Err(ActionError::Auth(failure));
        }
        if !response.is_success() {
            let message = response
                .server_message()
                .unwrap_or_else(|| fallback.to_string());
            tracing::warn!(method, path = %path, status = response.status, %message, "guarded call rejected");
            return Err(ActionError::Remote {
                status: response.status,
                message,
            });
        }
        Ok(response)
    }

    pub async fn call_json<T>(&self, request: ApiRequest, fallback: &str) -> Result<T, ActionError>
    where
        T: DeserializeOwned,
    {
        let response = self.call(request, fallback).await?;
        response.decode().map_err(|error| ActionError::Protocol {
            message: format!("{fallback}: {error}"),
        })
    }

    /// Applies the session-ending remedy at most once per session.
    ///
    /// `remedy` forces a remedy; `None` picks one from the session marker.
    /// Once a remedy has been applied, later failures report it without
    /// clearing or navigating again.
    fn terminate(&self, cause: AuthFailureCause, remedy: Option<Remedy>) -> AuthFailure {
        let mut terminated = self.lock_terminated();
        if let Some(remedy) = *terminated {
            tracing::debug!(%cause, %remedy, "session already terminated");
            return AuthFailure { cause, remedy };
        }

        let remedy = remedy.unwrap_or_else(|| {
            if self.credentials.has_session_marker() {
                Remedy::HardClear
            } else {
                Remedy::Login
            }
        });
        match remedy {
            Remedy::HardClear => {
                let cleared = self.credentials.hard_clear();
                tracing::warn!(%cause, expired_cookies = cleared.len(), "session invalid; cleared client state");
            }
            Remedy::Login => tracing::info!(%cause, "no usable session; redirecting to login"),
        }
        *terminated = Some(remedy);
        self.navigator.navigate(remedy.redirect());
        AuthFailure { cause, remedy }
    }

    fn lock_terminated(&self) -> std::sync::MutexGuard<'_, Option<Remedy>> {
        self.terminated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
