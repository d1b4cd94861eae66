//! Single guarded remote mutations and the in-flight bookkeeping around them.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use servercon_api::{
    ApiRequest, ConsoleToggle, PowerAction, ReinstallRequest, RestoreSnapshotRequest,
    StatusMessage, paths,
};

use crate::error::ActionError;
use crate::session::SessionGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Start,
    Stop,
    Restart,
    ResetPassword,
    ConsoleEnable,
    ConsoleDisable,
    Reinstall,
    RestoreSnapshot,
}

impl ActionKind {
    pub const ALL: [Self; 8] = [
        Self::Start,
        Self::Stop,
        Self::Restart,
        Self::ResetPassword,
        Self::ConsoleEnable,
        Self::ConsoleDisable,
        Self::Reinstall,
        Self::RestoreSnapshot,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::ResetPassword => "resetPassword",
            Self::ConsoleEnable => "consoleEnable",
            Self::ConsoleDisable => "consoleDisable",
            Self::Reinstall => "reinstall",
            Self::RestoreSnapshot => "restoreSnapshot",
        }
    }

    /// Shown when a failed call carries no server message.
    #[must_use]
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Start => "Failed to start server",
            Self::Stop => "Failed to stop server",
            Self::Restart => "Failed to restart server",
            Self::ResetPassword => "Failed to reset password",
            Self::ConsoleEnable => "Failed to enable console",
            Self::ConsoleDisable => "Failed to disable console",
            Self::Reinstall => "Failed to reinstall server",
            Self::RestoreSnapshot => "Failed to restore snapshot",
        }
    }

    /// Success means the server accepted the request, not that it converged.
    #[must_use]
    pub fn accepted_message(self) -> &'static str {
        match self {
            Self::Start => "Start accepted; power state will update on the next refresh",
            Self::Stop => "Stop accepted; power state will update on the next refresh",
            Self::Restart => "Restart accepted; power state will update on the next refresh",
            Self::ResetPassword => "Password reset accepted",
            Self::ConsoleEnable => "Console enable accepted",
            Self::ConsoleDisable => "Console disable accepted",
            Self::Reinstall => "Reinstall accepted",
            Self::RestoreSnapshot => "Snapshot restore accepted",
        }
    }

    #[must_use]
    pub fn is_destructive(self) -> bool {
        matches!(self, Self::Reinstall | Self::RestoreSnapshot)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PowerAction> for ActionKind {
    fn from(value: PowerAction) -> Self {
        match value {
            PowerAction::Start => Self::Start,
            PowerAction::Stop => Self::Stop,
            PowerAction::Restart => Self::Restart,
        }
    }
}

impl From<ConsoleToggle> for ActionKind {
    fn from(value: ConsoleToggle) -> Self {
        match value {
            ConsoleToggle::Enable => Self::ConsoleEnable,
            ConsoleToggle::Disable => Self::ConsoleDisable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Empty,
    Reinstall(ReinstallRequest),
    Restore(RestoreSnapshotRequest),
}

/// What the operator asked for. Unconfirmed requests cannot be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    server_id: u64,
    kind: ActionKind,
    payload: Payload,
}

impl ActionRequest {
    #[must_use]
    pub fn power(server_id: u64, action: PowerAction) -> Self {
        Self::bare(server_id, action.into())
    }

    #[must_use]
    pub fn reset_password(server_id: u64) -> Self {
        Self::bare(server_id, ActionKind::ResetPassword)
    }

    #[must_use]
    pub fn console(server_id: u64, toggle: ConsoleToggle) -> Self {
        Self::bare(server_id, toggle.into())
    }

    #[must_use]
    pub fn reinstall(server_id: u64, request: ReinstallRequest) -> Self {
        Self {
            server_id,
            kind: ActionKind::Reinstall,
            payload: Payload::Reinstall(request),
        }
    }

    #[must_use]
    pub fn restore_snapshot(server_id: u64, snapshot_name: impl Into<String>) -> Self {
        Self {
            server_id,
            kind: ActionKind::RestoreSnapshot,
            payload: Payload::Restore(RestoreSnapshotRequest {
                snapshot_name: snapshot_name.into(),
            }),
        }
    }

    fn bare(server_id: u64, kind: ActionKind) -> Self {
        Self {
            server_id,
            kind,
            payload: Payload::Empty,
        }
    }

    #[must_use]
    pub fn server_id(&self) -> u64 {
        self.server_id
    }

    #[must_use]
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Question put to the operator before dispatch.
    #[must_use]
    pub fn prompt(&self) -> String {
        let server_id = self.server_id;
        match (self.kind, &self.payload) {
            (ActionKind::Start, _) => format!("Start server {server_id}?"),
            (ActionKind::Stop, _) => format!("Stop server {server_id}?"),
            (ActionKind::Restart, _) => format!("Restart server {server_id}?"),
            (ActionKind::ResetPassword, _) => {
                format!("Reset the root password of server {server_id}?")
            }
            (ActionKind::ConsoleEnable, _) => format!("Enable the console of server {server_id}?"),
            (ActionKind::ConsoleDisable, _) => {
                format!("Disable the console of server {server_id}?")
            }
            (_, Payload::Restore(restore)) => format!(
                "Restore server {server_id} from snapshot {}? All current data will be lost.",
                restore.snapshot_name
            ),
            _ => format!("Reinstall server {server_id}? All data on the server will be lost."),
        }
    }

    /// Runs the operator prompt; only a `true` answer yields something the
    /// executor will accept.
    pub fn confirm_with(self, prompt: impl FnOnce(&str) -> bool) -> Option<ConfirmedAction> {
        let question = self.prompt();
        if prompt(&question) {
            Some(ConfirmedAction { request: self })
        } else {
            tracing::debug!(server_id = self.server_id, kind = %self.kind, "action declined");
            None
        }
    }

    fn to_api_request(&self) -> Result<ApiRequest, ActionError> {
        let server_id = self.server_id;
        let path = match self.kind {
            ActionKind::Start => paths::power_action_path(server_id, PowerAction::Start),
            ActionKind::Stop => paths::power_action_path(server_id, PowerAction::Stop),
            ActionKind::Restart => paths::power_action_path(server_id, PowerAction::Restart),
            ActionKind::ResetPassword => paths::reset_password_path(server_id),
            ActionKind::ConsoleEnable => paths::console_path(server_id, ConsoleToggle::Enable),
            ActionKind::ConsoleDisable => paths::console_path(server_id, ConsoleToggle::Disable),
            ActionKind::Reinstall => paths::reinstall_path(server_id),
            ActionKind::RestoreSnapshot => paths::restore_snapshot_path(server_id),
        };
        let body = match &self.payload {
            Payload::Empty => None,
            Payload::Reinstall(request) => Some(encode(request)?),
            Payload::Restore(request) => Some(encode(request)?),
        };
        Ok(ApiRequest::post(path, body))
    }
}

pub(crate) fn encode<T: serde::Serialize>(value: &T) -> Result<Value, ActionError> {
    serde_json::to_value(value).map_err(|error| ActionError::Protocol {
        message: format!("request encoding failed: {error}"),
    })
}

/// The exact literal a destructive workflow demands before it commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationToken {
    Confirm,
    Restore,
}

impl ConfirmationToken {
    #[must_use]
    pub fn literal(self) -> &'static str {
        match self {
            Self::Confirm => "CONFIRM",
            Self::Restore => "RESTORE",
        }
    }

    /// Byte-for-byte equality; no trimming, no case folding.
    #[must_use]
    pub fn matches(self, typed: &str) -> bool {
        typed == self.literal()
    }

    /// Confirms `request` when `typed` matches.
    #[must_use]
    pub fn admit(self, typed: &str, request: ActionRequest) -> Option<ConfirmedAction> {
        self.matches(typed)
            .then_some(ConfirmedAction { request })
    }

    #[must_use]
    pub fn rejection(self) -> String {
        format!("Please type \"{}\" to proceed", self.literal())
    }
}

/// An [`ActionRequest`] the operator has explicitly approved.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedAction {
    request: ActionRequest,
}

impl ConfirmedAction {
    #[must_use]
    pub fn request(&self) -> &ActionRequest {
        &self.request
    }
}

/// A 2xx answer to a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub server_id: u64,
    pub kind: ActionKind,
    pub body: Value,
}

impl Ack {
    /// `{status, msg}` rows, whether the server sent an array or one object.
    #[must_use]
    pub fn status_messages(&self) -> Vec<StatusMessage> {
        match &self.body {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect(),
            Value::Object(_) => serde_json::from_value::<StatusMessage>(self.body.clone())
                .ok()
                .filter(|message| !message.status.is_empty() || !message.message.is_empty())
                .into_iter()
                .collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let details = self
            .status_messages()
            .into_iter()
            .map(|message| message.message)
            .filter(|message| !message.trim().is_empty())
            .collect::<Vec<_>>();
        if details.is_empty() {
            self.kind.accepted_message().to_string()
        } else {
            format!("{}: {}", self.kind.accepted_message(), details.join("; "))
        }
    }
}

type InFlightKey = (u64, ActionKind);

/// Per-`(server, kind)` in-flight flags.
#[derive(Debug, Clone, Default)]
pub struct InFlightRegistry {
    keys: Arc<Mutex<HashSet<InFlightKey>>>,
}

impl InFlightRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if the key is already held.
    #[must_use]
    pub fn try_acquire(&self, server_id: u64, kind: ActionKind) -> Option<InFlightGuard> {
        let key = (server_id, kind);
        lock_keys(&self.keys).insert(key).then(|| InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }

    #[must_use]
    pub fn is_in_flight(&self, server_id: u64, kind: ActionKind) -> bool {
        lock_keys(&self.keys).contains(&(server_id, kind))
    }
}

/// Clears its flag when dropped, including on early return and cancellation.
#[derive(Debug)]
pub struct InFlightGuard {
    keys: Arc<Mutex<HashSet<InFlightKey>>>,
    key: InFlightKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_keys(&self.keys).remove(&self.key);
    }
}

fn lock_keys(keys: &Mutex<HashSet<InFlightKey>>) -> std::sync::MutexGuard<'_, HashSet<InFlightKey>> {
    keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone)]
pub struct ActionExecutor {
    session: SessionGuard,
    in_flight: InFlightRegistry,
}

impl ActionExecutor {
    #[must_use]
    pub fn new(session: SessionGuard) -> Self {
        Self::with_registry(session, InFlightRegistry::new())
    }

    #[must_use]
    pub fn with_registry(session: SessionGuard, in_flight: InFlightRegistry) -> Self {
        Self { session, in_flight }
    }

    #[must_use]
    pub fn session(&self) -> &SessionGuard {
        &self.session
    }

    #[must_use]
    pub fn is_in_flight(&self, server_id: u64, kind: ActionKind) -> bool {
        self.in_flight.is_in_flight(server_id, kind)
    }

    /// Sends one POST for a confirmed action.
    ///
    /// A duplicate for a key that is still in flight fails with
    /// [`ActionError::InFlight`] and sends nothing.
    pub async fn execute(&self, action: ConfirmedAction) -> Result<Ack, ActionError> {
        let request = action.request;
        let server_id = request.server_id;
        let kind = request.kind;
        let Some(_in_flight) = self.in_flight.try_acquire(server_id, kind) else {
            tracing::debug!(server_id, %kind, "duplicate submission ignored");
            return Err(ActionError::InFlight { server_id, kind });
        };

        let api_request = request.to_api_request()?;
        tracing::info!(server_id, %kind, "dispatching action");
        let response = self
            .session
            .call(api_request, kind.failure_message())
            .await?;
        tracing::info!(server_id, %kind, status = response.status, "action accepted");
        Ok(Ack {
            server_id,
            kind,
            body: response.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Redirect;
    use crate::testing::{ScriptedTransport, guard_with};
    use serde_json::json;
    use servercon_api::{AuthenticationMode, HttpMethod, ReinstallType};

    fn executor(transport: &ScriptedTransport) -> ActionExecutor {
        let (guard, _, _) = guard_with(transport, Some("auth-session=abc"));
        ActionExecutor::new(guard)
    }

    fn approve(request: ActionRequest) -> ConfirmedAction {
        request.confirm_with(|_| true).expect("approved")
    }

    #[test]
    fn declined_prompt_yields_nothing_to_execute() {
        let mut asked = String::new();
        let confirmed = ActionRequest::power(42, PowerAction::Stop).confirm_with(|question| {
            asked = question.to_string();
            false
        });
        assert!(confirmed.is_none());
        assert_eq!(asked, "Stop server 42?");
    }

    #[test]
    fn tokens_match_exactly() {
        assert!(ConfirmationToken::Confirm.matches("CONFIRM"));
        assert!(ConfirmationToken::Restore.matches("RESTORE"));
        for typed in ["confirm", "CONFIRM ", " CONFIRM", "Confirm", "", "RESTORE"] {
            assert!(!ConfirmationToken::Confirm.matches(typed), "{typed:?}");
        }
        assert!(
            ConfirmationToken::Restore
                .admit("restore", ActionRequest::restore_snapshot(1, "nightly"))
                .is_none()
        );
    }

    #[test]
    fn requests_map_to_their_endpoints() {
        let cases = [
            (ActionRequest::power(42, PowerAction::Start), "/api/server/42/action/start"),
            (ActionRequest::power(42, PowerAction::Restart), "/api/server/42/action/restart"),
            (ActionRequest::reset_password(42), "/api/server/42/reset-password"),
            (
                ActionRequest::console(42, ConsoleToggle::Enable),
                "/api/server/42/console/enable",
            ),
        ];
        for (request, path) in cases {
            let api = request.to_api_request().expect("api request");
            assert_eq!(api.method, HttpMethod::Post);
            assert_eq!(api.path, path);
            assert_eq!(api.body, None);
        }

        let reinstall = ActionRequest::reinstall(
            42,
            ReinstallRequest {
                reinstall_type: ReinstallType::Os,
                os_app_id: 7,
                authentication: AuthenticationMode::Password,
                ssh_key: String::new(),
            },
        )
        .to_api_request()
        .expect("api request");
        assert_eq!(reinstall.path, "/api/server/42/reinstall");
        assert_eq!(
            reinstall.body,
            Some(json!({"reinstall_type": "os", "os_app_id": 7, "authentication": "password"}))
        );
    }

    #[tokio::test]
    async fn in_flight_flag_clears_after_success_and_failure() {
        let transport = ScriptedTransport::new();
        transport.respond("POST /api/server/42/action/start", 200, json!([{"status": "success", "msg": "Starting"}]));
        transport.respond("POST /api/server/42/action/stop", 500, json!({"error": "hypervisor busy"}));
        let executor = executor(&transport);

        let ack = executor
            .execute(approve(ActionRequest::power(42, PowerAction::Start)))
            .await
            .expect("ack");
        assert_eq!(ack.kind, ActionKind::Start);
        assert_eq!(ack.status_messages()[0].message, "Starting");
        assert!(!executor.is_in_flight(42, ActionKind::Start));

        let error = executor
            .execute(approve(ActionRequest::power(42, PowerAction::Stop)))
            .await
            .expect_err("remote failure");
        assert_eq!(error.to_string(), "hypervisor busy");
        assert!(!executor.is_in_flight(42, ActionKind::Stop));
    }

    #[tokio::test]
    async fn in_flight_flag_clears_after_transport_failure() {
        let transport = ScriptedTransport::new();
        transport.fail("POST /api/server/42/reset-password", "connection reset");
        let executor = executor(&transport);
        let error = executor
            .execute(approve(ActionRequest::reset_password(42)))
            .await
            .expect_err("transport");
        assert!(matches!(
            error,
            ActionError::Transport { ref message, .. } if message == "Failed to reset password"
        ));
        assert!(!executor.is_in_flight(42, ActionKind::ResetPassword));
    }

    #[tokio::test]
    async fn duplicate_submission_is_refused_without_network_call() {
        let transport = ScriptedTransport::new();
        transport.respond("POST /api/server/42/action/restart", 200, json!({}));
        let gate = transport.gate("POST /api/server/42/action/restart");
        let executor = executor(&transport);

        let first = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute(approve(ActionRequest::power(42, PowerAction::Restart)))
                    .await
            })
        };
        while transport.calls_to("POST /api/server/42/action/restart") == 0 {
            tokio::task::yield_now().await;
        }
        assert!(executor.is_in_flight(42, ActionKind::Restart));

        let duplicate = executor
            .execute(approve(ActionRequest::power(42, PowerAction::Restart)))
            .await
            .expect_err("in flight");
        assert_eq!(
            duplicate,
            ActionError::InFlight {
                server_id: 42,
                kind: ActionKind::Restart
            }
        );

        let other_kind = executor
            .execute(approve(ActionRequest::console(42, ConsoleToggle::Enable)))
            .await;
        assert!(!matches!(other_kind, Err(ActionError::InFlight { .. })));

        gate.notify_one();
        first.await.expect("join").expect("ack");
        assert_eq!(transport.calls_to("POST /api/server/42/action/restart"), 1);
        assert!(!executor.is_in_flight(42, ActionKind::Restart));
    }

    #[tokio::test]
    async fn auth_failure_redirects_and_skips_domain_error() {
        let transport = ScriptedTransport::new();
        transport.respond("POST /api/server/42/console/disable", 401, json!({"error": "expired"}));
        let (guard, navigator, credentials) = guard_with(&transport, Some("auth-session=abc"));
        let executor = ActionExecutor::new(guard);
        let error = executor
            .execute(approve(ActionRequest::console(42, ConsoleToggle::Disable)))
            .await
            .expect_err("auth");
        assert!(error.is_auth());
        assert_eq!(navigator.redirects(), vec![Redirect::Landing]);
        assert_eq!(
            crate::session::CredentialProvider::cookie_header(credentials.as_ref()),
            None
        );
        assert!(!executor.is_in_flight(42, ActionKind::ConsoleDisable));
    }

    #[test]
    fn generic_message_covers_every_kind() {
        for kind in ActionKind::ALL {
            assert!(kind.failure_message().starts_with("Failed to "));
        }
        let ack = Ack {
            server_id: 1,
            kind: ActionKind::Reinstall,
            body: json!({}),
        };
        assert!(ack.status_messages().is_empty());
        assert_eq!(ack.summary(), "Reinstall accepted");
    }
}
