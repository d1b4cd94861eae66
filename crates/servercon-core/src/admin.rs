//! User management, reachable only through a resolved admin identity.

use servercon_api::{
    ApiRequest, ManagedUser, ManagedUserList, NewUserRequest, UpdateGroupsRequest, paths,
};

use crate::action::encode;
use crate::error::{ActionError, ValidationFailure};
use crate::session::{AccessDenied, Identity, SessionGuard};

/// Splits a comma-separated group list, dropping blanks.
#[must_use]
pub fn parse_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// A user deletion the operator has not yet approved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDeletion {
    email: String,
}

impl UserDeletion {
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
        }
    }

    #[must_use]
    pub fn prompt(&self) -> String {
        format!("Are you sure you want to delete user {}?", self.email)
    }

    pub fn confirm_with(self, prompt: impl FnOnce(&str) -> bool) -> Option<ConfirmedDeletion> {
        prompt(&self.prompt()).then_some(ConfirmedDeletion { email: self.email })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedDeletion {
    email: String,
}

pub struct AdminConsole {
    session: SessionGuard,
    identity: Identity,
}

impl AdminConsole {
    /// Fails, after redirecting, unless the session belongs to an admin.
    pub async fn open(session: SessionGuard) -> Result<Self, AccessDenied> {
        let identity = session.require_admin().await?;
        tracing::info!(email = %identity.email, "admin console opened");
        Ok(Self { session, identity })
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub async fn list_users(&self) -> Result<Vec<ManagedUser>, ActionError> {
        let list = self
            .session
            .call_json::<ManagedUserList>(
                ApiRequest::get(paths::admin_users_path()),
                "Failed to fetch users",
            )
            .await?;
        Ok(list.data)
    }

    pub async fn add_user(
        &self,
        email: &str,
        groups: Vec<String>,
    ) -> Result<&'static str, ActionError> {
        let email = email.trim();
        if email.is_empty() || groups.is_empty() {
            return Err(ValidationFailure::IncompleteUser.into());
        }
        let body = encode(&NewUserRequest {
            email: email.to_string(),
            groups,
        })?;
        self.session
            .call(
                ApiRequest::post(paths::admin_users_path(), Some(body)),
                "Failed to add user",
            )
            .await?;
        tracing::info!(email, "user added");
        Ok("User added successfully")
    }

    pub async fn update_groups(
        &self,
        email: &str,
        groups: Vec<String>,
    ) -> Result<&'static str, ActionError> {
        let body = encode(&UpdateGroupsRequest { groups })?;
        self.session
            .call(
                ApiRequest::put(paths::admin_user_path(email), body),
                "Failed to update user groups",
            )
            .await?;
        tracing::info!(email = email.trim(), "user groups updated");
        Ok("User groups updated successfully")
    }

    pub async fn delete_user(&self, deletion: ConfirmedDeletion) -> Result<&'static str, ActionError> {
        self.session
            .call(
                ApiRequest::delete(paths::admin_user_path(&deletion.email)),
                "Failed to delete user",
            )
            .await?;
        tracing::info!(email = %deletion.email, "user deleted");
        Ok("User deleted successfully")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Redirect;
    use crate::testing::{ScriptedTransport, guard_with};
    use serde_json::json;

    fn script_admin(transport: &ScriptedTransport) {
        transport.respond(
            "GET /api/user",
            200,
            json!({"email": "root@example.com", "groups": ["callowaysutton"]}),
        );
    }

    async fn console(transport: &ScriptedTransport) -> AdminConsole {
        let (guard, _, _) = guard_with(transport, Some("auth-session=abc"));
        AdminConsole::open(guard).await.expect("admin")
    }

    #[test]
    fn parse_groups_trims_and_drops_empties() {
        assert_eq!(parse_groups(" ops, ,dev ,, *"), vec!["ops", "dev", "*"]);
        assert!(parse_groups(" , ").is_empty());
    }

    #[tokio::test]
    async fn non_admin_cannot_open() {
        let transport = ScriptedTransport::new();
        transport.respond("GET /api/user", 200, json!({"email": "dev@example.com", "groups": null}));
        let (guard, navigator, _) = guard_with(&transport, Some("auth-session=abc"));
        assert!(matches!(
            AdminConsole::open(guard).await,
            Err(AccessDenied::NotAdmin { .. })
        ));
        assert_eq!(navigator.redirects(), vec![Redirect::Dashboard]);
        assert_eq!(transport.calls_to("GET /api/admin/users"), 0);
    }

    #[tokio::test]
    async fn list_tolerates_null_data() {
        let transport = ScriptedTransport::new();
        script_admin(&transport);
        transport.respond("GET /api/admin/users", 200, json!({"status": "success", "data": null}));
        assert!(console(&transport).await.list_users().await.expect("users").is_empty());
    }

    #[tokio::test]
    async fn add_requires_email_and_groups() {
        let transport = ScriptedTransport::new();
        script_admin(&transport);
        let console = console(&transport).await;
        for (email, groups) in [("", vec!["ops".to_string()]), ("a@example.com", Vec::new())] {
            let error = console.add_user(email, groups).await.expect_err("validation");
            assert_eq!(error.to_string(), "Please provide both email and at least one group");
        }
        assert_eq!(transport.calls_to("POST /api/admin/users"), 0);
    }

    #[tokio::test]
    async fn writes_surface_admin_messages() {
        let transport = ScriptedTransport::new();
        script_admin(&transport);
        transport.respond("POST /api/admin/users", 200, json!({"status": "success", "msg": "ok"}));
        transport.respond(
            "PUT /api/admin/users/ops%20team@example.com",
            400,
            json!({"status": "error", "msg": "groups must not be empty"}),
        );
        transport.respond("DELETE /api/admin/users/a@example.com", 500, json!({}));
        let console = console(&transport).await;

        assert_eq!(
            console
                .add_user(" a@example.com ", parse_groups("ops,dev"))
                .await
                .expect("added"),
            "User added successfully"
        );
        let added = transport
            .calls()
            .into_iter()
            .find(|call| call.path == "/api/admin/users" && call.body.is_some())
            .expect("post");
        assert_eq!(added.body, Some(json!({"email": "a@example.com", "groups": ["ops", "dev"]})));

        let update = console
            .update_groups("ops team@example.com", Vec::new())
            .await
            .expect_err("rejected");
        assert_eq!(update.to_string(), "groups must not be empty");

        assert!(UserDeletion::new("a@example.com").confirm_with(|_| false).is_none());
        let deletion = UserDeletion::new("a@example.com")
            .confirm_with(|question| question == "Are you sure you want to delete user a@example.com?")
            .expect("approved");
        let error = console.delete_user(deletion).await.expect_err("server error");
        assert_eq!(error.to_string(), "Failed to delete user");
    }

    #[tokio::test]
    async fn auth_failure_mid_session_hard_clears() {
        let transport = ScriptedTransport::new();
        script_admin(&transport);
        transport.respond("GET /api/admin/users", 401, json!({}));
        let (guard, navigator, _) = guard_with(&transport, Some("auth-session=abc"));
        let console = AdminConsole::open(guard).await.expect("admin");
        assert!(console.list_users().await.expect_err("auth").is_auth());
        assert_eq!(navigator.redirects(), vec![Redirect::Landing]);
    }
}
