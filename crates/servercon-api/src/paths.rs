//! Endpoint paths, relative to the API origin.

use reqwest::Url;

use crate::types::{ConsoleToggle, PowerAction};

#[must_use]
pub fn user_path() -> &'static str {
    "/api/user"
}

#[must_use]
pub fn servers_path() -> &'static str {
    "/api/servers"
}

#[must_use]
pub fn server_path(server_id: u64) -> String {
    format!("/api/server/{server_id}")
}

#[must_use]
pub fn ping_path(address: &str) -> String {
    format!("/api/ping/{}", encode_segment(address.trim()))
}

#[must_use]
pub fn credentials_path(server_id: u64) -> String {
    format!("/api/server/{server_id}/credentials")
}

#[must_use]
pub fn power_action_path(server_id: u64, action: PowerAction) -> String {
    format!("/api/server/{server_id}/action/{}", action.as_str())
}

#[must_use]
pub fn reset_password_path(server_id: u64) -> String {
    format!("/api/server/{server_id}/reset-password")
}

#[must_use]
pub fn console_path(server_id: u64, toggle: ConsoleToggle) -> String {
    format!("/api/server/{server_id}/console/{}", toggle.as_str())
}

#[must_use]
pub fn os_options_path() -> &'static str {
    "/api/os_options"
}

#[must_use]
pub fn apps_path() -> &'static str {
    "/api/apps"
}

#[must_use]
pub fn reinstall_path(server_id: u64) -> String {
    format!("/api/server/{server_id}/reinstall")
}

#[must_use]
pub fn snapshots_path(server_id: u64) -> String {
    format!("/api/server/{server_id}/snapshots")
}

#[must_use]
pub fn restore_snapshot_path(server_id: u64) -> String {
    format!("/api/server/{server_id}/restore-snapshot")
}

#[must_use]
pub fn admin_users_path() -> &'static str {
    "/api/admin/users"
}

#[must_use]
pub fn admin_user_path(email: &str) -> String {
    format!("/api/admin/users/{}", encode_segment(email.trim()))
}

/// Percent-encodes a single path segment.
fn encode_segment(raw: &str) -> String {
    let Ok(mut url) = Url::parse("http://segment.invalid/") else {
        return raw.to_string();
    };
    let Ok(mut segments) = url.path_segments_mut() else {
        return raw.to_string();
    };
    segments.clear().push(raw);
    drop(segments);
    url.path().trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers_are_deterministic() {
        assert_eq!(user_path(), "/api/user");
        assert_eq!(servers_path(), "/api/servers");
        assert_eq!(server_path(42), "/api/server/42");
        assert_eq!(ping_path(" 10.0.0.5 "), "/api/ping/10.0.0.5");
        assert_eq!(credentials_path(42), "/api/server/42/credentials");
        assert_eq!(
            power_action_path(42, PowerAction::Restart),
            "/api/server/42/action/restart"
        );
        assert_eq!(reset_password_path(42), "/api/server/42/reset-password");
        assert_eq!(
            console_path(42, ConsoleToggle::Disable),
            "/api/server/42/console/disable"
        );
        assert_eq!(reinstall_path(42), "/api/server/42/reinstall");
        assert_eq!(snapshots_path(42), "/api/server/42/snapshots");
        assert_eq!(restore_snapshot_path(42), "/api/server/42/restore-snapshot");
    }

    #[test]
    fn admin_user_path_encodes_reserved_characters() {
        assert_eq!(
            admin_user_path("ops team/lead@example.com"),
            "/api/admin/users/ops%20team%2Flead@example.com"
        );
        assert_eq!(
            admin_user_path("alice@example.com"),
            "/api/admin/users/alice@example.com"
        );
    }
}
