use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of `GET /api/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: Vec<String>,
}

/// Row of `GET /api/servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSummary {
    pub id: u64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domain: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub domainstatus: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regdate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billingcycle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nextduedate: Option<String>,
}

/// Body of `GET /api/server/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ip: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub operatingsystem: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub cpu: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub mem: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub disk: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vncstatus: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub dailysnapshots: String,
}

/// Body of `GET /api/ping/{address}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
}

/// Body of `GET /api/server/{id}/credentials`.
///
/// Every field is optional on the wire; callers decide which absences are
/// protocol failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnc_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnc_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vnc_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsOption {
    pub id: u64,
    #[serde(default)]
    pub operatingsystem: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOption {
    pub id: u64,
    #[serde(default)]
    pub app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operatingsystem: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReinstallType {
    Os,
    App,
}

impl ReinstallType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Os => "os",
            Self::App => "app",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Os => "Operating System",
            Self::App => "Application",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationMode {
    Password,
    Ssh,
}

impl AuthenticationMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Ssh => "ssh",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Password => "Auto-generated Password",
            Self::Ssh => "SSH Key",
        }
    }
}

/// Body of `POST /api/server/{id}/reinstall`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReinstallRequest {
    pub reinstall_type: ReinstallType,
    pub os_app_id: u64,
    pub authentication: AuthenticationMode,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssh_key: String,
}

/// Row of `GET /api/server/{id}/snapshots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: String,
    #[serde(default)]
    pub size_gb: f64,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
}

/// Body of `POST /api/server/{id}/restore-snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreSnapshotRequest {
    pub snapshot_name: String,
}

/// `{ status, msg }` rows returned by the management endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "msg")]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Start,
    Stop,
    Restart,
}

impl PowerAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleToggle {
    Enable,
    Disable,
}

impl ConsoleToggle {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub email: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub groups: Vec<String>,
}

/// Envelope of `GET /api/admin/users`. `data` is `null` when no users exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedUserList {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<ManagedUser>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUserRequest {
    pub email: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGroupsRequest {
    pub groups: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// Upstream billing data mixes numbers and strings for the same columns.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(value) => value,
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn server_detail_accepts_numeric_columns() {
        let detail: ServerDetail = serde_json::from_value(json!({
            "ip": "10.0.0.5",
            "operatingsystem": "Debian 12",
            "cpu": 4,
            "mem": "8",
            "disk": 160,
            "vncstatus": "enabled",
            "dailysnapshots": null
        }))
        .expect("detail");
        assert_eq!(detail.cpu, "4");
        assert_eq!(detail.disk, "160");
        assert_eq!(detail.dailysnapshots, "");
        assert_eq!(detail.name, None);
    }

    #[test]
    fn reinstall_request_omits_empty_ssh_key() {
        let body = serde_json::to_value(ReinstallRequest {
            reinstall_type: ReinstallType::Os,
            os_app_id: 7,
            authentication: AuthenticationMode::Password,
            ssh_key: String::new(),
        })
        .expect("encode");
        assert_eq!(
            body,
            json!({"reinstall_type": "os", "os_app_id": 7, "authentication": "password"})
        );
    }

    #[test]
    fn managed_user_list_tolerates_null_data() {
        let list: ManagedUserList =
            serde_json::from_value(json!({"status": "success", "data": null})).expect("list");
        assert!(list.data.is_empty());
    }

    #[test]
    fn status_message_reads_msg_field() {
        let rows: Vec<StatusMessage> =
            serde_json::from_value(json!([{"status": "success", "msg": "Reinstall queued, ~10 minutes"}]))
                .expect("rows");
        assert_eq!(rows[0].message, "Reinstall queued, ~10 minutes");
    }
}
