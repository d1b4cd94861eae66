use servercon_api::{ApiRequest, ServerCredentials, paths};

use crate::error::ActionError;
use crate::session::SessionGuard;

pub const MISSING_VNC_PASSWORD: &str = "No VNC password returned";

/// What a remote console viewer needs to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleCredentials {
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root_password: Option<String>,
}

pub async fn fetch_console_credentials(
    session: &SessionGuard,
    server_id: u64,
) -> Result<ConsoleCredentials, ActionError> {
    let credentials = session
        .call_json::<ServerCredentials>(
            ApiRequest::get(paths::credentials_path(server_id)),
            "Failed to fetch console credentials",
        )
        .await?;
    let Some(password) = credentials
        .vnc_password
        .filter(|password| !password.is_empty())
    else {
        tracing::warn!(server_id, "credentials response carried no vnc password");
        return Err(ActionError::Protocol {
            message: MISSING_VNC_PASSWORD.to_string(),
        });
    };
    Ok(ConsoleCredentials {
        password,
        host: credentials.vnc_host.filter(|host| !host.trim().is_empty()),
        port: credentials.vnc_port,
        root_password: credentials.root_password,
    })
}
