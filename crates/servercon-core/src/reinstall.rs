use async_trait::async_trait;
use futures::future;
use servercon_api::{
    ApiRequest, AppOption, AuthenticationMode, OsOption, ReinstallRequest, ReinstallType, paths,
};

use crate::action::{ActionRequest, ConfirmationToken};
use crate::error::{ActionError, ValidationFailure};
use crate::session::SessionGuard;
use crate::workflow::DestructivePlan;

/// An entry of whichever catalog is active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: u64,
    pub label: String,
}

/// OS/App reinstall selection for one server.
#[derive(Debug, Clone)]
pub struct ReinstallPlan {
    server_id: u64,
    server_label: String,
    reinstall_type: ReinstallType,
    os_options: Vec<OsOption>,
    app_options: Vec<AppOption>,
    selection: Option<u64>,
    authentication: AuthenticationMode,
    ssh_key: String,
}

impl ReinstallPlan {
    #[must_use]
    pub fn new(server_id: u64, server_label: impl Into<String>) -> Self {
        Self {
            server_id,
            server_label: server_label.into(),
            reinstall_type: ReinstallType::Os,
            os_options: Vec::new(),
            app_options: Vec::new(),
            selection: None,
            authentication: AuthenticationMode::Password,
            ssh_key: String::new(),
        }
    }

    #[must_use]
    pub fn reinstall_type(&self) -> ReinstallType {
        self.reinstall_type
    }

    #[must_use]
    pub fn selection(&self) -> Option<u64> {
        self.selection
    }

    #[must_use]
    pub fn authentication(&self) -> AuthenticationMode {
        self.authentication
    }

    #[must_use]
    pub fn ssh_key(&self) -> &str {
        &self.ssh_key
    }

    /// The catalog for the active reinstall type.
    #[must_use]
    pub fn options(&self) -> Vec<CatalogEntry> {
        match self.reinstall_type {
            ReinstallType::Os => self
                .os_options
                .iter()
                .map(|option| CatalogEntry {
                    id: option.id,
                    label: option.operatingsystem.clone(),
                })
                .collect(),
            ReinstallType::App => self
                .app_options
                .iter()
                .map(|option| CatalogEntry {
                    id: option.id,
                    label: option.app.clone(),
                })
                .collect(),
        }
    }

    /// Switches catalogs and selects the first entry of the new one.
    pub fn set_reinstall_type(&mut self, reinstall_type: ReinstallType) {
        self.reinstall_type = reinstall_type;
        self.selection = self.first_id();
    }

    pub fn select(&mut self, id: u64) -> Result<(), ValidationFailure> {
        if self.options().iter().any(|entry| entry.id == id) {
            self.selection = Some(id);
            Ok(())
        } else {
            Err(ValidationFailure::UnknownOption { id: id.to_string() })
        }
    }

    /// Password mode discards any typed key.
    pub fn set_authentication(&mut self, authentication: AuthenticationMode) {
        self.authentication = authentication;
        if authentication == AuthenticationMode::Password {
            self.ssh_key.clear();
        }
    }

    pub fn set_ssh_key(&mut self, ssh_key: impl Into<String>) {
        self.ssh_key = ssh_key.into();
    }

    fn first_id(&self) -> Option<u64> {
        match self.reinstall_type {
            ReinstallType::Os => self.os_options.first().map(|option| option.id),
            ReinstallType::App => self.app_options.first().map(|option| option.id),
        }
    }

    fn selection_label(&self) -> String {
        self.selection
            .and_then(|id| self.options().into_iter().find(|entry| entry.id == id))
            .map_or_else(|| "Unknown".to_string(), |entry| entry.label)
    }
}

#[async_trait]
impl DestructivePlan for ReinstallPlan {
    fn server_id(&self) -> u64 {
        self.server_id
    }

    fn token(&self) -> ConfirmationToken {
        ConfirmationToken::Confirm
    }

    async fn load(&mut self, session: &SessionGuard) -> Result<(), ActionError> {
        let (os_options, app_options) = future::join(
            session.call_json::<Vec<OsOption>>(
                ApiRequest::get(paths::os_options_path()),
                "Failed to fetch OS options",
            ),
            session.call_json::<Vec<AppOption>>(
                ApiRequest::get(paths::apps_path()),
                "Failed to fetch apps",
            ),
        )
        .await;

        let mut failures = Vec::new();
        self.os_options = os_options.unwrap_or_else(|error| {
            failures.push(error);
            Vec::new()
        });
        self.app_options = app_options.unwrap_or_else(|error| {
            failures.push(error);
            Vec::new()
        });
        self.selection = self.first_id();
        tracing::debug!(
            server_id = self.server_id,
            os_options = self.os_options.len(),
            app_options = self.app_options.len(),
            "reinstall catalogs loaded"
        );
        // An auth failure outranks an outage of the other catalog.
        failures.sort_by_key(|error| !error.is_auth());
        failures.into_iter().next().map_or(Ok(()), Err)
    }

    fn reset(&mut self) {
        self.reinstall_type = ReinstallType::Os;
        self.os_options.clear();
        self.app_options.clear();
        self.selection = None;
        self.authentication = AuthenticationMode::Password;
        self.ssh_key.clear();
    }

    fn build_request(&self) -> Result<ActionRequest, ValidationFailure> {
        let Some(os_app_id) = self.selection else {
            return Err(ValidationFailure::MissingSelection {
                what: "an OS or App",
            });
        };
        if self.authentication == AuthenticationMode::Ssh && self.ssh_key.trim().is_empty() {
            return Err(ValidationFailure::MissingSshKey);
        }
        Ok(ActionRequest::reinstall(
            self.server_id,
            ReinstallRequest {
                reinstall_type: self.reinstall_type,
                os_app_id,
                authentication: self.authentication,
                ssh_key: match self.authentication {
                    AuthenticationMode::Ssh => self.ssh_key.trim().to_string(),
                    AuthenticationMode::Password => String::new(),
                },
            },
        ))
    }

    fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Server", self.server_label.clone()),
            ("Type", self.reinstall_type.label().to_string()),
            ("Selection", self.selection_label()),
            ("Authentication", self.authentication.label().to_string()),
        ]
    }
}
