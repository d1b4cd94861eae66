use async_trait::async_trait;
use chrono::{DateTime, Utc};
use servercon_api::{ApiRequest, Snapshot, paths};

use crate::action::{ActionRequest, ConfirmationToken};
use crate::error::{ActionError, ValidationFailure};
use crate::session::SessionGuard;
use crate::workflow::DestructivePlan;

/// Snapshot selection for one server; the snapshot is addressed by name.
#[derive(Debug, Clone)]
pub struct SnapshotRestorePlan {
    server_id: u64,
    server_label: String,
    snapshots: Vec<Snapshot>,
    selection: Option<String>,
}

impl SnapshotRestorePlan {
    #[must_use]
    pub fn new(server_id: u64, server_label: impl Into<String>) -> Self {
        Self {
            server_id,
            server_label: server_label.into(),
            snapshots: Vec::new(),
            selection: None,
        }
    }

    #[must_use]
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    #[must_use]
    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    #[must_use]
    pub fn selected(&self) -> Option<&Snapshot> {
        let name = self.selection.as_deref()?;
        self.snapshots.iter().find(|snapshot| snapshot.name == name)
    }

    pub fn select(&mut self, name: &str) -> Result<(), ValidationFailure> {
        if self.snapshots.iter().any(|snapshot| snapshot.name == name) {
            self.selection = Some(name.to_string());
            Ok(())
        } else {
            Err(ValidationFailure::UnknownOption {
                id: name.to_string(),
            })
        }
    }
}

#[async_trait]
impl DestructivePlan for SnapshotRestorePlan {
    fn server_id(&self) -> u64 {
        self.server_id
    }

    fn token(&self) -> ConfirmationToken {
        ConfirmationToken::Restore
    }

    async fn load(&mut self, session: &SessionGuard) -> Result<(), ActionError> {
        let snapshots = session
            .call_json::<Vec<Snapshot>>(
                ApiRequest::get(paths::snapshots_path(self.server_id)),
                "Failed to fetch snapshots",
            )
            .await?;
        self.selection = snapshots.first().map(|snapshot| snapshot.name.clone());
        self.snapshots = snapshots;
        tracing::debug!(server_id = self.server_id, snapshots = self.snapshots.len(), "snapshots loaded");
        Ok(())
    }

    fn reset(&mut self) {
        self.snapshots.clear();
        self.selection = None;
    }

    fn build_request(&self) -> Result<ActionRequest, ValidationFailure> {
        self.selection
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(|name| ActionRequest::restore_snapshot(self.server_id, name.clone()))
            .ok_or(ValidationFailure::MissingSelection {
                what: "a snapshot to restore",
            })
    }

    fn summary(&self) -> Vec<(&'static str, String)> {
        let mut rows = vec![
            ("Server", self.server_label.clone()),
            ("Snapshot", self.selection.clone().unwrap_or_default()),
        ];
        if let Some(snapshot) = self.selected() {
            rows.push(("Created", format_created_at(&snapshot.created_at)));
            rows.push(("Size", format_size(snapshot.size_gb)));
        }
        rows
    }
}

/// Whole megabytes under one gigabyte, otherwise gigabytes to one decimal.
#[must_use]
pub fn format_size(size_gb: f64) -> String {
    if size_gb < 1.0 {
        format!("{:.0} MB", size_gb * 1024.0)
    } else {
        format!("{size_gb:.1} GB")
    }
}

/// RFC 3339 timestamps rendered in UTC; anything else is shown as sent.
#[must_use]
pub fn format_created_at(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw.trim()).map_or_else(
        |_| raw.to_string(),
        |parsed| {
            parsed
                .with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
        },
    )
}
