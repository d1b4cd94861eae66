//! The server list and the per-server card built on top of it.

use std::time::Duration;

use futures::future;
use servercon_api::{ApiRequest, ServerDetail, ServerSummary, paths};
use tokio::task::JoinHandle;

use crate::action::{Ack, ActionExecutor, ActionKind, ConfirmedAction};
use crate::console::{ConsoleCredentials, fetch_console_credentials};
use crate::error::ActionError;
use crate::poller::{ReachabilityState, StatusPoller};
use crate::reinstall::ReinstallPlan;
use crate::restore::SnapshotRestorePlan;
use crate::session::SessionGuard;
use crate::workflow::DestructiveWorkflow;

pub const ELIGIBLE_STATUSES: [&str; 2] = ["Active", "Pending"];

/// Read-only, possibly stale view of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntity {
    pub id: u64,
    pub domain: String,
    pub domainstatus: String,
    pub ip: String,
    pub operatingsystem: String,
    pub cpu: String,
    pub mem: String,
    pub disk: String,
    pub vncstatus: String,
    pub dailysnapshots: String,
}

impl ServerEntity {
    #[must_use]
    pub fn from_parts(summary: &ServerSummary, detail: Option<&ServerDetail>) -> Self {
        let detail = detail.cloned().unwrap_or_default();
        Self {
            id: summary.id,
            domain: summary.domain.trim().to_string(),
            domainstatus: summary.domainstatus.clone(),
            ip: detail.ip,
            operatingsystem: detail.operatingsystem,
            cpu: detail.cpu,
            mem: detail.mem,
            disk: detail.disk,
            vncstatus: detail.vncstatus,
            dailysnapshots: detail.dailysnapshots,
        }
    }
}

#[must_use]
pub fn is_eligible(summary: &ServerSummary) -> bool {
    ELIGIBLE_STATUSES.contains(&summary.domainstatus.as_str()) && !summary.domain.trim().is_empty()
}

/// Eligible servers, ordered by domain.
#[must_use]
pub fn eligible_servers(servers: Vec<ServerSummary>) -> Vec<ServerSummary> {
    let mut eligible = servers.into_iter().filter(is_eligible).collect::<Vec<_>>();
    eligible.sort_by(|left, right| {
        left.domain
            .to_lowercase()
            .cmp(&right.domain.to_lowercase())
            .then_with(|| left.domain.cmp(&right.domain))
    });
    eligible
}

#[derive(Clone)]
pub struct Fleet {
    session: SessionGuard,
    ping_interval: Option<Duration>,
}

impl Fleet {
    #[must_use]
    pub fn new(session: SessionGuard, ping_interval: Option<Duration>) -> Self {
        Self {
            session,
            ping_interval,
        }
    }

    /// No eligible servers is an empty list, not an error.
    pub async fn list(&self) -> Result<Vec<ServerSummary>, ActionError> {
        let servers = self
            .session
            .call_json::<Vec<ServerSummary>>(
                ApiRequest::get(paths::servers_path()),
                "Failed to fetch servers",
            )
            .await?;
        let total = servers.len();
        let eligible = eligible_servers(servers);
        tracing::debug!(total, eligible = eligible.len(), "server list loaded");
        Ok(eligible)
    }

    /// A card with its own executor and poller; nothing is shared between
    /// cards.
    #[must_use]
    pub fn card(&self, summary: ServerSummary) -> ServerCard {
        ServerCard::new(self.session.clone(), summary, self.ping_interval)
    }

    /// Looks up one eligible server by id and loads its detail.
    pub async fn open_card(&self, server_id: u64) -> Result<Option<ServerCard>, ActionError> {
        let Some(summary) = self
            .list()
            .await?
            .into_iter()
            .find(|summary| summary.id == server_id)
        else {
            return Ok(None);
        };
        let mut card = self.card(summary);
        card.load_detail().await?;
        Ok(Some(card))
    }
}

pub struct ServerCard {
    summary: ServerSummary,
    detail: Option<ServerDetail>,
    executor: ActionExecutor,
    poller: StatusPoller,
}

impl ServerCard {
    #[must_use]
    pub fn new(session: SessionGuard, summary: ServerSummary, ping_interval: Option<Duration>) -> Self {
        Self {
            summary,
            detail: None,
            executor: ActionExecutor::new(session.clone()),
            poller: StatusPoller::new(session, ping_interval),
        }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.summary.id
    }

    #[must_use]
    pub fn summary(&self) -> &ServerSummary {
        &self.summary
    }

    #[must_use]
    pub fn entity(&self) -> ServerEntity {
        ServerEntity::from_parts(&self.summary, self.detail.as_ref())
    }

    pub async fn load_detail(&mut self) -> Result<ServerEntity, ActionError> {
        let detail = self
            .executor
            .session()
            .call_json::<ServerDetail>(
                ApiRequest::get(paths::server_path(self.summary.id)),
                "Failed to load server",
            )
            .await?;
        self.detail = Some(detail);
        Ok(self.entity())
    }

    /// Hostname always; IP once detail has loaded.
    #[must_use]
    pub fn reachability_subjects(&self) -> Vec<String> {
        let mut subjects = Vec::with_capacity(2);
        if let Some(ip) = self
            .detail
            .as_ref()
            .map(|detail| detail.ip.trim())
            .filter(|ip| !ip.is_empty())
        {
            subjects.push(ip.to_string());
        }
        subjects.push(self.summary.domain.trim().to_string());
        subjects
    }

    /// Checks every subject concurrently, once.
    pub async fn refresh_reachability(&self) -> Vec<ReachabilityState> {
        let subjects = self.reachability_subjects();
        future::join_all(subjects.iter().map(|subject| self.poller.refresh(subject)))
            .await
            .into_iter()
            .filter_map(Result::ok)
            .collect()
    }

    /// One watch task per subject.
    #[must_use]
    pub fn watch_reachability(&self) -> Vec<JoinHandle<()>> {
        self.reachability_subjects()
            .into_iter()
            .map(|subject| self.poller.watch(subject))
            .collect()
    }

    #[must_use]
    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    #[must_use]
    pub fn is_in_flight(&self, kind: ActionKind) -> bool {
        self.executor.is_in_flight(self.summary.id, kind)
    }

    /// Runs an action confirmed for this card's server.
    pub async fn execute(&self, action: ConfirmedAction) -> Result<Ack, ActionError> {
        let requested = action.request().server_id();
        if requested != self.summary.id {
            return Err(ActionError::Protocol {
                message: format!("action for server {requested} sent to card {}", self.summary.id),
            });
        }
        self.executor.execute(action).await
    }

    #[must_use]
    pub fn reinstall_workflow(&self) -> DestructiveWorkflow<ReinstallPlan> {
        DestructiveWorkflow::new(
            ReinstallPlan::new(self.summary.id, self.summary.domain.clone()),
            self.executor.clone(),
        )
    }

    #[must_use]
    pub fn restore_workflow(&self) -> DestructiveWorkflow<SnapshotRestorePlan> {
        DestructiveWorkflow::new(
            SnapshotRestorePlan::new(self.summary.id, self.summary.domain.clone()),
            self.executor.clone(),
        )
    }

    pub async fn console_credentials(&self) -> Result<ConsoleCredentials, ActionError> {
        fetch_console_credentials(self.executor.session(), self.summary.id).await
    }
}
