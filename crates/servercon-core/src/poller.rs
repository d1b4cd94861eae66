//! Reachability of server addresses and hostnames.
//!
//! Polling never touches action state and never redirects: a failed ping only
//! leaves its subject at whatever status it last had.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use servercon_api::{ApiRequest, PingResponse, paths};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::ValidationFailure;
use crate::session::SessionGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Reachability {
    /// Never answered, or the only check so far is still outstanding.
    #[default]
    Unknown,
    Up,
    Down,
}

impl Reachability {
    #[must_use]
    pub fn from_wire(status: &str) -> Option<Self> {
        match status.trim() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// Terminal indicator; each state renders differently.
    #[must_use]
    pub fn indicator(self) -> &'static str {
        match self {
            Self::Unknown => "[ .. ]",
            Self::Up => "[ UP ]",
            Self::Down => "[DOWN]",
        }
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReachabilityState {
    pub subject_key: String,
    pub status: Reachability,
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    status: Reachability,
    generation: u64,
    checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Subjects {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

/// One poller per server card; subjects are independent of each other.
#[derive(Clone)]
pub struct StatusPoller {
    session: SessionGuard,
    interval: Option<Duration>,
    subjects: Arc<Mutex<Subjects>>,
}

impl StatusPoller {
    /// `interval` of `None` checks each subject once per [`Self::watch`].
    #[must_use]
    pub fn new(session: SessionGuard, interval: Option<Duration>) -> Self {
        Self {
            session,
            interval: interval.filter(|interval| !interval.is_zero()),
            subjects: Arc::new(Mutex::new(Subjects::default())),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    #[must_use]
    pub fn status(&self, subject_key: &str) -> Reachability {
        self.lock()
            .entries
            .get(subject_key.trim())
            .map_or(Reachability::Unknown, |entry| entry.status)
    }

    #[must_use]
    pub fn state(&self, subject_key: &str) -> ReachabilityState {
        let subject_key = subject_key.trim();
        let entry = self.lock().entries.get(subject_key).copied();
        ReachabilityState {
            subject_key: subject_key.to_string(),
            status: entry.map_or(Reachability::Unknown, |entry| entry.status),
            checked_at: entry.and_then(|entry| entry.checked_at),
        }
    }

    /// Drops a subject. A check still in flight for it is discarded when it
    /// lands.
    pub fn forget(&self, subject_key: &str) {
        self.lock().entries.remove(subject_key.trim());
    }

    /// Pings the subject once and records the answer.
    pub async fn refresh(&self, subject_key: &str) -> Result<ReachabilityState, ValidationFailure> {
        let subject_key = subject_key.trim();
        if subject_key.is_empty() {
            return Err(ValidationFailure::EmptySubject);
        }
        let generation = self.begin(subject_key);
        let observed = self.ping(subject_key).await;

        let mut subjects = self.lock();
        match subjects.entries.get_mut(subject_key) {
            Some(entry) if entry.generation == generation => {
                if let Some(status) = observed {
                    entry.status = status;
                    entry.checked_at = Some(Utc::now());
                }
                Ok(ReachabilityState {
                    subject_key: subject_key.to_string(),
                    status: entry.status,
                    checked_at: entry.checked_at,
                })
            }
            current => {
                let current = current.map(|entry| *entry);
                tracing::debug!(subject = subject_key, "discarding stale reachability result");
                Ok(ReachabilityState {
                    subject_key: subject_key.to_string(),
                    status: current.map_or(Reachability::Unknown, |entry| entry.status),
                    checked_at: current.and_then(|entry| entry.checked_at),
                })
            }
        }
    }

    /// Checks immediately, then every interval if one is configured.
    ///
    /// Abort the handle to stop watching.
    pub fn watch(&self, subject_key: impl Into<String>) -> JoinHandle<()> {
        let poller = self.clone();
        let subject_key = subject_key.into();
        tokio::spawn(async move {
            let Some(period) = poller.interval else {
                if let Err(error) = poller.refresh(&subject_key).await {
                    tracing::warn!(%error, "reachability watch not started");
                }
                return;
            };
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = poller.refresh(&subject_key).await {
                    tracing::warn!(%error, "reachability watch stopped");
                    return;
                }
            }
        })
    }

    /// Registers a check and returns its generation. An existing status is
    /// kept while the re-check is outstanding.
    fn begin(&self, subject_key: &str) -> u64 {
        let mut subjects = self.lock();
        subjects.next_generation += 1;
        let generation = subjects.next_generation;
        subjects
            .entries
            .entry(subject_key.to_string())
            .and_modify(|entry| entry.generation = generation)
            .or_insert(Entry {
                status: Reachability::Unknown,
                generation,
                checked_at: None,
            });
        generation
    }

    async fn ping(&self, subject_key: &str) -> Option<Reachability> {
        let response = match self.session.send(ApiRequest::get(paths::ping_path(subject_key))).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(subject = subject_key, %error, "ping failed");
                return None;
            }
        };
        if !response.is_success() {
            tracing::warn!(subject = subject_key, status = response.status, "ping rejected");
            return None;
        }
        let status = response
            .decode::<PingResponse>()
            .ok()
            .and_then(|ping| Reachability::from_wire(&ping.status));
        if status.is_none() {
            tracing::warn!(subject = subject_key, body = %response.body, "unrecognised ping answer");
        }
        status
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subjects> {
        self.subjects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, guard_with};
    use serde_json::json;

    fn poller(transport: &ScriptedTransport, interval: Option<Duration>) -> StatusPoller {
        let (guard, _, _) = guard_with(transport, Some("auth-session=abc"));
        StatusPoller::new(guard, interval)
    }

    #[tokio::test]
    async fn three_states_are_distinguishable() {
        let transport = ScriptedTransport::new();
        transport.respond("GET /api/ping/10.0.0.5", 200, json!({"status": "up"}));
        transport.respond("GET /api/ping/10.0.0.6", 200, json!({"status": "down"}));
        let gate = transport.gate("GET /api/ping/10.0.0.7");
        let poller = poller(&transport, None);

        let pending = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.refresh("10.0.0.7").await })
        };
        let up = poller.refresh("10.0.0.5").await.expect("up");
        let down = poller.refresh("10.0.0.6").await.expect("down");
        while transport.calls_to("GET /api/ping/10.0.0.7") == 0 {
            tokio::task::yield_now().await;
        }

        let unknown = poller.status("10.0.0.7");
        assert_eq!(up.status, Reachability::Up);
        assert_eq!(down.status, Reachability::Down);
        assert_eq!(unknown, Reachability::Unknown);
        let indicators = [up.status.indicator(), down.status.indicator(), unknown.indicator()];
        assert_ne!(indicators[0], indicators[1]);
        assert_ne!(indicators[0], indicators[2]);
        assert_ne!(indicators[1], indicators[2]);

        gate.notify_one();
        pending.await.expect("join").expect("refresh");
        assert_eq!(poller.status("10.0.0.7"), Reachability::Unknown);
    }

    #[tokio::test]
    async fn failures_never_redirect_or_invent_a_status() {
        let transport = ScriptedTransport::new();
        transport.respond("GET /api/ping/web-01.example.com", 401, json!({}));
        transport.fail("GET /api/ping/10.0.0.5", "timed out");
        transport.respond("GET /api/ping/10.0.0.6", 200, json!({"status": "maybe"}));
        let (guard, navigator, credentials) = guard_with(&transport, Some("auth-session=abc"));
        let poller = StatusPoller::new(guard, None);

        for subject in ["web-01.example.com", "10.0.0.5", "10.0.0.6"] {
            let state = poller.refresh(subject).await.expect("refresh");
            assert_eq!(state.status, Reachability::Unknown, "{subject}");
            assert_eq!(state.checked_at, None);
        }
        assert!(navigator.redirects().is_empty());
        assert!(crate::session::CredentialProvider::has_session_marker(credentials.as_ref()));
    }

    #[tokio::test]
    async fn failed_recheck_keeps_last_known_status() {
        let transport = ScriptedTransport::new();
        transport.respond("GET /api/ping/10.0.0.5", 200, json!({"status": "up"}));
        transport.respond("GET /api/ping/10.0.0.5", 502, json!({}));
        let poller = poller(&transport, None);
        assert_eq!(poller.refresh("10.0.0.5").await.expect("first").status, Reachability::Up);
        let second = poller.refresh("10.0.0.5").await.expect("second");
        assert_eq!(second.status, Reachability::Up);
        assert!(second.checked_at.is_some());
    }

    #[tokio::test]
    async fn late_result_for_forgotten_subject_is_discarded() {
        let transport = ScriptedTransport::new();
        transport.respond("GET /api/ping/10.0.0.5", 200, json!({"status": "down"}));
        let gate = transport.gate("GET /api/ping/10.0.0.5");
        let poller = poller(&transport, None);

        let late = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.refresh("10.0.0.5").await })
        };
        while transport.calls_to("GET /api/ping/10.0.0.5") == 0 {
            tokio::task::yield_now().await;
        }
        poller.forget("10.0.0.5");
        gate.notify_one();

        let state = late.await.expect("join").expect("refresh");
        assert_eq!(state.status, Reachability::Unknown);
        assert_eq!(poller.state("10.0.0.5").checked_at, None);
    }

    #[tokio::test]
    async fn empty_subject_is_rejected_without_a_call() {
        let transport = ScriptedTransport::new();
        let poller = poller(&transport, None);
        assert_eq!(poller.refresh("  ").await, Err(ValidationFailure::EmptySubject));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn one_shot_watch_checks_once() {
        let transport = ScriptedTransport::new();
        transport.respond("GET /api/ping/10.0.0.5", 200, json!({"status": "up"}));
        let poller = poller(&transport, Some(Duration::ZERO));
        assert_eq!(poller.interval(), None);
        poller.watch("10.0.0.5").await.expect("join");
        assert_eq!(transport.calls_to("GET /api/ping/10.0.0.5"), 1);
        assert_eq!(poller.status("10.0.0.5"), Reachability::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_watch_rechecks_on_interval() {
        let transport = ScriptedTransport::new();
        transport.respond("GET /api/ping/10.0.0.5", 200, json!({"status": "up"}));
        transport.respond("GET /api/ping/10.0.0.5", 200, json!({"status": "down"}));
        let poller = poller(&transport, Some(Duration::from_secs(30)));

        let handle = poller.watch("10.0.0.5");
        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.abort();

        assert_eq!(transport.calls_to("GET /api/ping/10.0.0.5"), 2);
        assert_eq!(poller.status("10.0.0.5"), Reachability::Down);
    }
}
