//! In-memory doubles shared by the unit tests of this crate.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use servercon_api::{ApiRequest, ApiResponse, ConsoleTransport, TransportError};
use tokio::sync::Notify;

use crate::session::{MemoryCredentials, Navigator, Redirect, SessionGuard};

#[derive(Debug, Clone)]
enum Reply {
    Respond(ApiResponse),
    Fail(String),
}

#[derive(Default)]
struct ScriptState {
    replies: HashMap<String, VecDeque<Reply>>,
    gates: HashMap<String, Arc<Notify>>,
    calls: Vec<ApiRequest>,
}

/// Replies keyed by `"METHOD /path"`. Queued replies are consumed in order;
/// the last one for a key is sticky. Unscripted keys answer 404.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, key: &str, status: u16, body: Value) {
        self.push(key, Reply::Respond(ApiResponse::new(status, body)));
    }

    pub fn fail(&self, key: &str, message: &str) {
        self.push(key, Reply::Fail(message.to_string()));
    }

    /// Holds every call for `key` until the returned handle is notified.
    pub fn gate(&self, key: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.lock()
            .gates
            .insert(key.to_string(), Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.lock().calls.clone()
    }

    pub fn call_keys(&self) -> Vec<String> {
        self.calls().iter().map(key_of).collect()
    }

    pub fn calls_to(&self, key: &str) -> usize {
        self.call_keys().iter().filter(|called| *called == key).count()
    }

    pub fn cookies(&self) -> Vec<Option<String>> {
        self.calls().into_iter().map(|call| call.cookie).collect()
    }

    fn push(&self, key: &str, reply: Reply) {
        self.lock()
            .replies
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key_of(request: &ApiRequest) -> String {
    format!("{} {}", request.method.as_str(), request.path)
}

#[async_trait]
impl ConsoleTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let key = key_of(&request);
        let gate = {
            let mut state = self.lock();
            state.calls.push(request);
            state.gates.get(&key).cloned()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = {
            let mut state = self.lock();
            match state.replies.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match reply {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(TransportError::Request { message }),
            None => Ok(ApiResponse::new(404, json!({"error": "not scripted"}))),
        }
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<Redirect>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<Redirect> {
        self.redirects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, target: Redirect) {
        self.redirects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(target);
    }
}

pub fn guard_with(
    transport: &ScriptedTransport,
    cookie: Option<&str>,
) -> (SessionGuard, Arc<RecordingNavigator>, Arc<MemoryCredentials>) {
    let navigator = Arc::new(RecordingNavigator::default());
    let credentials = Arc::new(MemoryCredentials::new("console.example.com", cookie));
    let guard = SessionGuard::new(
        Arc::new(transport.clone()),
        credentials.clone(),
        navigator.clone(),
    );
    (guard, navigator, credentials)
}
