//! Select, type-to-confirm, commit.
//!
//! A [`DestructiveWorkflow`] owns the stage machine; a [`DestructivePlan`]
//! owns what is being selected and how it turns into an [`ActionRequest`].

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::action::{Ack, ActionExecutor, ActionRequest, ConfirmationToken};
use crate::error::{ActionError, ValidationFailure};
use crate::session::SessionGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStage {
    Closed,
    Selecting,
    Confirming,
    Committing,
    /// The session ended underneath the workflow; only `close` is accepted.
    Failed,
}

impl WorkflowStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Selecting => "selecting",
            Self::Confirming => "confirming",
            Self::Committing => "committing",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("cannot {action} while {stage}")]
    InvalidTransition {
        action: &'static str,
        stage: WorkflowStage,
    },
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error("{message}")]
    TokenMismatch { message: String },
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// The workflow-specific half of a destructive operation.
#[async_trait]
pub trait DestructivePlan: Send {
    fn server_id(&self) -> u64;

    fn token(&self) -> ConfirmationToken;

    /// Fetches the option set and resets the selection to its first entry.
    async fn load(&mut self, session: &SessionGuard) -> Result<(), ActionError>;

    /// Forgets loaded options so the next open starts fresh.
    fn reset(&mut self);

    /// The request the current selection would commit.
    fn build_request(&self) -> Result<ActionRequest, ValidationFailure>;

    /// Label/value rows shown while confirming.
    fn summary(&self) -> Vec<(&'static str, String)>;
}

type CompletionCallback = Box<dyn FnMut(Value) + Send>;

pub struct DestructiveWorkflow<P> {
    plan: P,
    executor: ActionExecutor,
    stage: WorkflowStage,
    history: Vec<WorkflowStage>,
    last_error: Option<String>,
    on_complete: Option<CompletionCallback>,
}

impl<P> DestructiveWorkflow<P>
where
    P: DestructivePlan,
{
    pub fn new(plan: P, executor: ActionExecutor) -> Self {
        Self {
            plan,
            executor,
            stage: WorkflowStage::Closed,
            history: vec![WorkflowStage::Closed],
            last_error: None,
            on_complete: None,
        }
    }

    /// Called once per successful commit with the server's result payload.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnMut(Value) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    /// Every stage entered since construction, starting with `Closed`.
    #[must_use]
    pub fn history(&self) -> &[WorkflowStage] {
        &self.history
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn plan(&self) -> &P {
        &self.plan
    }

    /// Selection edits are only meaningful while selecting.
    pub fn plan_mut(&mut self) -> Result<&mut P, WorkflowError> {
        self.expect_stage("edit the selection", WorkflowStage::Selecting)?;
        Ok(&mut self.plan)
    }

    #[must_use]
    pub fn token(&self) -> ConfirmationToken {
        self.plan.token()
    }

    #[must_use]
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        self.plan.summary()
    }

    /// Closed -> Selecting, always re-fetching the option set.
    pub async fn open(&mut self) -> Result<(), WorkflowError> {
        self.expect_stage("open", WorkflowStage::Closed)?;
        self.last_error = None;
        self.plan.reset();
        self.enter(WorkflowStage::Selecting);

        let session = self.executor.session().clone();
        if let Err(error) = self.plan.load(&session).await {
            if error.is_auth() {
                self.enter(WorkflowStage::Failed);
            } else {
                tracing::warn!(server_id = self.plan.server_id(), %error, "option set unavailable");
                self.last_error = Some(error.to_string());
            }
            return Err(error.into());
        }
        Ok(())
    }

    /// Selecting -> Confirming once the selection is complete.
    pub fn proceed(&mut self) -> Result<(), WorkflowError> {
        self.expect_stage("proceed", WorkflowStage::Selecting)?;
        if let Err(failure) = self.plan.build_request() {
            self.last_error = Some(failure.to_string());
            return Err(failure.into());
        }
        self.last_error = None;
        self.enter(WorkflowStage::Confirming);
        Ok(())
    }

    /// Confirming -> Selecting, keeping the selection.
    pub fn back(&mut self) -> Result<(), WorkflowError> {
        self.expect_stage("go back", WorkflowStage::Confirming)?;
        self.last_error = None;
        self.enter(WorkflowStage::Selecting);
        Ok(())
    }

    /// Abandons the workflow from any stage. A response still on its way is
    /// never applied.
    pub fn close(&mut self) {
        if self.stage != WorkflowStage::Closed {
            self.plan.reset();
            self.last_error = None;
            self.enter(WorkflowStage::Closed);
        }
    }

    /// Commits iff `typed` is exactly the plan's token.
    ///
    /// Success closes the workflow and fires the completion callback. A remote
    /// or transport failure returns to Confirming with the message kept in
    /// [`Self::last_error`].
    pub async fn submit(&mut self, typed: &str) -> Result<Ack, WorkflowError> {
        self.expect_stage("submit", WorkflowStage::Confirming)?;
        let token = self.plan.token();
        let request = self.plan.build_request()?;
        let Some(confirmed) = token.admit(typed, request) else {
            let message = token.rejection();
            self.last_error = Some(message.clone());
            return Err(WorkflowError::TokenMismatch { message });
        };

        self.last_error = None;
        self.enter(WorkflowStage::Committing);
        match self.executor.execute(confirmed).await {
            Ok(ack) => {
                self.plan.reset();
                self.enter(WorkflowStage::Closed);
                if let Some(callback) = self.on_complete.as_mut() {
                    callback(ack.body.clone());
                }
                Ok(ack)
            }
            Err(error) if error.is_auth() => {
                self.enter(WorkflowStage::Failed);
                Err(error.into())
            }
            Err(error) => {
                self.last_error = Some(error.to_string());
                self.enter(WorkflowStage::Confirming);
                Err(error.into())
            }
        }
    }

    fn expect_stage(&self, action: &'static str, expected: WorkflowStage) -> Result<(), WorkflowError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(WorkflowError::InvalidTransition {
                action,
                stage: self.stage,
            })
        }
    }

    fn enter(&mut self, stage: WorkflowStage) {
        tracing::debug!(server_id = self.plan.server_id(), from = %self.stage, to = %stage, "workflow transition");
        self.stage = stage;
        self.history.push(stage);
    }
}
