use thiserror::Error;

use crate::action::ActionKind;
use crate::session::AuthFailure;

/// A required input is missing; nothing was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("Please select {what}")]
    MissingSelection { what: &'static str },
    #[error("Please provide an SSH key")]
    MissingSshKey,
    #[error("option {id} is not in the current list")]
    UnknownOption { id: String },
    #[error("Please provide both email and at least one group")]
    IncompleteUser,
    #[error("reachability subject must not be empty")]
    EmptySubject,
}

/// Outcome taxonomy for every guarded call.
///
/// `Auth` has already been acted on (redirect or hard clear) by the time a
/// caller sees it; it is returned only so the caller can stop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Auth(AuthFailure),
    #[error(transparent)]
    Validation(ValidationFailure),
    #[error("{message}")]
    Remote { status: u16, message: String },
    #[error("{message}")]
    Transport { message: String, detail: String },
    #[error("{message}")]
    Protocol { message: String },
    #[error("{kind} is already in flight for server {server_id}")]
    InFlight { server_id: u64, kind: ActionKind },
}

impl ActionError {
    /// Whether the operator can retry from where they are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::Transport { .. } | Self::InFlight { .. }
        )
    }

    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<ValidationFailure> for ActionError {
    fn from(value: ValidationFailure) -> Self {
        Self::Validation(value)
    }
}

impl From<AuthFailure> for ActionError {
    fn from(value: AuthFailure) -> Self {
        Self::Auth(value)
    }
}
