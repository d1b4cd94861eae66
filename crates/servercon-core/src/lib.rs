//! Session-guarded orchestration for the servercon fleet console.
//!
//! Every call goes through a [`SessionGuard`]. Mutations additionally need a
//! [`ConfirmedAction`], which only an operator prompt or an exact
//! [`ConfirmationToken`] match can produce.

mod action;
mod admin;
pub mod config;
mod console;
mod error;
mod fleet;
mod poller;
mod reinstall;
mod restore;
mod session;
mod workflow;

#[cfg(test)]
mod testing;

pub use action::{
    Ack, ActionExecutor, ActionKind, ActionRequest, ConfirmationToken, ConfirmedAction,
    InFlightGuard, InFlightRegistry,
};
pub use admin::{AdminConsole, ConfirmedDeletion, UserDeletion, parse_groups};
pub use console::{ConsoleCredentials, MISSING_VNC_PASSWORD, fetch_console_credentials};
pub use error::{ActionError, ValidationFailure};
pub use fleet::{ELIGIBLE_STATUSES, Fleet, ServerCard, ServerEntity, eligible_servers, is_eligible};
pub use poller::{Reachability, ReachabilityState, StatusPoller};
pub use reinstall::{CatalogEntry, ReinstallPlan};
pub use restore::{SnapshotRestorePlan, format_created_at, format_size};
pub use session::{
    ADMIN_GROUPS, AccessDenied, AuthFailure, AuthFailureCause, CredentialProvider, Identity,
    MemoryCredentials, Navigator, Redirect, Remedy, SESSION_COOKIE_MARKER, SessionGuard,
    cookie_names, expiry_directives, is_admin,
};
pub use workflow::{DestructivePlan, DestructiveWorkflow, WorkflowError, WorkflowStage};
