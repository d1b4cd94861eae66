//! Wire-level surface of the servercon console API.
//!
//! Everything here is session-agnostic: request/response shapes, endpoint
//! paths, and the [`ConsoleTransport`] seam with its reqwest implementation.
//! Session gating and orchestration live in `servercon-core`.

mod client;
pub mod paths;
mod transport;
mod types;

pub use client::{
    ConsoleClientConfig, ConsoleHttpClient, DEFAULT_REQUEST_ATTEMPTS, DEFAULT_TIMEOUT_MS,
};
pub use transport::{ApiRequest, ApiResponse, ConsoleTransport, HttpMethod, TransportError};
pub use types::{
    AppOption, AuthenticationMode, ConsoleToggle, ManagedUser, ManagedUserList, NewUserRequest,
    OsOption, PingResponse, PowerAction, ReinstallRequest, ReinstallType, RestoreSnapshotRequest,
    ServerCredentials, ServerDetail, ServerSummary, Snapshot, StatusMessage, UpdateGroupsRequest,
    UserIdentity,
};
