//! Convergence core for a control plane that mutates asynchronously and
//! reads eventually-consistently.
//!
//! - [`poll::await_task`] waits for a server-side task to finish
//! - [`poll::await_visible`] waits for a written resource to become readable
//! - [`hierarchy::validate_move`] checks an organizational-unit move is adjacent
//! - [`reassign::Reassigner`] moves an environment between units end to end
//!
//! The remote API is reached only through the traits in [`remote`].

pub mod config;
pub mod error;
pub mod hierarchy;
pub mod log;
pub mod poll;
pub mod reassign;
pub mod remote;
pub mod retry;
pub mod sim;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use hierarchy::validate_move;
pub use poll::{await_task, await_visible, PollSettings};
pub use reassign::{ReassignOutcome, ReassignReport, ReassignRequest, ReassignStage, Reassigner};
pub use remote::{ControlPlane, RemoteError};
pub use retry::{retry_transient, RetryPolicy};
pub use types::{
    Environment, EnvironmentId, EnvironmentKey, MembershipPatch, MoveDirection,
    OrganizationalUnit, PatchOutcome, Placement, TaskId, TaskStatus, UnitId,
};
