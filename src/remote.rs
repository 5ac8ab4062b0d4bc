//! Contracts of the remote control plane.
//!
//! The wire format is not modelled here. Each trait covers one family of
//! calls; implementations wrap whatever client actually talks to the API.
//! Every call that depends on an organizational-unit scope takes that scope
//! as an explicit `context` argument instead of reading it from client state.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    Environment, EnvironmentKey, MembershipPatch, OrganizationalUnit, PatchOutcome, TaskId,
    TaskStatus, UnitId,
};

/// A resource as returned by a read-by-id call.
pub type Record = serde_json::Value;

/// Failure reported by the control plane or the transport in front of it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// The signature of a read that has not materialized yet.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RemoteError::NotFound { .. } | RemoteError::Api { status: 404, .. }
        )
    }

    /// Whether the same call may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Transport(_) => true,
            RemoteError::Api { status, .. } => *status == 429 || *status >= 500,
            RemoteError::NotFound { .. } | RemoteError::Malformed(_) => false,
        }
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

#[async_trait]
pub trait TaskStatusSource: Send + Sync {
    async fn task_status(&self, task_id: &TaskId) -> RemoteResult<TaskStatus>;
}

#[async_trait]
pub trait ResourceLookup: Send + Sync {
    async fn resource_by_id(&self, id: &str) -> RemoteResult<Record>;
}

#[async_trait]
pub trait UnitDirectory: Send + Sync {
    async fn read_unit(&self, id: &UnitId) -> RemoteResult<OrganizationalUnit>;

    /// Units whose parent is `parent`, filtered server-side.
    async fn list_child_units(&self, parent: &UnitId) -> RemoteResult<Vec<OrganizationalUnit>>;
}

#[async_trait]
pub trait EnvironmentDirectory: Send + Sync {
    /// Environments matching `key`, as visible from the `context` unit.
    async fn list_environments(
        &self,
        key: &EnvironmentKey,
        context: &UnitId,
    ) -> RemoteResult<Vec<Environment>>;
}

#[async_trait]
pub trait MembershipClient: Send + Sync {
    async fn patch_membership(
        &self,
        patch: &MembershipPatch,
        context: &UnitId,
    ) -> RemoteResult<PatchOutcome>;
}

/// Everything the reassignment orchestrator talks to.
pub trait ControlPlane:
    TaskStatusSource + UnitDirectory + EnvironmentDirectory + MembershipClient
{
}

impl<T> ControlPlane for T where
    T: TaskStatusSource + UnitDirectory + EnvironmentDirectory + MembershipClient
{
}
