//! Core type definitions shared by the pollers, the validator and the
//! reassignment orchestrator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Opaque server-side handle for an asynchronous mutation.
    TaskId
);

string_id!(
    /// Identifier of an organizational unit.
    UnitId
);

string_id!(
    /// The control plane's internal identifier for a connected environment.
    EnvironmentId
);

impl TaskId {
    /// Mint a fresh task id. Only the simulated control plane does this.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Status of a server-side task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Aborted,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Aborted | TaskStatus::Failed
        )
    }

    pub fn is_success(&self) -> bool {
        *self == TaskStatus::Completed
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Aborted => write!(f, "aborted"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" | "in-progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "aborted" => Ok(TaskStatus::Aborted),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::Validation(format!("unknown task status: {other}"))),
        }
    }
}

/// A node of the organizational-unit tree as read from the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationalUnit {
    pub id: UnitId,
    /// `None` only for the root.
    pub parent_id: Option<UnitId>,
    #[serde(default)]
    pub name: String,
}

impl OrganizationalUnit {
    pub fn new(id: impl Into<UnitId>, parent_id: Option<UnitId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            parent_id,
        }
    }

}

/// The (account, region) pair that uniquely names a connected environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvironmentKey {
    pub account: String,
    pub region: String,
}

impl EnvironmentKey {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            region: region.into(),
        }
    }

    pub fn matches(&self, env: &Environment) -> bool {
        self.account == env.account && self.region == env.region
    }
}

impl std::fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.account, self.region)
    }
}

/// A connected environment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: EnvironmentId,
    pub account: String,
    pub region: String,
    /// Unit the environment is a direct member of, when the listing reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<UnitId>,
}

impl Environment {
    pub fn key(&self) -> EnvironmentKey {
        EnvironmentKey::new(&self.account, &self.region)
    }
}

/// Which way an adjacency move goes, and therefore which edit the patch makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    /// Remove the membership edge from the current unit, exposing it at the parent.
    ToParent,
    /// Add the membership edge to an immediate child.
    ToChild,
}

impl std::fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveDirection::ToParent => write!(f, "to_parent"),
            MoveDirection::ToChild => write!(f, "to_child"),
        }
    }
}

/// A legal move computed by the adjacency validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    /// The unit the membership patch is scoped to.
    pub target_unit: UnitId,
    pub direction: MoveDirection,
}

impl Placement {
    pub fn is_move_to_parent(&self) -> bool {
        self.direction == MoveDirection::ToParent
    }
}

/// Add/remove membership edits against a single unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipPatch {
    pub unit: UnitId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<EnvironmentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<EnvironmentId>,
}

impl MembershipPatch {
    /// Build the single-edge patch a placement calls for.
    pub fn for_placement(placement: &Placement, environment: &EnvironmentId) -> Self {
        let edit = vec![environment.clone()];
        let (add, remove) = match placement.direction {
            MoveDirection::ToParent => (Vec::new(), edit),
            MoveDirection::ToChild => (edit, Vec::new()),
        };
        Self {
            unit: placement.target_unit.clone(),
            add,
            remove,
        }
    }
}

/// How the control plane answered a membership patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchOutcome {
    /// Already applied.
    Applied,
    /// Accepted for asynchronous processing.
    Accepted { task_id: TaskId },
}
