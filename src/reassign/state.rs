//! Reassignment stages with transition validation.
//!
//! A reassignment moves strictly forward:
//!
//! Idle -> StatusChecked -> EnvironmentResolved -> Validated -> PatchIssued -> Converged
//!
//! StatusChecked may jump straight to Converged when the environment already
//! sits in the requested unit. Failed is reachable from every non-final stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassignStage {
    Idle,
    /// Connection status accepted; no remote call made yet.
    StatusChecked,
    /// Exactly one environment matched the (account, region) key.
    EnvironmentResolved,
    /// The requested unit is adjacent and the patch target is known.
    Validated,
    /// The membership patch was sent.
    PatchIssued,
    /// The patch is applied, synchronously or via a completed task.
    Converged,
    Failed,
}

impl ReassignStage {
    pub fn is_final(&self) -> bool {
        matches!(self, ReassignStage::Converged | ReassignStage::Failed)
    }
}

impl std::fmt::Display for ReassignStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReassignStage::Idle => write!(f, "idle"),
            ReassignStage::StatusChecked => write!(f, "status_checked"),
            ReassignStage::EnvironmentResolved => write!(f, "environment_resolved"),
            ReassignStage::Validated => write!(f, "validated"),
            ReassignStage::PatchIssued => write!(f, "patch_issued"),
            ReassignStage::Converged => write!(f, "converged"),
            ReassignStage::Failed => write!(f, "failed"),
        }
    }
}

/// A stage entered during a reassignment, with its timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageHistoryEntry {
    pub stage: ReassignStage,
    pub entered_at: DateTime<Utc>,
}

/// Tracks the current stage and every stage visited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignProgress {
    stage: ReassignStage,
    history: Vec<StageHistoryEntry>,
}

impl Default for ReassignProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ReassignProgress {
    pub fn new() -> Self {
        Self {
            stage: ReassignStage::Idle,
            history: vec![StageHistoryEntry {
                stage: ReassignStage::Idle,
                entered_at: Utc::now(),
            }],
        }
    }

    pub fn can_transition(&self, target: ReassignStage) -> bool {
        use ReassignStage::*;
        match (self.stage, target) {
            (from, Failed) => !from.is_final(),
            (Idle, StatusChecked)
            | (StatusChecked, EnvironmentResolved)
            | (StatusChecked, Converged)
            | (EnvironmentResolved, Validated)
            | (Validated, PatchIssued)
            | (PatchIssued, Converged) => true,
            _ => false,
        }
    }

    pub fn transition(&mut self, target: ReassignStage) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::Validation(format!(
                "invalid reassignment transition from {} to {}",
                self.stage, target
            )));
        }
        self.stage = target;
        self.history.push(StageHistoryEntry {
            stage: target,
            entered_at: Utc::now(),
        });
        Ok(())
    }

    pub fn current(&self) -> ReassignStage {
        self.stage
    }

    pub fn history(&self) -> &[StageHistoryEntry] {
        &self.history
    }

    pub fn into_history(self) -> Vec<StageHistoryEntry> {
        self.history
    }
}
