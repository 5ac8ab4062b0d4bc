//! Moving a connected environment between adjacent organizational units.
//!
//! [`Reassigner::reassign`] drives an explicit state machine. Each state has
//! one transition function, and any error is tagged with the stage that was
//! being entered when it happened. Nothing is rolled back: if the patch was
//! sent but its task did not complete, the control plane's view is
//! authoritative and the caller re-runs the reassignment, which re-reads the
//! live hierarchy.

mod state;

pub use state::{ReassignProgress, ReassignStage, StageHistoryEntry};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::hierarchy::validate_move;
use crate::poll::{await_task, PollSettings};
use crate::remote::ControlPlane;
use crate::retry::retry_transient;
use crate::types::{
    Environment, EnvironmentId, EnvironmentKey, MembershipPatch, PatchOutcome, Placement, TaskId,
    UnitId,
};
use crate::{clog, clog_debug, clog_warn, Error, Result};

/// What the caller wants moved, and what it believes the current state is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReassignRequest {
    pub environment: EnvironmentKey,
    /// Live connection status of the environment, e.g. "connected".
    pub connection_status: String,
    pub current_unit: UnitId,
    pub requested_unit: UnitId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassignOutcome {
    /// The membership edge moved.
    Moved,
    /// The environment was already in the requested unit; nothing was sent.
    AlreadyPlaced,
}

/// Result of a successful reassignment. Callers commit local state from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignReport {
    pub outcome: ReassignOutcome,
    pub environment: EnvironmentKey,
    pub environment_id: Option<EnvironmentId>,
    /// The unit the environment now belongs to.
    pub unit: UnitId,
    pub placement: Option<Placement>,
    /// Set when the control plane processed the patch asynchronously.
    pub task_id: Option<TaskId>,
    pub history: Vec<StageHistoryEntry>,
}

/// Data carried between stages. One variant per stage.
#[derive(Debug)]
enum State {
    Idle,
    StatusChecked,
    EnvironmentResolved {
        environment: Environment,
    },
    Validated {
        environment: Environment,
        placement: Placement,
    },
    PatchIssued {
        environment: Environment,
        placement: Placement,
        outcome: PatchOutcome,
    },
    Converged {
        environment: Option<Environment>,
        placement: Option<Placement>,
        task_id: Option<TaskId>,
    },
}

impl State {
    fn stage(&self) -> ReassignStage {
        match self {
            State::Idle => ReassignStage::Idle,
            State::StatusChecked => ReassignStage::StatusChecked,
            State::EnvironmentResolved { .. } => ReassignStage::EnvironmentResolved,
            State::Validated { .. } => ReassignStage::Validated,
            State::PatchIssued { .. } => ReassignStage::PatchIssued,
            State::Converged { .. } => ReassignStage::Converged,
        }
    }
}

/// Orchestrates status check, environment lookup, adjacency validation,
/// membership patch and task convergence for one environment at a time.
///
/// Holds no per-call state, so one instance can serve concurrent
/// reassignments of different environments. Reassignments that touch the
/// same unit must be serialized by the caller.
pub struct Reassigner<C: ?Sized> {
    client: Arc<C>,
    settings: PollSettings,
    config: Config,
}

impl<C: ?Sized> Clone for Reassigner<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            settings: self.settings,
            config: self.config.clone(),
        }
    }
}

impl<C> Reassigner<C>
where
    C: ControlPlane + ?Sized,
{
    /// Use the poll settings, ready statuses and retry policy from `config`.
    pub fn new(client: Arc<C>, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            settings: config.poll_settings()?,
            config: config.clone(),
        })
    }

    /// Override the configured poll cadence.
    pub fn with_poll_settings(mut self, settings: PollSettings) -> Result<Self> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    pub fn poll_settings(&self) -> &PollSettings {
        &self.settings
    }

    /// [`Reassigner::reassign`] under the configured `[retry]` policy.
    ///
    /// Only transient remote failures are retried, and every attempt starts
    /// again from `Idle`, re-reading the environment and the hierarchy.
    pub async fn reassign_with_retry(
        &self,
        request: &ReassignRequest,
        cancel: &CancellationToken,
    ) -> Result<ReassignReport> {
        retry_transient(&self.config.retry_policy(), cancel, || {
            self.reassign(request, cancel)
        })
        .await
    }

    /// Move the environment to `requested_unit`.
    ///
    /// # Errors
    ///
    /// Always [`Error::Reassign`], carrying the stage being entered and the
    /// underlying cause:
    /// - `StatusChecked`: [`Error::NotReady`] or an empty identifier
    /// - `EnvironmentResolved`: [`Error::EnvironmentNotFound`],
    ///   [`Error::AmbiguousEnvironment`] or a remote failure
    /// - `Validated`: [`Error::InvalidPlacement`] or a remote failure
    /// - `PatchIssued`: the patch was rejected or never reached the server
    /// - `Converged`: the task failed, timed out or was cancelled
    pub async fn reassign(
        &self,
        request: &ReassignRequest,
        cancel: &CancellationToken,
    ) -> Result<ReassignReport> {
        clog!(
            "[reassign] {} from {} to {}",
            request.environment,
            request.current_unit,
            request.requested_unit
        );

        let mut progress = ReassignProgress::new();
        let mut state = State::Idle;

        loop {
            let next = match state {
                State::Converged {
                    environment,
                    placement,
                    task_id,
                } => {
                    let outcome = if placement.is_some() {
                        ReassignOutcome::Moved
                    } else {
                        ReassignOutcome::AlreadyPlaced
                    };
                    clog!(
                        "[reassign] {} is in {} ({:?})",
                        request.environment,
                        request.requested_unit,
                        outcome
                    );
                    return Ok(ReassignReport {
                        outcome,
                        environment: request.environment.clone(),
                        environment_id: environment.map(|env| env.id),
                        unit: request.requested_unit.clone(),
                        placement,
                        task_id,
                        history: progress.into_history(),
                    });
                }
                State::Idle => self.check_status(request),
                State::StatusChecked => self.resolve_environment(request).await,
                State::EnvironmentResolved { environment } => {
                    self.validate(request, environment).await
                }
                State::Validated {
                    environment,
                    placement,
                } => self.issue_patch(request, environment, placement).await,
                State::PatchIssued {
                    environment,
                    placement,
                    outcome,
                } => self.converge(environment, placement, outcome, cancel).await,
            };

            state = match next {
                Ok(next) => {
                    progress.transition(next.stage())?;
                    clog_debug!("[reassign] {} entered {}", request.environment, next.stage());
                    next
                }
                Err((stage, cause)) => {
                    progress.transition(ReassignStage::Failed)?;
                    let path: Vec<String> = progress
                        .history()
                        .iter()
                        .map(|entry| entry.stage.to_string())
                        .collect();
                    clog_warn!(
                        "[reassign] {} failed at {} after {}: {}",
                        request.environment,
                        stage,
                        path.join(" -> "),
                        cause
                    );
                    return Err(Error::Reassign {
                        stage,
                        environment: request.environment.clone(),
                        source: Box::new(cause),
                    });
                }
            };
        }
    }

    /// Idle -> StatusChecked. Makes no remote calls.
    fn check_status(&self, request: &ReassignRequest) -> StepResult {
        let fail = |e: Error| (ReassignStage::StatusChecked, e);

        if request.current_unit.is_empty() || request.requested_unit.is_empty() {
            return Err(fail(Error::Validation(
                "current and requested unit ids must not be empty".to_string(),
            )));
        }

        if !self.config.is_ready(&request.connection_status) {
            return Err(fail(Error::NotReady {
                key: request.environment.clone(),
                status: request.connection_status.clone(),
            }));
        }
        Ok(State::StatusChecked)
    }

    /// StatusChecked -> EnvironmentResolved, or straight to Converged when
    /// nothing needs to move.
    async fn resolve_environment(&self, request: &ReassignRequest) -> StepResult {
        if request.current_unit == request.requested_unit {
            clog_debug!(
                "[reassign] {} already in {}",
                request.environment,
                request.requested_unit
            );
            return Ok(State::Converged {
                environment: None,
                placement: None,
                task_id: None,
            });
        }

        let fail = |e: Error| (ReassignStage::EnvironmentResolved, e);
        let key = &request.environment;
        let mut matches: Vec<Environment> = self
            .client
            .list_environments(key, &request.current_unit)
            .await
            .map_err(|e| fail(Error::remote("list environments", key, e)))?
            .into_iter()
            .filter(|env| key.matches(env))
            .collect();

        let environment = match matches.len() {
            0 => return Err(fail(Error::EnvironmentNotFound { key: key.clone() })),
            1 => matches.remove(0),
            _ => {
                return Err(fail(Error::AmbiguousEnvironment {
                    key: key.clone(),
                    matches: matches.into_iter().map(|env| env.id).collect(),
                }))
            }
        };

        // Listings that report membership must agree with the caller's view.
        if let Some(actual) = &environment.unit_id {
            if actual != &request.current_unit {
                return Err(fail(Error::StaleMembership {
                    key: key.clone(),
                    expected: request.current_unit.clone(),
                    actual: actual.clone(),
                }));
            }
        }

        Ok(State::EnvironmentResolved { environment })
    }

    /// EnvironmentResolved -> Validated.
    async fn validate(&self, request: &ReassignRequest, environment: Environment) -> StepResult {
        let placement = validate_move(
            self.client.as_ref(),
            &request.current_unit,
            &request.requested_unit,
        )
        .await
        .map_err(|e| (ReassignStage::Validated, e))?;

        clog_debug!(
            "[reassign] {} placement: patch {} {}",
            environment.id,
            placement.target_unit,
            placement.direction
        );
        Ok(State::Validated {
            environment,
            placement,
        })
    }

    /// Validated -> PatchIssued.
    async fn issue_patch(
        &self,
        request: &ReassignRequest,
        environment: Environment,
        placement: Placement,
    ) -> StepResult {
        let patch = MembershipPatch::for_placement(&placement, &environment.id);
        let outcome = self
            .client
            .patch_membership(&patch, &request.current_unit)
            .await
            .map_err(|e| {
                (
                    ReassignStage::PatchIssued,
                    Error::remote("patch unit membership", &patch.unit, e),
                )
            })?;

        Ok(State::PatchIssued {
            environment,
            placement,
            outcome,
        })
    }

    /// PatchIssued -> Converged, waiting on the task when there is one.
    async fn converge(
        &self,
        environment: Environment,
        placement: Placement,
        outcome: PatchOutcome,
        cancel: &CancellationToken,
    ) -> StepResult {
        let task_id = match outcome {
            PatchOutcome::Applied => None,
            PatchOutcome::Accepted { task_id } => {
                clog_debug!("[reassign] {} waiting on task {}", environment.id, task_id);
                await_task(self.client.as_ref(), &task_id, &self.settings, cancel)
                    .await
                    .map_err(|e| (ReassignStage::Converged, e))?;
                Some(task_id)
            }
        };

        Ok(State::Converged {
            environment: Some(environment),
            placement: Some(placement),
            task_id,
        })
    }
}

/// A transition either yields the next state or the stage it failed to enter.
type StepResult = std::result::Result<State, (ReassignStage, Error)>;
