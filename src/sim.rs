//! In-memory control plane.
//!
//! Implements every remote trait against a local unit tree so reassignments
//! and pollers can be exercised without a live API: dry runs, tests, and
//! demos. Mutations follow the same rules as the real service: a remove
//! exposes the environment at the unit's parent, an add pulls it down from
//! the parent, and asynchronous patches only take effect once their task is
//! observed as completed.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::remote::{
    EnvironmentDirectory, MembershipClient, Record, RemoteError, RemoteResult, ResourceLookup,
    TaskStatusSource, UnitDirectory,
};
use crate::types::{
    Environment, EnvironmentId, EnvironmentKey, MembershipPatch, OrganizationalUnit, PatchOutcome,
    TaskId, TaskStatus, UnitId,
};
use crate::clog_trace;

/// Remote operations the simulator counts and can fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimCall {
    TaskStatus,
    ResourceById,
    ReadUnit,
    ListChildUnits,
    ListEnvironments,
    PatchMembership,
}

/// Number of calls served per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub task_status: u32,
    pub resource_by_id: u32,
    pub read_unit: u32,
    pub list_child_units: u32,
    pub list_environments: u32,
    pub patch_membership: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.task_status
            + self.resource_by_id
            + self.read_unit
            + self.list_child_units
            + self.list_environments
            + self.patch_membership
    }

    fn bump(&mut self, call: SimCall) {
        match call {
            SimCall::TaskStatus => self.task_status += 1,
            SimCall::ResourceById => self.resource_by_id += 1,
            SimCall::ReadUnit => self.read_unit += 1,
            SimCall::ListChildUnits => self.list_child_units += 1,
            SimCall::ListEnvironments => self.list_environments += 1,
            SimCall::PatchMembership => self.patch_membership += 1,
        }
    }
}

/// Status sequence used for tasks created without an explicit script.
const DEFAULT_TASK_SCRIPT: [TaskStatus; 2] = [TaskStatus::InProgress, TaskStatus::Completed];

#[derive(Debug)]
struct SimTask {
    /// Remaining statuses; the last one repeats.
    statuses: VecDeque<TaskStatus>,
    /// Membership change applied when the task is first seen completed.
    change: Option<(EnvironmentId, UnitId)>,
}

#[derive(Debug)]
struct SimResource {
    record: Record,
    hidden_reads: u32,
}

#[derive(Debug, Default)]
struct Inner {
    units: HashMap<UnitId, OrganizationalUnit>,
    environments: Vec<Environment>,
    membership: HashMap<EnvironmentId, UnitId>,
    tasks: HashMap<TaskId, SimTask>,
    task_scripts: VecDeque<Vec<TaskStatus>>,
    resources: HashMap<String, SimResource>,
    failures: HashMap<SimCall, VecDeque<RemoteError>>,
    synchronous_patches: bool,
    unscoped_listings: bool,
    latency: Duration,
    calls: CallCounts,
    patches: Vec<MembershipPatch>,
}

impl Inner {
    fn is_within(&self, unit: &UnitId, ancestor: &UnitId) -> bool {
        let mut cursor = Some(unit.clone());
        while let Some(id) = cursor {
            if &id == ancestor {
                return true;
            }
            cursor = self.units.get(&id).and_then(|u| u.parent_id.clone());
        }
        false
    }

    /// Where `patch` would put its environment, or why the service refuses it.
    fn destination(&self, patch: &MembershipPatch) -> RemoteResult<(EnvironmentId, UnitId)> {
        let unit = self.units.get(&patch.unit).ok_or_else(|| RemoteError::NotFound {
            resource: patch.unit.to_string(),
        })?;
        let conflict = |message: String| RemoteError::Api {
            status: 409,
            message,
        };

        match (patch.add.as_slice(), patch.remove.as_slice()) {
            ([env], []) => {
                let current = self.membership.get(env).ok_or_else(|| RemoteError::NotFound {
                    resource: env.to_string(),
                })?;
                if unit.parent_id.as_ref() != Some(current) {
                    return Err(conflict(format!(
                        "{env} is in {current}, which is not the parent of {}",
                        unit.id
                    )));
                }
                Ok((env.clone(), unit.id.clone()))
            }
            ([], [env]) => {
                let current = self.membership.get(env).ok_or_else(|| RemoteError::NotFound {
                    resource: env.to_string(),
                })?;
                if current != &unit.id {
                    return Err(conflict(format!("{env} is not a member of {}", unit.id)));
                }
                let parent = unit
                    .parent_id
                    .clone()
                    .ok_or_else(|| conflict(format!("{} is the root unit", unit.id)))?;
                Ok((env.clone(), parent))
            }
            _ => Err(RemoteError::Api {
                status: 400,
                message: "patch must add or remove exactly one environment".to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct SimulatedControlPlane {
    inner: Mutex<Inner>,
}

impl SimulatedControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_unit(&self, id: &str, parent: Option<&str>) {
        let unit = OrganizationalUnit::new(id, parent.map(UnitId::from));
        self.lock().units.insert(unit.id.clone(), unit);
    }

    /// Re-parent a unit, as another operator could between runs.
    pub fn reparent_unit(&self, id: &str, parent: Option<&str>) {
        if let Some(unit) = self.lock().units.get_mut(&UnitId::from(id)) {
            unit.parent_id = parent.map(UnitId::from);
        }
    }

    pub fn add_environment(&self, id: &str, account: &str, region: &str, unit: &str) {
        let mut inner = self.lock();
        let env = Environment {
            id: EnvironmentId::from(id),
            account: account.to_string(),
            region: region.to_string(),
            unit_id: None,
        };
        inner.membership.insert(env.id.clone(), UnitId::from(unit));
        inner.environments.push(env);
    }

    pub fn unit_of(&self, environment: &str) -> Option<UnitId> {
        self.lock()
            .membership
            .get(&EnvironmentId::from(environment))
            .cloned()
    }

    /// Register a resource that reads as not-found `hidden_reads` times first.
    pub fn add_resource(&self, id: &str, record: Record, hidden_reads: u32) {
        self.lock().resources.insert(
            id.to_string(),
            SimResource {
                record,
                hidden_reads,
            },
        );
    }

    /// Statuses the next asynchronous patch's task will report, in order.
    pub fn script_next_task(&self, statuses: &[TaskStatus]) {
        self.lock().task_scripts.push_back(statuses.to_vec());
    }

    /// Register a standalone task, e.g. one started by another mutation.
    pub fn add_task(&self, id: &str, statuses: &[TaskStatus]) {
        self.lock().tasks.insert(
            TaskId::from(id),
            SimTask {
                statuses: statuses.iter().copied().collect(),
                change: None,
            },
        );
    }

    pub fn set_synchronous_patches(&self, synchronous: bool) {
        self.lock().synchronous_patches = synchronous;
    }

    /// With `false`, environment listings ignore the context unit and return
    /// every match in the tree, each tagged with its current unit.
    pub fn set_scoped_listings(&self, scoped: bool) {
        self.lock().unscoped_listings = !scoped;
    }

    /// Delay applied to every call.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Make the next `call` fail with `error`. Failures queue per operation.
    pub fn fail_next(&self, call: SimCall, error: RemoteError) {
        self.lock().failures.entry(call).or_default().push_back(error);
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Every patch accepted so far, in order.
    pub fn patches(&self) -> Vec<MembershipPatch> {
        self.lock().patches.clone()
    }

    /// Count the call, honour latency, and pop any injected failure.
    async fn enter(&self, call: SimCall) -> RemoteResult<()> {
        let (latency, failure) = {
            let mut inner = self.lock();
            inner.calls.bump(call);
            let failure = inner.failures.get_mut(&call).and_then(VecDeque::pop_front);
            (inner.latency, failure)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskStatusSource for SimulatedControlPlane {
    async fn task_status(&self, task_id: &TaskId) -> RemoteResult<TaskStatus> {
        self.enter(SimCall::TaskStatus).await?;
        let mut inner = self.lock();
        let Inner {
            tasks, membership, ..
        } = &mut *inner;

        let task = tasks.get_mut(task_id).ok_or_else(|| RemoteError::NotFound {
            resource: task_id.to_string(),
        })?;
        let status = if task.statuses.len() > 1 {
            task.statuses.pop_front().unwrap_or(TaskStatus::Completed)
        } else {
            task.statuses.front().copied().unwrap_or(TaskStatus::Completed)
        };

        if status == TaskStatus::Completed {
            if let Some((environment, unit)) = task.change.take() {
                membership.insert(environment, unit);
            }
        }
        clog_trace!("[sim] task {} -> {}", task_id, status);
        Ok(status)
    }
}

#[async_trait]
impl ResourceLookup for SimulatedControlPlane {
    async fn resource_by_id(&self, id: &str) -> RemoteResult<Record> {
        self.enter(SimCall::ResourceById).await?;
        let mut inner = self.lock();
        let not_found = || RemoteError::NotFound {
            resource: id.to_string(),
        };
        let resource = inner.resources.get_mut(id).ok_or_else(not_found)?;
        if resource.hidden_reads > 0 {
            resource.hidden_reads -= 1;
            return Err(not_found());
        }
        Ok(resource.record.clone())
    }
}

#[async_trait]
impl UnitDirectory for SimulatedControlPlane {
    async fn read_unit(&self, id: &UnitId) -> RemoteResult<OrganizationalUnit> {
        self.enter(SimCall::ReadUnit).await?;
        self.lock()
            .units
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound {
                resource: id.to_string(),
            })
    }

    async fn list_child_units(&self, parent: &UnitId) -> RemoteResult<Vec<OrganizationalUnit>> {
        self.enter(SimCall::ListChildUnits).await?;
        let mut children: Vec<_> = self
            .lock()
            .units
            .values()
            .filter(|u| u.parent_id.as_ref() == Some(parent))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(children)
    }
}

#[async_trait]
impl EnvironmentDirectory for SimulatedControlPlane {
    async fn list_environments(
        &self,
        key: &EnvironmentKey,
        context: &UnitId,
    ) -> RemoteResult<Vec<Environment>> {
        self.enter(SimCall::ListEnvironments).await?;
        let inner = self.lock();
        if !inner.units.contains_key(context) {
            return Err(RemoteError::NotFound {
                resource: context.to_string(),
            });
        }
        Ok(inner
            .environments
            .iter()
            .filter(|env| key.matches(env))
            .filter_map(|env| {
                let unit = inner.membership.get(&env.id)?;
                if !inner.unscoped_listings && !inner.is_within(unit, context) {
                    return None;
                }
                Some(Environment {
                    unit_id: Some(unit.clone()),
                    ..env.clone()
                })
            })
            .collect())
    }
}

#[async_trait]
impl MembershipClient for SimulatedControlPlane {
    async fn patch_membership(
        &self,
        patch: &MembershipPatch,
        context: &UnitId,
    ) -> RemoteResult<PatchOutcome> {
        self.enter(SimCall::PatchMembership).await?;
        let mut inner = self.lock();
        if !inner.units.contains_key(context) {
            return Err(RemoteError::NotFound {
                resource: context.to_string(),
            });
        }
        let (environment, destination) = inner.destination(patch)?;
        inner.patches.push(patch.clone());

        if inner.synchronous_patches {
            inner.membership.insert(environment, destination);
            return Ok(PatchOutcome::Applied);
        }

        let statuses = inner
            .task_scripts
            .pop_front()
            .unwrap_or_else(|| DEFAULT_TASK_SCRIPT.to_vec());
        let task_id = TaskId::generate();
        inner.tasks.insert(
            task_id.clone(),
            SimTask {
                statuses: statuses.into(),
                change: Some((environment, destination)),
            },
        );
        clog_trace!("[sim] patch on {} accepted as task {}", patch.unit, task_id);
        Ok(PatchOutcome::Accepted { task_id })
    }
}
