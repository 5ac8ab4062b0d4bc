//! End-to-end reassignment tests.
//!
//! Each test builds the standard tree `Global -> {OU1 -> {OU1A}, OU2}` with
//! environment E connected in OU1 and drives `Reassigner::reassign` through
//! the simulated control plane.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use converge::sim::SimCall;
use converge::{
    Error, MoveDirection, ReassignOutcome, ReassignStage, RemoteError, TaskStatus, UnitId,
};

use crate::fixtures::{production_reassigner, request, standard_plane, ENV_ID};

/// Test: promote to parent through an asynchronous task
/// Given E in OU1 and a task that reports pending, pending, completed
/// When E is reassigned from OU1 to Global
/// Then the patch removes E from OU1 and the run succeeds after three polls
#[tokio::test(start_paused = true)]
async fn test_move_to_parent_converges_through_task() {
    let plane = standard_plane();
    plane.script_next_task(&[TaskStatus::Pending, TaskStatus::Pending, TaskStatus::Completed]);
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let report = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, ReassignOutcome::Moved);
    assert_eq!(report.unit, UnitId::from("Global"));
    let placement = report.placement.as_ref().unwrap();
    assert_eq!(placement.target_unit, UnitId::from("OU1"));
    assert_eq!(placement.direction, MoveDirection::ToParent);

    let patches = plane.patches();
    assert_eq!(patches.len(), 1);
    assert_eq!(patches[0].unit, UnitId::from("OU1"));
    assert_eq!(patches[0].remove.len(), 1);
    assert!(patches[0].add.is_empty());

    // Three polls at the 5 s production cadence.
    assert_eq!(plane.calls().task_status, 3);
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(plane.unit_of(ENV_ID), Some(UnitId::from("Global")));

    let stages: Vec<_> = report.history.iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            ReassignStage::Idle,
            ReassignStage::StatusChecked,
            ReassignStage::EnvironmentResolved,
            ReassignStage::Validated,
            ReassignStage::PatchIssued,
            ReassignStage::Converged,
        ]
    );
}

/// Test: sibling move is rejected
/// Given OU2 is a sibling of OU1, not a child
/// When E is reassigned from OU1 to OU2
/// Then validation fails listing Global and OU1's children, and no patch is sent
#[tokio::test]
async fn test_sibling_move_fails_validation_without_patch() {
    let plane = standard_plane();
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    let err = reassigner
        .reassign(&request("OU1", "OU2"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(ReassignStage::Validated));
    match err.root_cause() {
        Error::InvalidPlacement {
            current,
            requested,
            allowed,
        } => {
            assert_eq!(current, &UnitId::from("OU1"));
            assert_eq!(requested, &UnitId::from("OU2"));
            assert_eq!(allowed, &vec![UnitId::from("Global"), UnitId::from("OU1A")]);
        }
        other => panic!("expected InvalidPlacement, got {other:?}"),
    }
    let message = err.to_string();
    assert!(message.contains("validated"));
    assert!(message.contains("Global, OU1A"));

    assert_eq!(plane.calls().patch_membership, 0);
    assert_eq!(plane.unit_of(ENV_ID), Some(UnitId::from("OU1")));
}

/// Test: demote to child
/// Given E in OU1
/// When E is reassigned from OU1 to OU1A
/// Then the patch adds E to OU1A
#[tokio::test(start_paused = true)]
async fn test_move_to_child_adds_membership() {
    let plane = standard_plane();
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    let report = reassigner
        .reassign(&request("OU1", "OU1A"), &cancel)
        .await
        .unwrap();

    assert_eq!(report.placement.unwrap().direction, MoveDirection::ToChild);
    let patches = plane.patches();
    assert_eq!(patches[0].unit, UnitId::from("OU1A"));
    assert_eq!(patches[0].add.len(), 1);
    assert_eq!(plane.unit_of(ENV_ID), Some(UnitId::from("OU1A")));
}

/// Test: idempotent re-run
/// Given a reassignment that already succeeded
/// When it is re-run from the reported unit
/// Then it is a no-op with no remote calls
#[tokio::test(start_paused = true)]
async fn test_rerun_after_success_is_noop() {
    let plane = standard_plane();
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    let first = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap();
    let calls_after_first = plane.calls();

    let second = reassigner
        .reassign(&request(first.unit.as_str(), "Global"), &cancel)
        .await
        .unwrap();

    assert_eq!(second.outcome, ReassignOutcome::AlreadyPlaced);
    assert_eq!(plane.calls(), calls_after_first);
    assert_eq!(plane.patches().len(), 1);
}

/// Test: stale re-run
/// Given E already moved to Global
/// When the original request (OU1 -> Global) is replayed
/// Then it fails before any patch because E is no longer visible from OU1
#[tokio::test(start_paused = true)]
async fn test_stale_rerun_fails_before_patch() {
    let plane = standard_plane();
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap();
    let err = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(ReassignStage::EnvironmentResolved));
    assert!(matches!(err.root_cause(), Error::EnvironmentNotFound { .. }));
    assert_eq!(plane.patches().len(), 1);
}

/// Test: stale re-run against a listing that is not scoped by unit
/// Given E already moved to Global and listings that return every match
/// When the original request (OU1 -> Global) is replayed
/// Then the reported membership disagrees and nothing is patched
#[tokio::test(start_paused = true)]
async fn test_stale_rerun_with_unscoped_listing_fails_before_patch() {
    let plane = standard_plane();
    plane.set_scoped_listings(false);
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap();
    let err = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(ReassignStage::EnvironmentResolved));
    match err.root_cause() {
        Error::StaleMembership {
            expected, actual, ..
        } => {
            assert_eq!(expected, &UnitId::from("OU1"));
            assert_eq!(actual, &UnitId::from("Global"));
        }
        other => panic!("expected StaleMembership, got {other:?}"),
    }
    assert_eq!(plane.calls().patch_membership, 1);
}

/// Test: with production settings, a zero interval override is refused
#[test]
fn test_zero_interval_override_is_refused() {
    let plane = standard_plane();
    let settings = converge::PollSettings {
        interval: Duration::ZERO,
        timeout: Duration::from_secs(5),
    };
    assert!(matches!(
        production_reassigner(&plane).with_poll_settings(settings),
        Err(Error::Validation(_))
    ));
}

/// Test: round trip up and back down
#[tokio::test(start_paused = true)]
async fn test_round_trip_parent_then_child() {
    let plane = standard_plane();
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap();
    let report = reassigner
        .reassign(&request("Global", "OU2"), &cancel)
        .await
        .unwrap();

    assert_eq!(report.placement.unwrap().target_unit, UnitId::from("OU2"));
    assert_eq!(plane.unit_of(ENV_ID), Some(UnitId::from("OU2")));
}

/// Test: hierarchy is re-read on every attempt
/// Given OU2 is re-parented under OU1 after a rejected attempt
/// When the same move is retried
/// Then it now succeeds as a move to a child
#[tokio::test(start_paused = true)]
async fn test_hierarchy_changes_are_observed() {
    let plane = standard_plane();
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    assert!(reassigner
        .reassign(&request("OU1", "OU2"), &cancel)
        .await
        .is_err());

    plane.reparent_unit("OU2", Some("OU1"));
    let report = reassigner
        .reassign(&request("OU1", "OU2"), &cancel)
        .await
        .unwrap();

    assert_eq!(report.placement.unwrap().direction, MoveDirection::ToChild);
    assert_eq!(plane.unit_of(ENV_ID), Some(UnitId::from("OU2")));
}

/// Test: aborted task
/// Given the move's task is aborted
/// When reassign runs
/// Then it fails at the convergence stage and membership is unchanged;
/// a second attempt with a healthy task succeeds
#[tokio::test(start_paused = true)]
async fn test_aborted_task_then_retry_succeeds() {
    let plane = standard_plane();
    plane.script_next_task(&[TaskStatus::InProgress, TaskStatus::Aborted]);
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    let err = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(ReassignStage::Converged));
    assert!(matches!(
        err.root_cause(),
        Error::TerminalTask { status: TaskStatus::Aborted, .. }
    ));
    assert_eq!(plane.unit_of(ENV_ID), Some(UnitId::from("OU1")));

    let report = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap();
    assert_eq!(report.outcome, ReassignOutcome::Moved);
}

/// Test: task never finishes
/// Given a task stuck in progress
/// When reassign waits with production settings
/// Then it fails with PollTimeout within one interval of 3600 s
#[tokio::test(start_paused = true)]
async fn test_stuck_task_times_out() {
    let plane = standard_plane();
    plane.script_next_task(&[TaskStatus::InProgress]);
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let err = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert_eq!(err.stage(), Some(ReassignStage::Converged));
    assert!(matches!(err.root_cause(), Error::PollTimeout { .. }));
    assert!(elapsed >= Duration::from_secs(3600));
    assert!(elapsed <= Duration::from_secs(3605));
}

/// Test: hierarchy read failure
/// Given the unit read fails with a server error
/// When reassign validates
/// Then the remote error surfaces at the validation stage, unretried
#[tokio::test]
async fn test_unit_read_failure_surfaces_at_validation() {
    let plane = standard_plane();
    plane.fail_next(
        SimCall::ReadUnit,
        RemoteError::Api {
            status: 503,
            message: "unavailable".to_string(),
        },
    );
    let reassigner = production_reassigner(&plane);
    let cancel = CancellationToken::new();

    let err = reassigner
        .reassign(&request("OU1", "Global"), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(ReassignStage::Validated));
    assert!(err.is_transient());
    assert!(err.to_string().contains("OU1"));
    assert_eq!(plane.calls().read_unit, 1);
    assert_eq!(plane.calls().patch_membership, 0);
}
