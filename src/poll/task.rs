//! Waiting for a server-side task to reach a terminal status.

use tokio_util::sync::CancellationToken;

use super::{poll_until, PollSettings, Step};
use crate::remote::TaskStatusSource;
use crate::types::{TaskId, TaskStatus};
use crate::{clog_debug, clog_trace, Error, Result};

/// Poll `task_id` until it completes.
///
/// Returns as soon as a terminal status is read: `completed` is success,
/// `aborted` and `failed` are [`Error::TerminalTask`]. A failed status read
/// is returned as [`Error::TransientFetch`] without retrying; wrap the call
/// in [`crate::retry::retry_transient`] for that. Runs out of time with
/// [`Error::PollTimeout`] and stops on `cancel` with [`Error::Cancelled`].
pub async fn await_task<C>(
    client: &C,
    task_id: &TaskId,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<()>
where
    C: TaskStatusSource + ?Sized,
{
    if task_id.is_empty() {
        return Err(Error::Validation("task id must not be empty".to_string()));
    }

    let what = format!("task {task_id}");
    let result = poll_until(&what, settings, cancel, || async move {
        let status = client
            .task_status(task_id)
            .await
            .map_err(|e| Error::remote("read task status", task_id, e))?;
        clog_trace!("[task] {} is {}", task_id, status);

        match status {
            TaskStatus::Completed => Ok(Step::Done(())),
            TaskStatus::Aborted | TaskStatus::Failed => Err(Error::TerminalTask {
                task_id: task_id.clone(),
                status,
            }),
            TaskStatus::Pending | TaskStatus::InProgress => Ok(Step::Pending),
        }
    })
    .await;

    match &result {
        Ok(()) => clog_debug!("[task] {} completed", task_id),
        Err(e) => clog_debug!("[task] {} not completed: {}", task_id, e),
    }
    result
}
