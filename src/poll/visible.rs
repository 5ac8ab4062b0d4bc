//! Read-after-write convergence: waiting for a freshly written resource to
//! show up on the read path.

use tokio_util::sync::CancellationToken;

use super::{poll_until, PollSettings, Step};
use crate::remote::{Record, ResourceLookup};
use crate::{clog_debug, clog_trace, Error, Result};

/// Poll `resource_id` until a read succeeds, returning the record.
///
/// Only the not-found signature (see [`crate::remote::RemoteError::is_not_found`])
/// means "not materialized yet". Every other read failure ends the wait at once.
pub async fn await_visible<R>(
    reader: &R,
    resource_id: &str,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<Record>
where
    R: ResourceLookup + ?Sized,
{
    if resource_id.trim().is_empty() {
        return Err(Error::Validation(
            "resource id must not be empty".to_string(),
        ));
    }

    let what = format!("resource {resource_id}");
    let result = poll_until(&what, settings, cancel, || async move {
        match reader.resource_by_id(resource_id).await {
            Ok(record) => Ok(Step::Done(record)),
            Err(e) if e.is_not_found() => {
                clog_trace!("[visible] {} not materialized yet", resource_id);
                Ok(Step::Pending)
            }
            Err(e) => Err(Error::remote("read resource", resource_id, e)),
        }
    })
    .await;

    match &result {
        Ok(_) => clog_debug!("[visible] {} is visible", resource_id),
        Err(e) => clog_debug!("[visible] {} not visible: {}", resource_id, e),
    }
    result
}
