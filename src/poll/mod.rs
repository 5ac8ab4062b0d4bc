//! Polling primitives for eventually-consistent reads.
//!
//! Both pollers share one loop shape: a ticker, a single deadline fixed at
//! call start, and the caller's cancellation token, multiplexed with
//! `tokio::select!`. They differ only in the probe that decides whether to
//! keep going, so each lives in its own module with its own probe:
//! - [`await_task`] keys off the task status enumeration
//! - [`await_visible`] keys off the not-found error signature

mod task;
mod visible;

pub use task::await_task;
pub use visible::await_visible;

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_TIMEOUT_SECS};
use crate::{clog_trace, Error, Result};

/// Cadence and hard deadline for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
        }
    }
}

impl PollSettings {
    /// Requires `interval > 0` and `timeout > interval`.
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self> {
        let settings = Self { interval, timeout };
        settings.validate()?;
        Ok(settings)
    }

    /// Check settings built field by field.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Validation(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.timeout <= self.interval {
            return Err(Error::Validation(format!(
                "poll timeout ({:?}) must exceed poll interval ({:?})",
                self.timeout, self.interval
            )));
        }
        Ok(())
    }

    /// Short cadence for tests and simulations.
    pub fn fast() -> Self {
        Self {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        }
    }
}

/// What a probe observed on one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Done(T),
    Pending,
}

/// Run `probe` once per tick until it finishes, the deadline passes, or
/// `cancel` fires.
///
/// Invalid `settings` fail with [`Error::Validation`] before any probe.
/// The first probe runs immediately. The probe is raced against the deadline
/// and the token too, so a hung remote call cannot stretch the wait past the
/// timeout. When several sources are ready at once, cancellation wins, then
/// the deadline.
pub(crate) async fn poll_until<T, F, Fut>(
    what: &str,
    settings: &PollSettings,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Step<T>>>,
{
    settings.validate()?;

    let started = Instant::now();
    let deadline = sleep(settings.timeout);
    tokio::pin!(deadline);

    let mut ticker = interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut polls: u32 = 0;
    let timed_out = |polls: u32| Error::PollTimeout {
        what: what.to_string(),
        timeout: settings.timeout,
        polls,
    };
    let cancelled = || Error::Cancelled {
        what: what.to_string(),
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = &mut deadline => return Err(timed_out(polls)),
            _ = ticker.tick() => {}
        }

        polls += 1;
        clog_trace!(
            "[poll] {} poll #{} at {:?}",
            what,
            polls,
            started.elapsed()
        );

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = &mut deadline => return Err(timed_out(polls)),
            step = probe() => step?,
        };

        if let Step::Done(value) = step {
            return Ok(value);
        }
    }
}
