//! Waiting policy for blocking queue operations.
//!
//! None of the queues block on OS primitives. A blocking push or pop is a
//! retry loop around the non-blocking operation; [`WaitStrategy`] picks what
//! happens between attempts and [`Timeout`] bounds the loop.

use std::time::Duration;

use minstant::Instant;
use serde::{Deserialize, Serialize};

/// Timeout specification for blocking operations.
///
/// A duration too large for the clock to represent behaves like
/// [`Timeout::Infinite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Timeout {
    /// Wait indefinitely.
    #[default]
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}

impl Timeout {
    fn deadline(self) -> Option<Instant> {
        match self {
            Self::Infinite => None,
            // Past the clock's range: the deadline can never be reached.
            Self::Duration(d) if u64::try_from(d.as_nanos()).is_err() => None,
            Self::Duration(d) => Instant::now().checked_add(d),
        }
    }
}

/// What a waiting thread does between two failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WaitStrategy {
    /// Busy-wait with a CPU spin hint. Lowest latency, burns a core.
    #[default]
    Spin,
    /// Yield the time slice to the OS scheduler.
    Yield,
    /// Sleep for a fixed interval.
    Sleep(Duration),
}

impl WaitStrategy {
    /// Performs one idle step.
    #[inline]
    pub fn idle(&self) {
        match self {
            Self::Spin => std::hint::spin_loop(),
            Self::Yield => std::thread::yield_now(),
            Self::Sleep(d) => std::thread::sleep(*d),
        }
    }
}

/// Retries `attempt` until it succeeds or the timeout expires.
///
/// `attempt` hands its state back on failure so that a rejected item can be
/// retried without cloning. On timeout the last returned state is handed back
/// to the caller.
pub(crate) fn retry<S, R>(
    mut state: S,
    wait: WaitStrategy,
    timeout: Timeout,
    mut attempt: impl FnMut(S) -> Result<R, S>,
) -> Result<R, S> {
    let deadline = timeout.deadline();
    loop {
        match attempt(state) {
            Ok(done) => return Ok(done),
            Err(returned) => {
                state = returned;
                if let Some(dl) = deadline
                    && Instant::now() > dl
                {
                    return Err(state);
                }
                wait.idle();
            }
        }
    }
}
