//! Fixed-interval polling with a deadline.
//!
//! Used while the page is still materializing: check immediately, then once
//! per interval, and give up at the deadline with the last observation.

use std::future::Future;

use tokio::time::{Duration, Instant, MissedTickBehavior, interval, timeout_at};

/// Result of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitFor<T> {
    /// The condition holds; polling stops with this value.
    Ready(T),
    /// Not yet; `last_observed` is reported if the deadline passes.
    NotReady { last_observed: Option<String> },
}

impl<T> WaitFor<T> {
    #[must_use]
    pub fn not_ready(observed: impl Into<String>) -> Self {
        Self::NotReady {
            last_observed: Some(observed.into()),
        }
    }
}

/// The deadline passed before the condition held.
#[derive(Debug, Clone, thiserror::Error)]
#[error("timed out after {elapsed:?} waiting for {expected} ({polls} polls, last observed: {last_observed:?})")]
pub struct WaitError {
    pub expected: String,
    pub last_observed: Option<String>,
    pub polls: usize,
    pub elapsed: Duration,
}

/// Run `check` every `every` until it is ready or `timeout` elapses.
pub async fn poll_until<T, F, Fut>(
    expected: &str,
    every: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = WaitFor<T>>,
{
    let start = Instant::now();
    let mut ticks = interval(every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls = 0usize;
    let mut last_observed = None;

    let polling = async {
        loop {
            ticks.tick().await;
            polls += 1;
            match check().await {
                WaitFor::Ready(value) => return value,
                WaitFor::NotReady { last_observed: seen } => last_observed = seen,
            }
        }
    };

    let outcome = timeout_at(start + timeout, polling).await;
    match outcome {
        Ok(value) => Ok(value),
        Err(_) => Err(WaitError {
            expected: expected.to_string(),
            last_observed,
            polls,
            elapsed: start.elapsed(),
        }),
    }
}
