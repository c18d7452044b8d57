//! Bounded-backoff confirmation retries.
//!
//! After a preference change is submitted, the remote record does not reflect
//! it immediately. The coordinator re-checks on an increasing schedule
//! (15s, 30s, 60s, 120s by default) until the check confirms, or the schedule
//! runs out and the ambient periodic refresh takes over. A transient check
//! error is treated exactly like "not confirmed yet": the schedule advances
//! instead of the session aborting.

use anyhow::{bail, Result};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default confirmation schedule.
pub const DEFAULT_SCHEDULE_SECS: [u64; 4] = [15, 30, 60, 120];

/// Tri-state confirmation check result. Errors are data, not control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The remote record matches the expected value; the session is done.
    Confirmed,
    /// The remote record has not caught up yet; try again later.
    NotYet,
    /// The check itself failed (fetch error etc.); try again later.
    TransientError,
}

struct RetrySession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives one confirmation session per logical target. Submitting a new
/// session cancels every pending timer of the previous one.
#[derive(Default)]
pub struct BackoffRetryCoordinator {
    session: Option<RetrySession>,
}

impl BackoffRetryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a session still has attempts pending.
    pub fn is_active(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| !s.task.is_finished())
            .unwrap_or(false)
    }

    /// Start a confirmation session for `expected`. At index `i` the session
    /// waits `schedule[i]`, then runs `check`; `Confirmed` ends the session,
    /// anything else advances the schedule. A malformed (empty) schedule
    /// fails fast before any timer is armed.
    pub fn submit<F, Fut>(
        &mut self,
        expected: impl Into<String>,
        schedule: Vec<Duration>,
        mut check: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = CheckOutcome> + Send,
    {
        if schedule.is_empty() {
            bail!("retry schedule must contain at least one interval");
        }

        self.cancel();

        let expected = expected.into();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let total = schedule.len();
            for (index, wait) in schedule.into_iter().enumerate() {
                let attempt = index + 1;
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }

                let outcome = tokio::select! {
                    _ = token.cancelled() => return,
                    outcome = check() => outcome,
                };

                match outcome {
                    CheckOutcome::Confirmed => {
                        info!(
                            "change confirmed: {} (attempt {}/{})",
                            expected, attempt, total
                        );
                        return;
                    }
                    CheckOutcome::NotYet => {
                        debug!(
                            "change not confirmed yet: {} (attempt {}/{})",
                            expected, attempt, total
                        );
                    }
                    CheckOutcome::TransientError => {
                        warn!(
                            "confirmation check {}/{} failed for {}; continuing",
                            attempt, total, expected
                        );
                    }
                }
            }
            warn!(
                "confirmation attempts exhausted for {}; waiting for periodic refresh",
                expected
            );
        });

        self.session = Some(RetrySession { cancel, task });
        Ok(())
    }

    /// Cancel the current session and all of its pending timers.
    pub fn cancel(&mut self) {
        if let Some(session) = self.session.take() {
            session.cancel.cancel();
        }
    }
}

impl Drop for BackoffRetryCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Convenience: the default schedule as durations.
pub fn default_schedule() -> Vec<Duration> {
    DEFAULT_SCHEDULE_SECS
        .iter()
        .map(|s| Duration::from_secs(*s))
        .collect()
}
