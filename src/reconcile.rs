//! Periodic state reconciliation.
//!
//! A fixed-interval safety net that re-derives the charging boolean from the
//! cached windows and corrects the state machine whenever they disagree. It is
//! deliberately independent of the one-shot transition scheduler: a missed,
//! suppressed, or never-armed timer is repaired within one tick period. Ticks
//! run unconditionally whenever cached windows exist, so no caller-side mode
//! flag can bypass state evaluation.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::slots::{evaluate, SlotWindow};
use crate::state::ChargingStateMachine;

/// What a single reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No cached windows; nothing to reconcile against.
    NoWindows,
    /// State already matched reality.
    Unchanged,
    /// State disagreed with the cached windows and was corrected.
    Corrected { from: bool, to: bool },
}

/// One reconciliation pass. The warning is emitted before the publish so a
/// self-correction is distinguishable from a data refresh in the logs.
pub fn reconcile_tick(
    windows: &[SlotWindow],
    machine: &mut ChargingStateMachine,
    now: DateTime<Utc>,
) -> TickOutcome {
    if windows.is_empty() {
        return TickOutcome::NoWindows;
    }

    let eval = evaluate(windows, now);
    let desired = eval.is_charging();
    let current = machine.is_charging();
    if desired == current {
        return TickOutcome::Unchanged;
    }

    warn!(
        "state reconciliation: correcting charging from {} to {}",
        current, desired
    );
    machine.apply(&eval);
    TickOutcome::Corrected {
        from: current,
        to: desired,
    }
}

/// Owns the periodic tick task. Starting while running replaces the previous
/// loop; nothing a tick does can propagate an error out of the task.
#[derive(Debug, Default)]
pub struct ReconciliationLoop {
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl ReconciliationLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start ticking every `period`, invoking `tick` on each beat. The first
    /// beat happens one full period after the call.
    pub fn start<F>(&mut self, period: Duration, mut tick: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        if period.is_zero() {
            bail!("reconciliation period must be greater than zero");
        }

        self.stop();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval's first tick completes immediately; consume it so the
            // loop beats every `period` after start.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => tick(),
                }
            }
        });

        self.running = Some((cancel, task));
        info!("state reconciliation loop started (every {:?})", period);
        Ok(())
    }

    /// Stop the loop. Safe to call when not running.
    pub fn stop(&mut self) {
        if let Some((cancel, _)) = self.running.take() {
            cancel.cancel();
            info!("state reconciliation loop stopped");
        }
    }
}

impl Drop for ReconciliationLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
