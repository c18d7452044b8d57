//! Top-level service wiring.
//!
//! `ChargeWatchService` owns the cached slot windows, the charging state
//! machine, the one-shot transition scheduler, the periodic reconciliation
//! loop, the preference confirmation coordinator and the manual-refresh
//! cooldown gate, and keeps them consistent: every data refresh re-evaluates
//! unconditionally and re-arms the end-of-window timer, and the
//! reconciliation loop independently corrects any divergence the timers miss.

use anyhow::Result;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error};

use crate::clock::Clock;
use crate::cooldown::{CooldownDecision, CooldownGate};
use crate::prefs::{ChargePreferences, PreferenceTracker};
use crate::reconcile::{reconcile_tick, ReconciliationLoop};
use crate::retry::{BackoffRetryCoordinator, CheckOutcome};
use crate::scheduler::TransitionScheduler;
use crate::slots::{self, SlotWindow};
use crate::state::{ChargingStateMachine, StatePublisher, StateUpdate};

/// State shared between the service, the transition timer and the
/// reconciliation loop. Guarded by a plain mutex; the lock is never held
/// across an await.
struct Inner {
    windows: Vec<SlotWindow>,
    machine: ChargingStateMachine,
    scheduler: TransitionScheduler,
    prefs: PreferenceTracker,
}

pub struct ChargeWatchService {
    inner: Arc<Mutex<Inner>>,
    publisher: Arc<dyn StatePublisher>,
    clock: Arc<dyn Clock>,
    reconcile: ReconciliationLoop,
    retry: BackoffRetryCoordinator,
    cooldown: CooldownGate,
}

impl ChargeWatchService {
    pub fn new(
        publisher: Arc<dyn StatePublisher>,
        clock: Arc<dyn Clock>,
        cooldown_duration: Duration,
    ) -> Result<Self> {
        let inner = Inner {
            windows: Vec::new(),
            machine: ChargingStateMachine::new(Arc::clone(&publisher)),
            scheduler: TransitionScheduler::new(),
            prefs: PreferenceTracker::new(),
        };
        let cooldown = CooldownGate::new(cooldown_duration, Arc::clone(&publisher))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            publisher,
            clock,
            reconcile: ReconciliationLoop::new(),
            retry: BackoffRetryCoordinator::new(),
            cooldown,
        })
    }

    pub fn is_charging(&self) -> bool {
        lock(&self.inner).machine.is_charging()
    }

    pub fn pending_preferences(&self) -> ChargePreferences {
        lock(&self.inner).prefs.pending().clone()
    }

    pub fn confirmed_preferences(&self) -> ChargePreferences {
        lock(&self.inner).prefs.confirmed().clone()
    }

    /// Replace the cached windows with a fresh set, re-evaluate immediately
    /// and publish a retained status snapshot. Evaluation happens on every
    /// refresh, no matter what triggered it.
    pub fn refresh_windows(&mut self, windows: Vec<SlotWindow>) {
        let now = self.clock.now();
        {
            let mut inner = lock(&self.inner);
            debug!("refreshed slot data: {} windows", windows.len());
            inner.windows = windows;
        }
        reevaluate(&self.inner, &self.clock);

        let inner = lock(&self.inner);
        let snapshot = StateUpdate::Snapshot {
            summary: slots::summarize(&inner.windows, now),
            pending: inner.prefs.pending().clone(),
            confirmed: inner.prefs.confirmed().clone(),
        };
        if let Err(e) = self.publisher.publish(&snapshot, true) {
            error!("failed to publish status snapshot: {:#}", e);
        }
    }

    /// Start the periodic safety net. Each tick re-derives the desired state
    /// from the cached windows and corrects any divergence.
    pub fn start_reconciliation(&mut self, period: Duration) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        self.reconcile.start(period, move || {
            let now = clock.now();
            let mut inner = lock(&inner);
            let Inner {
                windows, machine, ..
            } = &mut *inner;
            reconcile_tick(windows, machine, now);
        })
    }

    pub fn stop_reconciliation(&mut self) {
        self.reconcile.stop();
    }

    /// Record a locally requested preference change (already normalized by
    /// the caller via [`ChargePreferences::normalized`]) and start a bounded
    /// confirmation session against `check`.
    pub fn submit_preference_change<F, Fut>(
        &mut self,
        requested: ChargePreferences,
        schedule: Vec<Duration>,
        check: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = CheckOutcome> + Send,
    {
        lock(&self.inner).prefs.set_pending(requested.clone());
        self.retry.submit(requested.display(), schedule, check)
    }

    /// Record preferences as reported by the upstream account data.
    pub fn record_confirmed_preferences(&mut self, prefs: ChargePreferences, validating: bool) {
        lock(&self.inner).prefs.record_confirmed(prefs, validating);
    }

    pub fn confirmation_active(&self) -> bool {
        self.retry.is_active()
    }

    /// Gate a manual refresh request against the cooldown. The caller only
    /// performs the refresh when the decision is permitted.
    pub fn try_manual_refresh(&mut self) -> CooldownDecision {
        self.cooldown.try_acquire(self.clock.now())
    }

    /// Cancel every timer and background task. Idempotent.
    pub fn shutdown(&mut self) {
        self.reconcile.stop();
        self.retry.cancel();
        self.cooldown.cancel_expiry();
        lock(&self.inner).scheduler.cancel();
    }
}

impl Drop for ChargeWatchService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(inner: &Arc<Mutex<Inner>>) -> std::sync::MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Evaluate the cached windows at the current time, apply the result to the
/// state machine and re-arm the end-of-window timer. The timer callback runs
/// this again, so each fired transition immediately schedules the next one.
fn reevaluate(inner: &Arc<Mutex<Inner>>, clock: &Arc<dyn Clock>) {
    let now = clock.now();
    let mut guard = lock(inner);
    let eval = slots::evaluate(&guard.windows, now);
    guard.machine.apply(&eval);

    let next_inner = Arc::clone(inner);
    let next_clock = Arc::clone(clock);
    guard.scheduler.rearm(&eval, now, move || {
        reevaluate(&next_inner, &next_clock);
    });
}
