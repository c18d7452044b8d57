//! One-shot transition scheduling.
//!
//! At most one transition timer is live at a time: when an evaluation shows an
//! active window, a one-shot fires at the window's end and forces a full
//! re-evaluation, so the charging boolean flips off at the boundary even if
//! nothing else triggers in the interim. When no window is active nothing is
//! armed here; the reconciliation loop alone detects the start of a future
//! window. Every `rearm` cancels its predecessor first.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::slots::Evaluation;

/// The only transition kind armed by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    EndOfActiveWindow,
}

/// A live one-shot timer. Cancelled when superseded, destroyed when it fires.
#[derive(Debug)]
pub struct ScheduledTransition {
    pub armed_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub kind: TransitionKind,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct TransitionScheduler {
    armed: Option<ScheduledTransition>,
}

impl TransitionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a transition timer is armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Boundary the current timer fires at, if any.
    pub fn armed_fire_at(&self) -> Option<DateTime<Utc>> {
        self.armed.as_ref().map(|t| t.fire_at)
    }

    /// Cancel and replace the armed timer according to `eval`. `on_fire` runs
    /// when the end-of-window boundary is reached and is expected to force a
    /// re-evaluation.
    pub fn rearm<F>(&mut self, eval: &Evaluation, now: DateTime<Utc>, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();

        let Some(active) = &eval.active else {
            if let Some(next) = &eval.next {
                debug!("no active window; next starts at {}", next.start);
            }
            return;
        };

        // A window whose end is already behind us fires immediately.
        let delay = (active.end - now).to_std().unwrap_or(Duration::ZERO);
        let fire_at = active.end;
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        debug!(
            "armed end-of-window timer for {} ({}s from now)",
            fire_at,
            delay.as_secs()
        );

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    debug!("end-of-window timer fired ({})", fire_at);
                    on_fire();
                }
            }
        });

        self.armed = Some(ScheduledTransition {
            armed_at: now,
            fire_at,
            kind: TransitionKind::EndOfActiveWindow,
            cancel,
            _task: task,
        });
    }

    /// Cancel any armed timer. Safe to call when nothing is armed.
    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.cancel.cancel();
        }
    }
}

impl Drop for TransitionScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::{evaluate, SlotWindow};
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 29, h, m, s).unwrap()
    }

    fn active_slot() -> Vec<SlotWindow> {
        vec![SlotWindow::new(ts(2, 0, 0), ts(3, 0, 0), -5.0, "smart-charge").unwrap()]
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_window_end() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TransitionScheduler::new();

        let now = ts(2, 30, 0);
        let counter = fired.clone();
        scheduler.rearm(&evaluate(&active_slot(), now), now, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(scheduler.is_armed());
        assert_eq!(scheduler.armed_fire_at(), Some(ts(3, 0, 0)));

        // 29 minutes in: nothing yet.
        tokio::time::sleep(Duration::from_secs(29 * 60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Past the boundary: exactly one firing.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_evaluation_arms_nothing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TransitionScheduler::new();

        let now = ts(1, 0, 0);
        let counter = fired.clone();
        scheduler.rearm(&evaluate(&active_slot(), now), now, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // 01:00 is before the 02:00 slot: future windows are the
        // reconciliation loop's job, not the scheduler's.
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(3 * 3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TransitionScheduler::new();

        let now = ts(2, 30, 0);
        let c1 = first.clone();
        scheduler.rearm(&evaluate(&active_slot(), now), now, move || {
            c1.fetch_add(1, Ordering::SeqCst);
        });

        // Fresh data arrives: rearm must cancel the first timer.
        let c2 = second.clone();
        scheduler.rearm(&evaluate(&active_slot(), now), now, move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(
            first.load(Ordering::SeqCst),
            0,
            "superseded timer must not fire"
        );
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TransitionScheduler::new();

        let now = ts(2, 30, 0);
        let counter = fired.clone();
        scheduler.rearm(&evaluate(&active_slot(), now), now, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        scheduler.cancel();
        assert!(!scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_end_fires_immediately() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut scheduler = TransitionScheduler::new();

        // Evaluation computed just before the boundary but rearmed after it:
        // the delay clamps to zero and the timer fires right away.
        let eval = evaluate(&active_slot(), ts(2, 59, 59));
        let counter = fired.clone();
        scheduler.rearm(&eval, ts(3, 1, 0), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_when_nothing_armed_is_noop() {
        let mut scheduler = TransitionScheduler::new();
        scheduler.cancel();
        scheduler.cancel();
        assert!(!scheduler.is_armed());
    }
}
