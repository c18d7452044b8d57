//! Manual-refresh cooldown gate.
//!
//! Enforces a minimum elapsed time between permitted manual refreshes. A
//! successful acquisition records the trigger time and publishes the absolute
//! instant the next refresh becomes available; a companion one-shot clears
//! that instant (publishes `None`) exactly at expiry, so consumers never see a
//! stale countdown or a past timestamp. Blocked attempts touch nothing.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::state::{StatePublisher, StateUpdate};

/// Default minimum interval between manual refreshes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Result of asking the gate for permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownDecision {
    pub permitted: bool,
    /// When the next refresh becomes available; `None` when permitted.
    pub available_at: Option<DateTime<Utc>>,
    /// Whole seconds until available, rounded up, clamped at zero.
    pub seconds_remaining: u64,
}

pub struct CooldownGate {
    duration: Duration,
    /// `None` means no prior trigger: the very first action is permitted.
    last_triggered: Option<DateTime<Utc>>,
    publisher: Arc<dyn StatePublisher>,
    expiry: Option<(CancellationToken, JoinHandle<()>)>,
}

impl CooldownGate {
    pub fn new(duration: Duration, publisher: Arc<dyn StatePublisher>) -> Result<Self> {
        if duration.is_zero() {
            bail!("cooldown duration must be greater than zero");
        }
        Ok(Self {
            duration,
            last_triggered: None,
            publisher,
            expiry: None,
        })
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.duration.as_millis() as i64)
    }

    /// Whole seconds left in the cooldown at `now`, rounded up, never
    /// negative.
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> u64 {
        let Some(last) = self.last_triggered else {
            return 0;
        };
        let remaining_ms = (last + self.window() - now).num_milliseconds().max(0) as u64;
        remaining_ms.div_ceil(1000)
    }

    /// Ask for permission at `now`. Acquisition and recording are one step:
    /// when permitted, `last_triggered` moves to `now` within this call and
    /// the cooldown-start update is published (retained). When blocked, the
    /// gate is left untouched and the decision carries the countdown.
    pub fn try_acquire(&mut self, now: DateTime<Utc>) -> CooldownDecision {
        if let Some(last) = self.last_triggered {
            if now - last < self.window() {
                let seconds_remaining = self.seconds_remaining(now);
                warn!(
                    "manual refresh blocked; next refresh available in {}s",
                    seconds_remaining
                );
                return CooldownDecision {
                    permitted: false,
                    available_at: Some(last + self.window()),
                    seconds_remaining,
                };
            }
        }

        self.last_triggered = Some(now);
        let available_at = now + self.window();
        debug!("manual refresh permitted; cooldown until {}", available_at);

        if let Err(e) = self.publisher.publish(
            &StateUpdate::RefreshCooldown {
                available_at: Some(available_at),
            },
            true,
        ) {
            error!("failed to publish cooldown start: {:#}", e);
        }

        self.arm_expiry();

        CooldownDecision {
            permitted: true,
            available_at: None,
            seconds_remaining: 0,
        }
    }

    /// Cancel-then-replace the expiry one-shot. At expiry it publishes an
    /// explicit "no active cooldown" (`available_at = None`), never a
    /// computed-but-past timestamp.
    fn arm_expiry(&mut self) {
        self.cancel_expiry();

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let publisher = Arc::clone(&self.publisher);
        let wait = self.duration;
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = publisher.publish(
                        &StateUpdate::RefreshCooldown { available_at: None },
                        true,
                    ) {
                        error!("failed to publish cooldown expiry: {:#}", e);
                    }
                }
            }
        });
        self.expiry = Some((cancel, task));
    }

    /// Cancel a pending expiry timer, e.g. on shutdown.
    pub fn cancel_expiry(&mut self) {
        if let Some((cancel, _)) = self.expiry.take() {
            cancel.cancel();
        }
    }
}

impl Drop for CooldownGate {
    fn drop(&mut self) {
        self.cancel_expiry();
    }
}
