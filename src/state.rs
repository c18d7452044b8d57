//! Charging state machine and the outbound publisher seam.
//!
//! The machine owns the single `is_charging` boolean. It changes only through
//! `apply`, and every real transition pushes exactly one retained update to
//! the publisher. Re-applying an identical evaluation is a no-op, so callers
//! (scheduler firings, reconciliation ticks, data refreshes) can race freely.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::prefs::ChargePreferences;
use crate::slots::{Evaluation, SlotSummary};

/// Outbound state sink (message bus, test recorder, stdout...). `retain`
/// asks the sink to keep the value for late-joining consumers.
pub trait StatePublisher: Send + Sync {
    fn publish(&self, update: &StateUpdate, retain: bool) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateUpdate {
    /// The charging boolean flipped.
    Charging { on: bool },
    /// Manual-refresh cooldown started (`Some(expiry)`) or cleared (`None`).
    RefreshCooldown {
        available_at: Option<DateTime<Utc>>,
    },
    /// Full status snapshot after a data refresh.
    Snapshot {
        summary: SlotSummary,
        pending: ChargePreferences,
        confirmed: ChargePreferences,
    },
}

pub struct ChargingStateMachine {
    charging: bool,
    publisher: Arc<dyn StatePublisher>,
}

impl ChargingStateMachine {
    /// Starts in the not-charging state.
    pub fn new(publisher: Arc<dyn StatePublisher>) -> Self {
        Self {
            charging: false,
            publisher,
        }
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    /// Apply an evaluation result. Returns true when the state actually
    /// changed. A failed publish is logged and does not roll back the
    /// in-memory transition; the next transition or reconciliation tick
    /// publishes again.
    pub fn apply(&mut self, eval: &Evaluation) -> bool {
        let desired = eval.is_charging();
        if desired == self.charging {
            debug!("charging state unchanged ({})", self.charging);
            return false;
        }

        self.charging = desired;
        info!("charging state -> {}", desired);
        if let Err(e) = self
            .publisher
            .publish(&StateUpdate::Charging { on: desired }, true)
        {
            error!("failed to publish charging state: {:#}", e);
        }
        true
    }
}
