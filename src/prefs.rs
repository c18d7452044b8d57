//! Vehicle charging preferences: normalization and pending/confirmed tracking.
//!
//! The remote service accepts a target state-of-charge between 50% and 100% in
//! 5% steps and a ready time from a fixed half-hour grid. Requested values are
//! normalized here before submission; the tracker keeps the user's pending
//! selection separate from the value the remote record last confirmed.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Ready times the remote service accepts.
pub const READY_TIME_OPTIONS: [&str; 15] = [
    "04:00", "04:30", "05:00", "05:30", "06:00", "06:30", "07:00", "07:30", "08:00", "08:30",
    "09:00", "09:30", "10:00", "10:30", "11:00",
];

pub const DEFAULT_TARGET_SOC: u8 = 80;
pub const DEFAULT_READY_TIME: &str = "08:00";

pub const MIN_TARGET_SOC: u8 = 50;
pub const MAX_TARGET_SOC: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargePreferences {
    pub target_soc: u8,
    pub ready_time: String,
}

impl Default for ChargePreferences {
    fn default() -> Self {
        Self {
            target_soc: DEFAULT_TARGET_SOC,
            ready_time: DEFAULT_READY_TIME.to_string(),
        }
    }
}

impl ChargePreferences {
    /// Normalize a requested preference pair: clamp the SoC to 50..=100, round
    /// it to the nearest 5%, and fall back to the default ready time (with a
    /// warning) when the requested time is not on the grid.
    pub fn normalized(target_soc: i64, ready_time: &str) -> Self {
        let clamped = target_soc.clamp(i64::from(MIN_TARGET_SOC), i64::from(MAX_TARGET_SOC));
        let rounded = ((clamped + 2) / 5) * 5;

        let time = if READY_TIME_OPTIONS.contains(&ready_time) {
            ready_time.to_string()
        } else {
            warn!(
                "invalid ready time '{}' requested, defaulting to {}",
                ready_time, DEFAULT_READY_TIME
            );
            DEFAULT_READY_TIME.to_string()
        };

        Self {
            target_soc: rounded as u8,
            ready_time: time,
        }
    }

    pub fn display(&self) -> String {
        format!("{}% @ {}", self.target_soc, self.ready_time)
    }
}

/// Pending (user intent) vs confirmed (remote record) preference state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceTracker {
    pending: ChargePreferences,
    confirmed: ChargePreferences,
}

impl PreferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &ChargePreferences {
        &self.pending
    }

    pub fn confirmed(&self) -> &ChargePreferences {
        &self.confirmed
    }

    /// User changed a control; only the pending side moves.
    pub fn set_pending(&mut self, prefs: ChargePreferences) {
        self.pending = prefs;
    }

    /// A data refresh reported the remote record. Outside of confirmation
    /// checks the pending side is synced to match, so stale selections do not
    /// linger; while a change is being confirmed the pending side is left
    /// alone.
    pub fn record_confirmed(&mut self, prefs: ChargePreferences, validating: bool) {
        self.confirmed = prefs;
        if !validating {
            self.pending = self.confirmed.clone();
        }
    }

    /// Confirmation predicate for a submitted change.
    pub fn matches(&self, expected: &ChargePreferences) -> bool {
        self.confirmed == *expected
    }
}
