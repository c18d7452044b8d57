//! Charging slot windows and the active-window evaluator.
//!
//! A slot is a half-open interval `[start, end)`: a window whose `start`
//! equals "now" is active, a window whose `end` equals "now" is not. Upstream
//! data is not guaranteed to be sorted or non-overlapping; the evaluator takes
//! the first match in input order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Source tag used when upstream data carries none.
pub const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Error, PartialEq)]
pub enum SlotWindowError {
    #[error("slot window must end after it starts (start {start}, end {end})")]
    EmptyInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// One scheduled charging interval with its planned energy delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub energy_delta_kwh: f64,
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    UNKNOWN_SOURCE.to_string()
}

impl SlotWindow {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        energy_delta_kwh: f64,
        source: impl Into<String>,
    ) -> Result<Self, SlotWindowError> {
        if start >= end {
            return Err(SlotWindowError::EmptyInterval { start, end });
        }
        Ok(Self {
            start,
            end,
            energy_delta_kwh,
            source: source.into(),
        })
    }

    /// Half-open containment: start-inclusive, end-exclusive.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }
}

/// Result of evaluating the cached windows at an instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    /// First window (input order) containing `now`, if any.
    pub active: Option<SlotWindow>,
    /// First window (input order) starting strictly after `now`. Informational
    /// only; the scheduler never arms a timer from it.
    pub next: Option<SlotWindow>,
}

impl Evaluation {
    pub fn is_charging(&self) -> bool {
        self.active.is_some()
    }
}

/// Pure evaluation of the window set at `now`. An empty set is "not active".
pub fn evaluate(windows: &[SlotWindow], now: DateTime<Utc>) -> Evaluation {
    let active = windows.iter().find(|w| w.contains(now)).cloned();
    let next = windows.iter().find(|w| w.start > now).cloned();
    Evaluation { active, next }
}

/// Aggregate view of the active-and-future windows, published as a retained
/// status snapshot on every data refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSummary {
    pub next_start: Option<DateTime<Utc>>,
    pub next_energy_kwh: f64,
    pub next_source: String,
    pub total_energy_kwh: f64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub slot_count: usize,
}

/// Summarize the windows still relevant at `now` (those with `end > now`).
/// Total energy is rounded to two decimal places.
pub fn summarize(windows: &[SlotWindow], now: DateTime<Utc>) -> SlotSummary {
    let live: Vec<&SlotWindow> = windows.iter().filter(|w| w.end > now).collect();
    let total: f64 = live.iter().map(|w| w.energy_delta_kwh).sum();
    let next = live.first();

    SlotSummary {
        next_start: next.map(|w| w.start),
        next_energy_kwh: next.map(|w| w.energy_delta_kwh).unwrap_or(0.0),
        next_source: next
            .map(|w| w.source.clone())
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        total_energy_kwh: (total * 100.0).round() / 100.0,
        window_start: live.first().map(|w| w.start),
        window_end: live.last().map(|w| w.end),
        slot_count: live.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 29, h, m, s).unwrap()
    }

    fn slot(start: DateTime<Utc>, end: DateTime<Utc>, kwh: f64) -> SlotWindow {
        SlotWindow::new(start, end, kwh, "smart-charge").unwrap()
    }

    #[test]
    fn test_new_rejects_empty_interval() {
        let at = ts(10, 0, 0);
        assert!(matches!(
            SlotWindow::new(at, at, -5.0, "smart-charge"),
            Err(SlotWindowError::EmptyInterval { .. })
        ));
        assert!(SlotWindow::new(ts(10, 30, 0), at, -5.0, "smart-charge").is_err());
    }

    #[test]
    fn test_half_open_boundaries() {
        // [10:00, 10:30) is active at 10:00:00 and 10:29:59,
        // inactive at 09:59:59 and 10:30:00.
        let w = slot(ts(10, 0, 0), ts(10, 30, 0), -5.0);
        assert!(w.contains(ts(10, 0, 0)));
        assert!(w.contains(ts(10, 29, 59)));
        assert!(!w.contains(ts(9, 59, 59)));
        assert!(!w.contains(ts(10, 30, 0)));
    }

    #[test]
    fn test_evaluate_empty_set_not_active() {
        let eval = evaluate(&[], ts(12, 0, 0));
        assert!(eval.active.is_none());
        assert!(eval.next.is_none());
        assert!(!eval.is_charging());
    }

    #[test]
    fn test_evaluate_finds_active_and_next() {
        let windows = vec![
            slot(ts(1, 30, 0), ts(5, 30, 0), -15.5),
            slot(ts(23, 30, 0), ts(23, 59, 0), -18.2),
        ];

        let eval = evaluate(&windows, ts(2, 0, 0));
        assert_eq!(eval.active.as_ref().map(|w| w.start), Some(ts(1, 30, 0)));
        assert_eq!(eval.next.as_ref().map(|w| w.start), Some(ts(23, 30, 0)));
    }

    #[test]
    fn test_evaluate_between_slots() {
        let windows = vec![
            slot(ts(2, 0, 0), ts(2, 30, 0), -3.0),
            slot(ts(3, 0, 0), ts(3, 30, 0), -3.0),
        ];

        let eval = evaluate(&windows, ts(2, 45, 0));
        assert!(eval.active.is_none());
        assert_eq!(eval.next.as_ref().map(|w| w.start), Some(ts(3, 0, 0)));
    }

    #[test]
    fn test_evaluate_first_input_order_match_wins_on_overlap() {
        // Overlap is tolerated; first match by input order, not start time.
        let second = slot(ts(1, 0, 0), ts(4, 0, 0), -2.0);
        let first = slot(ts(2, 0, 0), ts(3, 0, 0), -1.0);
        let windows = vec![first.clone(), second];

        let eval = evaluate(&windows, ts(2, 30, 0));
        assert_eq!(eval.active, Some(first));
    }

    #[test]
    fn test_evaluate_slot_just_ended() {
        let windows = vec![slot(ts(1, 30, 0), ts(5, 30, 0), -15.5)];
        let eval = evaluate(&windows, ts(5, 30, 5));
        assert!(eval.active.is_none());
        assert!(eval.next.is_none());
    }

    #[test]
    fn test_summarize_filters_past_slots() {
        let windows = vec![
            slot(ts(1, 30, 0), ts(5, 30, 0), -12.0), // past at 08:00
            slot(ts(21, 30, 0), ts(22, 0, 0), 0.0),
            slot(ts(23, 0, 0), ts(23, 59, 0), -12.0),
        ];

        let summary = summarize(&windows, ts(8, 0, 0));
        assert_eq!(summary.slot_count, 2);
        assert_eq!(summary.next_start, Some(ts(21, 30, 0)));
        assert_eq!(summary.window_start, Some(ts(21, 30, 0)));
        assert_eq!(summary.window_end, Some(ts(23, 59, 0)));
    }

    #[test]
    fn test_summarize_total_energy_rounded() {
        let windows = vec![
            slot(ts(10, 0, 0), ts(11, 0, 0), -10.5),
            slot(ts(12, 0, 0), ts(13, 0, 0), -15.2),
            slot(ts(14, 0, 0), ts(15, 0, 0), -8.3),
        ];

        let summary = summarize(&windows, ts(9, 0, 0));
        assert_eq!(summary.total_energy_kwh, -34.0);
        assert_eq!(summary.next_energy_kwh, -10.5);
        assert_eq!(summary.next_source, "smart-charge");
    }

    #[test]
    fn test_summarize_empty() {
        let summary = summarize(&[], ts(9, 0, 0));
        assert_eq!(summary.slot_count, 0);
        assert_eq!(summary.total_energy_kwh, 0.0);
        assert_eq!(summary.next_start, None);
        assert_eq!(summary.next_source, UNKNOWN_SOURCE);
    }

    #[test]
    fn test_slot_window_json_defaults() {
        let w: SlotWindow = serde_json::from_str(
            r#"{"start":"2025-11-29T01:30:00Z","end":"2025-11-29T05:30:00Z"}"#,
        )
        .unwrap();
        assert_eq!(w.energy_delta_kwh, 0.0);
        assert_eq!(w.source, UNKNOWN_SOURCE);
    }
}
