use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::prefs::READY_TIME_OPTIONS;

#[derive(Debug, Clone)]
pub struct Config {
    // Account the slot data belongs to (used in log output only)
    pub account: String,

    // How often to re-read the slot data source, in minutes
    pub refresh_interval_mins: u64,

    // Reconciliation safety-net period
    pub reconcile_period: Duration,

    // Minimum gap between manual refreshes
    pub manual_refresh_cooldown: Duration,

    // Confirmation retry schedule for preference changes
    pub retry_schedule: Vec<Duration>,

    // Path to the JSON slot data file (optional; can be given on the CLI)
    pub slots_file: Option<String>,

    // Default ready-by time for charge preferences
    pub default_ready_time: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Parse config from a custom getter function (for testing)
    pub fn from_getter<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            account: get("ACCOUNT").context("ACCOUNT not set")?,

            refresh_interval_mins: get("REFRESH_INTERVAL_MINS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("REFRESH_INTERVAL_MINS must be a whole number of minutes")?,

            reconcile_period: get("RECONCILE_PERIOD_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .map(Duration::from_secs)
                .context("RECONCILE_PERIOD_SECS must be a whole number of seconds")?,

            manual_refresh_cooldown: get("MANUAL_REFRESH_COOLDOWN_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .map(Duration::from_secs)
                .context("MANUAL_REFRESH_COOLDOWN_SECS must be a whole number of seconds")?,

            retry_schedule: Self::parse_schedule(
                &get("RETRY_SCHEDULE_SECS").unwrap_or_else(|| "15,30,60,120".to_string()),
            )?,

            slots_file: get("SLOTS_FILE").filter(|s| !s.is_empty()),

            default_ready_time: get("DEFAULT_READY_TIME").unwrap_or_else(|| "08:00".to_string()),
        })
    }

    /// Create config from a HashMap (convenience for testing)
    #[cfg(test)]
    pub fn from_map(map: &HashMap<&str, &str>) -> Result<Self> {
        Self::from_getter(|key| map.get(key).map(|v| v.to_string()))
    }

    fn parse_schedule(raw: &str) -> Result<Vec<Duration>> {
        raw.split(',')
            .map(|part| {
                part.trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| {
                        format!("RETRY_SCHEDULE_SECS entry '{}' is not a number", part.trim())
                    })
            })
            .collect()
    }

    /// Validate configuration values at startup.
    /// Returns Ok(()) if all validations pass, or Err with details of what failed.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.account.trim().is_empty() {
            errors.push("ACCOUNT cannot be empty.".to_string());
        }

        if self.refresh_interval_mins == 0 {
            errors.push("REFRESH_INTERVAL_MINS must be greater than 0.".to_string());
        }

        if self.reconcile_period.is_zero() {
            errors.push("RECONCILE_PERIOD_SECS must be greater than 0.".to_string());
        } else if self.reconcile_period > Duration::from_secs(300) {
            errors.push(format!(
                "RECONCILE_PERIOD_SECS={} defeats the safety net (max recommended: 300).",
                self.reconcile_period.as_secs()
            ));
        }

        if self.manual_refresh_cooldown.is_zero() {
            errors.push("MANUAL_REFRESH_COOLDOWN_SECS must be greater than 0.".to_string());
        }

        if self.retry_schedule.is_empty() {
            errors.push("RETRY_SCHEDULE_SECS must contain at least one interval.".to_string());
        } else if self.retry_schedule.iter().any(|d| d.is_zero()) {
            errors.push("RETRY_SCHEDULE_SECS entries must be greater than 0.".to_string());
        }

        if !READY_TIME_OPTIONS.contains(&self.default_ready_time.as_str()) {
            errors.push(format!(
                "DEFAULT_READY_TIME '{}' is not on the half-hour grid 04:00..11:00.",
                self.default_ready_time
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )
        }
    }
}
