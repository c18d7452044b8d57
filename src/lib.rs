//! ChargeWatch library - smart-charge slot monitoring
//!
//! This module exports internal components for integration testing.

pub mod cli;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod prefs;
pub mod reconcile;
pub mod retry;
pub mod scheduler;
pub mod service;
pub mod slots;
pub mod state;
