mod cli;
mod clock;
mod config;
mod cooldown;
mod prefs;
mod reconcile;
mod retry;
mod scheduler;
mod service;
mod slots;
mod state;

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use clock::SystemClock;
use config::Config;
use service::ChargeWatchService;
use slots::SlotWindow;
use state::{StatePublisher, StateUpdate};

/// Publishes state updates as JSON lines on stdout, one object per update.
/// A downstream process (MQTT bridge, dashboard feeder) consumes the stream.
struct JsonLinePublisher;

impl StatePublisher for JsonLinePublisher {
    fn publish(&self, update: &StateUpdate, retain: bool) -> Result<()> {
        let line = serde_json::to_string(&serde_json::json!({
            "retain": retain,
            "update": update,
        }))
        .context("failed to encode state update")?;
        println!("{}", line);
        Ok(())
    }
}

/// Load and validate slot windows from a JSON file.
fn load_slots(path: &str) -> Result<Vec<SlotWindow>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read slot data from '{}'", path))?;
    let windows: Vec<SlotWindow> =
        serde_json::from_str(&raw).with_context(|| format!("invalid slot data in '{}'", path))?;

    for (i, w) in windows.iter().enumerate() {
        if w.end <= w.start {
            bail!(
                "slot {} in '{}' is empty or inverted (start {}, end {})",
                i,
                path,
                w.start,
                w.end
            );
        }
    }
    Ok(windows)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    if args.help {
        cli::print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chargewatch=info".parse()?),
        )
        .init();

    info!("ChargeWatch Slot Monitor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Account: {}", config.account);
    info!("  Refresh interval: {}m", config.refresh_interval_mins);
    info!(
        "  Reconcile period: {}s",
        config.reconcile_period.as_secs()
    );

    let slots_path = args.slots.or_else(|| config.slots_file.clone());

    // Handle --validate mode
    if args.validate {
        info!("Validating configuration...");
        if let Err(e) = config.validate() {
            error!("{}", e);
            std::process::exit(1);
        }
        if let Some(path) = &slots_path {
            let windows = load_slots(path)?;
            info!("Slot data is valid: {} windows in {}", windows.len(), path);
        }
        info!("Configuration is valid");
        return Ok(());
    }

    let publisher: Arc<dyn StatePublisher> = Arc::new(JsonLinePublisher);
    let mut service = ChargeWatchService::new(
        publisher,
        Arc::new(SystemClock),
        config.manual_refresh_cooldown,
    )?;

    // Initial load; a missing source is tolerated, reconciliation still runs
    // against an empty cache until data shows up.
    match &slots_path {
        Some(path) => match load_slots(path) {
            Ok(windows) => service.refresh_windows(windows),
            Err(e) => {
                error!("initial slot load failed: {:#}", e);
                service.refresh_windows(Vec::new());
            }
        },
        None => {
            warn!("no slot data source configured (SLOTS_FILE or --slots); starting empty");
            service.refresh_windows(Vec::new());
        }
    }

    if args.once {
        info!(
            "Single evaluation (--once mode): charging = {}",
            service.is_charging()
        );
        service.shutdown();
        return Ok(());
    }

    service.start_reconciliation(config.reconcile_period)?;

    let mut refresh = tokio::time::interval(Duration::from_secs(
        config.refresh_interval_mins * 60,
    ));
    refresh.tick().await; // first tick is immediate; the initial load covered it

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            _ = refresh.tick() => {
                let Some(path) = &slots_path else { continue };
                match load_slots(path) {
                    Ok(windows) => service.refresh_windows(windows),
                    // Keep the previous cache; the next tick retries.
                    Err(e) => error!("slot refresh failed: {:#}", e),
                }
            }
        }
    }

    service.shutdown();
    Ok(())
}
