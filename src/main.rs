//! FARERADAR: flight-deal price monitor
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the Amadeus client, stores and notifier into the scan runner,
//! starts the dashboard, and runs the auto-scan and sniper schedules
//! until Ctrl+C.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use fareradar::config;
use fareradar::dashboard::{self, DashboardState};
use fareradar::logging::LogBuffer;
use fareradar::engine::{
    FlightRunner, PriceScanner, RunControl, RunRequest, RunnerSettings, ScanConfig, Sniper,
};
use fareradar::notify::{Notifier, TelegramNotifier};
use fareradar::providers::amadeus::AmadeusClient;
use fareradar::providers::PriceLookup;
use fareradar::storage::{AlertStore, JsonlOfferStore};

const BANNER: &str = r#"
 ___  _    ___  ___  ___    _    ___    _    ___
| __|/_\  | _ \| __|| _ \  /_\  |   \  /_\  | _ \
| _|/ _ \ |   /| _| |   / / _ \ | |) |/ _ \ |   /
|_|/_/ \_\|_|_\|___||_|_\/_/ \_\|___//_/ \_\|_|_\

  Flight deal monitor | baseline-aware price scanning
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    let logs = LogBuffer::default();
    init_logging(&logs);

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        origin = %cfg.agent.default_origin,
        currency = %cfg.agent.currency,
        scan_interval_secs = cfg.scan.interval_secs,
        sniper_enabled = cfg.sniper.enabled,
        "FARERADAR starting up"
    );

    // -- Initialise components -------------------------------------------

    let amadeus = AmadeusClient::from_config(&cfg.amadeus, &cfg.agent.currency)?;
    if let Err(e) = amadeus.check_auth().await {
        warn!(error = %e, "Amadeus authentication failed at startup, will retry per lookup");
    }
    let lookup: Arc<dyn PriceLookup> = Arc::new(amadeus);
    info!(provider = lookup.name(), "Fare provider ready");

    let offers = Arc::new(JsonlOfferStore::new(cfg.storage.offers_path()));
    let alerts = Arc::new(AlertStore::new(cfg.storage.alerts_path(), &cfg.agent.default_origin));

    let notifier: Option<Arc<dyn Notifier>> = TelegramNotifier::from_config(&cfg.alerts)
        .map(|n| Arc::new(n) as Arc<dyn Notifier>);
    if let Some(n) = &notifier {
        info!(channel = n.name(), notify_offers = cfg.alerts.notify_offers, "Notifications enabled");
    }

    let scanner = PriceScanner::new(
        lookup.clone(),
        offers.clone(),
        ScanConfig {
            pacing: cfg.scan.pacing(),
            max_concurrent_destinations: cfg.scan.max_concurrent_destinations,
        },
    );

    let control = Arc::new(RunControl::new());
    let runner = Arc::new(FlightRunner::new(
        scanner,
        control.clone(),
        RunnerSettings {
            targets_path: cfg.storage.targets_path(),
            default_origin: cfg.agent.default_origin.clone(),
            grid: cfg.scan.grid.clone(),
            notify_offers: cfg.alerts.notify_offers,
        },
        notifier.clone(),
    ));

    let sniper = Arc::new(Sniper::new(
        lookup.clone(),
        alerts.clone(),
        notifier.clone(),
        cfg.scan.pacing(),
    ));

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(
            &cfg.agent.name,
            runner.clone(),
            lookup.clone(),
            offers.clone(),
            alerts.clone(),
            logs.clone(),
        ));
        dashboard::spawn_dashboard(state, cfg.dashboard.port);
    }

    // -- Main loop -------------------------------------------------------

    let scan_interval = cfg.scan.interval();
    let sniper_interval = Duration::from_secs(cfg.sniper.interval_secs.max(1));
    let sniper_delay = Duration::from_secs(cfg.sniper.initial_delay_secs);

    let mut auto_tick = tokio::time::interval(scan_interval);
    let mut sniper_tick =
        tokio::time::interval_at(tokio::time::Instant::now() + sniper_delay, sniper_interval);
    if cfg.sniper.enabled {
        control.schedule_sniper(Utc::now() + to_chrono(sniper_delay)).await;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.scan.interval_secs,
        sniper_interval_secs = cfg.sniper.interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = auto_tick.tick() => {
                control.schedule_auto(Utc::now() + to_chrono(scan_interval)).await;

                if control.is_paused() {
                    info!("Scheduler paused, skipping auto run");
                    continue;
                }

                match control.try_begin() {
                    Ok(ticket) => {
                        let runner = runner.clone();
                        let today = chrono::Local::now().date_naive();
                        // Runs in the background so the sniper and shutdown stay responsive
                        tokio::spawn(async move {
                            if let Err(e) = runner.run(ticket, RunRequest::Auto, today).await {
                                error!(error = %e, "Auto run failed, continuing to next");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Skipping scheduled auto run"),
                }
            }
            _ = sniper_tick.tick(), if cfg.sniper.enabled => {
                control.schedule_sniper(Utc::now() + to_chrono(sniper_interval)).await;

                if control.is_paused() {
                    info!("Scheduler paused, skipping sniper pass");
                    continue;
                }

                match control.try_begin_sniper() {
                    Some(pass) => {
                        let sniper = sniper.clone();
                        let control = control.clone();
                        tokio::spawn(async move {
                            match sniper.run().await {
                                Ok(report) => control.record_sniper(report).await,
                                Err(e) => error!(error = %e, "Sniper pass failed"),
                            }
                            drop(pass);
                        });
                    }
                    None => warn!("Previous sniper pass still running, skipping"),
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    if control.is_running() || control.is_sniping() {
        info!("Waiting for the current run to finish");
        while control.is_running() || control.is_sniping() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    info!(
        runs = control.runs_started(),
        offers = offers.count().unwrap_or(0),
        "FARERADAR shut down cleanly."
    );

    Ok(())
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Initialise the `tracing` subscriber. Every event also lands in `logs`
/// for the dashboard.
fn init_logging(logs: &LogBuffer) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fareradar=info"));

    let json_logging = std::env::var("FARERADAR_LOG_JSON").is_ok();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(logs.layer());

    if json_logging {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
