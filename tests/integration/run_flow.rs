//! Full run flow: targets file → runner → offer log, plus the sniper.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fareradar::config::GridSettings;
use fareradar::engine::{
    FlightRunner, PriceScanner, RunControl, RunRequest, RunnerSettings, ScanConfig, ScanOutcome, Sniper,
};
use fareradar::notify::Notifier;
use fareradar::storage::alerts::NewAlert;
use fareradar::storage::{AlertStore, JsonlOfferStore};
use fareradar::types::{DatePair, FlightError, ScanMode};

use crate::mock_provider::MockProvider;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct TempDir(PathBuf);

impl TempDir {
    fn new() -> Self {
        let mut p = std::env::temp_dir();
        p.push(format!("fareradar_it_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&p).unwrap();
        Self(p)
    }

    fn file(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

const TARGETS: &str = r#"
[[destination]]
destination = "LIS"
baseline = "1.000,00"

[[destination]]
destination = "MIA"
baseline = 1000

[[destination]]
destination = "MAD"
baseline = "n/a"

[airports]
FOR = "Fortaleza"
LIS = "Lisboa"
"#;

fn build(
    dir: &TempDir,
    provider: Arc<MockProvider>,
    notifier: Arc<RecordingNotifier>,
) -> (FlightRunner, Arc<JsonlOfferStore>) {
    std::fs::write(dir.file("destinations.toml"), TARGETS).unwrap();
    let offers = Arc::new(JsonlOfferStore::new(dir.file("offers.jsonl")));
    let scanner = PriceScanner::new(
        provider,
        offers.clone(),
        ScanConfig {
            pacing: Duration::ZERO,
            max_concurrent_destinations: 2,
        },
    );
    let runner = FlightRunner::new(
        scanner,
        Arc::new(RunControl::new()),
        RunnerSettings {
            targets_path: dir.file("destinations.toml"),
            default_origin: "FOR".into(),
            grid: GridSettings::default(),
            notify_offers: true,
        },
        Some(notifier),
    );
    (runner, offers)
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
}

#[tokio::test]
async fn auto_run_persists_and_notifies_offers() {
    let dir = TempDir::new();
    let provider = Arc::new(
        MockProvider::new()
            .with_prices("LIS", &[900, 950, 980, 100])
            .with_prices("MIA", &[1500, 1500, 1500]),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let (runner, offers) = build(&dir, provider.clone(), notifier.clone());

    let ticket = runner.control().try_begin().unwrap();
    let report = runner.run(ticket, RunRequest::Auto, today()).await.unwrap();

    assert_eq!(report.mode, ScanMode::Auto);
    assert_eq!(report.skipped.len(), 1, "MAD has no usable baseline");
    assert_eq!(provider.calls_for("MAD").len(), 0);
    assert_eq!(report.scans[0].outcome, ScanOutcome::AbandonedZoneConfirmed);
    assert_eq!(report.scans[1].outcome, ScanOutcome::AbandonedTooExpensive);
    assert_eq!(report.lookups(), 6);

    let stored = offers.load_recent(100).unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|o| o.destination == "LIS" && o.price <= dec!(1000)));

    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].contains("LIS - Lisboa"));

    let summary = runner.control().last_run().await.unwrap();
    assert_eq!(summary.offers, 3);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_auto_run_finishes_and_frees_the_slot() {
    let dir = TempDir::new();
    let provider = Arc::new(
        MockProvider::new()
            .with_prices("LIS", &[900, 950, 980])
            .with_prices("MIA", &[1500, 1500, 1500]),
    );
    let (runner, offers) = build(&dir, provider, Arc::new(RecordingNotifier::default()));
    let runner = Arc::new(runner);

    let ticket = runner.control().try_begin().unwrap();
    let handle = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run(ticket, RunRequest::Auto, today()).await })
    };
    let report = handle.await.unwrap().unwrap();

    assert_eq!(report.scans.len(), 2);
    assert_eq!(offers.count().unwrap(), 3);
    assert!(!runner.control().is_running());
    assert_eq!(runner.control().try_begin().unwrap().number(), 2);
}

#[tokio::test]
async fn second_run_refused_while_first_holds_ticket() {
    let dir = TempDir::new();
    let (runner, _) = build(
        &dir,
        Arc::new(MockProvider::new()),
        Arc::new(RecordingNotifier::default()),
    );

    let ticket = runner.control().try_begin().unwrap();
    assert!(matches!(runner.control().try_begin(), Err(FlightError::RunInProgress)));
    drop(ticket);
    assert!(runner.control().try_begin().is_ok());
}

#[tokio::test]
async fn manual_run_records_found_fares() {
    let dir = TempDir::new();
    let provider = Arc::new(MockProvider::new().with_prices("LIS", &[4800]));
    let (runner, offers) = build(&dir, provider, Arc::new(RecordingNotifier::default()));

    let dates = DatePair::round_trip(
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
    );
    let ticket = runner.control().try_begin().unwrap();
    let report = runner
        .run(
            ticket,
            RunRequest::Manual {
                destinations: vec!["LIS".into(), "MAD".into()],
                dates,
            },
            today(),
        )
        .await
        .unwrap();

    assert_eq!(report.lookups(), 2);
    let stored = offers.load_recent(10).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].mode, ScanMode::Manual);
    assert_eq!(stored[0].dates(), dates);
}

#[tokio::test]
async fn sniper_fires_only_on_reached_targets() {
    let dir = TempDir::new();
    let alerts = Arc::new(AlertStore::new(dir.file("alerts.json"), "FOR"));
    let depart = NaiveDate::from_ymd_opt(2026, 12, 20).unwrap();
    for (dest, target) in [("MIA", dec!(2800)), ("LIS", dec!(3000))] {
        alerts
            .add(NewAlert {
                origin: None,
                destination: dest.into(),
                depart_date: depart,
                return_date: None,
                target_price: target,
            })
            .await
            .unwrap();
    }

    let provider = Arc::new(
        MockProvider::new()
            .with_prices("MIA", &[2650])
            .with_prices("LIS", &[3400]),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let sniper = Sniper::new(provider.clone(), alerts, Some(notifier.clone()), Duration::ZERO);

    let report = sniper.run().await.unwrap();

    assert_eq!(report.checked, 2);
    assert_eq!(report.triggered.len(), 1);
    assert_eq!(provider.calls_for("MIA"), vec![DatePair::one_way(depart)]);
    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("FOR ➔ MIA"));
}
