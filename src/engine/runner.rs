//! Run orchestration: one guarded auto or manual run at a time.
//!
//! `RunControl` is shared between the scheduler loop and the dashboard.
//! Whoever wins `try_begin` holds a `RunTicket` for the duration of the
//! run; everyone else gets `FlightError::RunInProgress`. Sniper passes
//! have their own slot so they never block, or wait on, a scan run.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::grid::DateGrid;
use super::scanner::{DestinationScan, ManualScan, PriceScanner, ScanOutcome};
use super::sniper::SniperReport;
use crate::config::GridSettings;
use crate::notify::{offer_message, Notifier};
use crate::storage::{load_targets, TargetsFile};
use crate::types::{DatePair, DestinationTarget, FlightError, Offer, ScanMode};

// ---------------------------------------------------------------------------
// Run control
// ---------------------------------------------------------------------------

/// A claimed busy flag. Dropping it clears the flag.
#[derive(Debug)]
struct Claim(Arc<AtomicBool>);

impl Claim {
    fn try_take(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Proof of holding the run slot. Dropping it frees the slot.
pub struct RunTicket {
    number: u64,
    _claim: Claim,
}

impl RunTicket {
    pub fn number(&self) -> u64 {
        self.number
    }
}

/// Held for the duration of one sniper pass.
pub struct SniperTicket {
    _claim: Claim,
}

/// Shared run state: exclusivity, pause flag and the latest results.
#[derive(Debug, Default)]
pub struct RunControl {
    running: Arc<AtomicBool>,
    sniping: Arc<AtomicBool>,
    paused: AtomicBool,
    runs: AtomicU64,
    last_run: RwLock<Option<RunSummary>>,
    last_sniper: RwLock<Option<SniperReport>>,
    next_auto: RwLock<Option<DateTime<Utc>>>,
    next_sniper: RwLock<Option<DateTime<Utc>>>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the run slot without waiting.
    pub fn try_begin(&self) -> Result<RunTicket, FlightError> {
        let claim = Claim::try_take(&self.running).ok_or(FlightError::RunInProgress)?;
        let number = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RunTicket { number, _claim: claim })
    }

    /// Read-only; never contends with `try_begin`.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the sniper slot, or `None` while a pass is still going.
    pub fn try_begin_sniper(&self) -> Option<SniperTicket> {
        Claim::try_take(&self.sniping).map(|claim| SniperTicket { _claim: claim })
    }

    pub fn is_sniping(&self) -> bool {
        self.sniping.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Flip the pause flag, returning the new value.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn runs_started(&self) -> u64 {
        self.runs.load(Ordering::SeqCst)
    }

    pub async fn last_run(&self) -> Option<RunSummary> {
        self.last_run.read().await.clone()
    }

    pub async fn last_sniper(&self) -> Option<SniperReport> {
        self.last_sniper.read().await.clone()
    }

    pub async fn record_sniper(&self, report: SniperReport) {
        *self.last_sniper.write().await = Some(report);
    }

    pub async fn next_auto(&self) -> Option<DateTime<Utc>> {
        *self.next_auto.read().await
    }

    pub async fn next_sniper(&self) -> Option<DateTime<Utc>> {
        *self.next_sniper.read().await
    }

    pub async fn schedule_auto(&self, at: DateTime<Utc>) {
        *self.next_auto.write().await = Some(at);
    }

    pub async fn schedule_sniper(&self, at: DateTime<Utc>) {
        *self.next_sniper.write().await = Some(at);
    }

    async fn record_run(&self, summary: RunSummary) {
        *self.last_run.write().await = Some(summary);
    }
}

// ---------------------------------------------------------------------------
// Requests and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum RunRequest {
    /// Scan every configured target over the date grid.
    Auto,
    /// One lookup per destination on fixed dates.
    Manual {
        destinations: Vec<String>,
        dates: DatePair,
    },
}

impl RunRequest {
    pub fn mode(&self) -> ScanMode {
        match self {
            RunRequest::Auto => ScanMode::Auto,
            RunRequest::Manual { .. } => ScanMode::Manual,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DestinationOutcome {
    pub destination: String,
    pub outcome: ScanOutcome,
    pub lookups: usize,
    pub offers: usize,
}

/// Compact record of a finished run, kept for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_number: u64,
    pub mode: ScanMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub destinations: usize,
    /// Targets left out because their baseline was unreadable.
    pub skipped: usize,
    pub lookups: usize,
    pub offers: usize,
    pub sink_errors: usize,
    pub outcomes: Vec<DestinationOutcome>,
    pub error: Option<String>,
}

/// Full result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_number: u64,
    pub mode: ScanMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scans: Vec<DestinationScan>,
    pub skipped: Vec<DestinationTarget>,
    pub manual: Option<ManualScan>,
}

impl RunReport {
    pub fn offers(&self) -> impl Iterator<Item = &Offer> {
        self.scans
            .iter()
            .flat_map(|s| s.offers.iter())
            .chain(self.manual.iter().flat_map(|m| m.offers.iter()))
    }

    pub fn lookups(&self) -> usize {
        self.scans.iter().map(|s| s.lookups).sum::<usize>()
            + self.manual.as_ref().map_or(0, |m| m.lookups)
    }

    pub fn sink_errors(&self) -> usize {
        self.scans.iter().map(|s| s.sink_errors.len()).sum::<usize>()
            + self.manual.as_ref().map_or(0, |m| m.sink_errors.len())
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_number: self.run_number,
            mode: self.mode,
            started_at: self.started_at,
            finished_at: self.finished_at,
            destinations: match &self.manual {
                Some(m) => m.lookups,
                None => self.scans.len(),
            },
            skipped: self.skipped.len(),
            lookups: self.lookups(),
            offers: self.offers().count(),
            sink_errors: self.sink_errors(),
            outcomes: self
                .scans
                .iter()
                .map(|s| DestinationOutcome {
                    destination: s.target.destination.clone(),
                    outcome: s.outcome,
                    lookups: s.lookups,
                    offers: s.offers.len(),
                })
                .collect(),
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub targets_path: PathBuf,
    pub default_origin: String,
    pub grid: GridSettings,
    /// Send every recorded offer to the notifier after the run.
    pub notify_offers: bool,
}

pub struct FlightRunner {
    scanner: PriceScanner,
    control: Arc<RunControl>,
    settings: RunnerSettings,
    notifier: Option<Arc<dyn Notifier>>,
}

impl FlightRunner {
    pub fn new(
        scanner: PriceScanner,
        control: Arc<RunControl>,
        settings: RunnerSettings,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            scanner,
            control,
            settings,
            notifier,
        }
    }

    pub fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    pub fn default_origin(&self) -> &str {
        &self.settings.default_origin
    }

    pub fn notifier(&self) -> Option<&Arc<dyn Notifier>> {
        self.notifier.as_ref()
    }

    /// Current contents of the targets file.
    pub fn targets(&self) -> Result<TargetsFile> {
        load_targets(&self.settings.targets_path, &self.settings.default_origin)
    }

    /// Execute one run. The ticket is held until the run, its summary and
    /// any notifications are done.
    pub async fn run(&self, ticket: RunTicket, request: RunRequest, today: NaiveDate) -> Result<RunReport> {
        let started_at = Utc::now();
        let mode = request.mode();
        info!(run = ticket.number(), mode = %mode, "Run starting");

        let outcome = self.execute(&ticket, request, today, started_at).await;

        match &outcome {
            Ok((report, _)) => {
                let summary = report.summary();
                info!(
                    run = summary.run_number,
                    mode = %summary.mode,
                    destinations = summary.destinations,
                    skipped = summary.skipped,
                    lookups = summary.lookups,
                    offers = summary.offers,
                    sink_errors = summary.sink_errors,
                    "Run complete"
                );
                self.control.record_run(summary).await;
            }
            Err(e) => {
                error!(run = ticket.number(), error = %e, "Run failed");
                self.control
                    .record_run(RunSummary {
                        run_number: ticket.number(),
                        mode,
                        started_at,
                        finished_at: Utc::now(),
                        destinations: 0,
                        skipped: 0,
                        lookups: 0,
                        offers: 0,
                        sink_errors: 0,
                        outcomes: Vec::new(),
                        error: Some(format!("{e:#}")),
                    })
                    .await;
            }
        }

        let (report, airports) = outcome?;
        if self.settings.notify_offers {
            self.notify(&report, &airports).await;
        }

        drop(ticket);
        Ok(report)
    }

    async fn execute(
        &self,
        ticket: &RunTicket,
        request: RunRequest,
        today: NaiveDate,
        started_at: DateTime<Utc>,
    ) -> Result<(RunReport, TargetsFile)> {
        match request {
            RunRequest::Auto => {
                let file = load_targets(&self.settings.targets_path, &self.settings.default_origin)?;
                let (skipped, targets): (Vec<_>, Vec<_>) =
                    file.targets.iter().cloned().partition(|t| !t.baseline_known);
                for t in &skipped {
                    warn!(target = %t, "No usable baseline, target not scanned");
                }

                let grid = DateGrid::reverse_from(today, &self.settings.grid);
                info!(targets = targets.len(), pairs = grid.len(), "Auto scan");
                let scans = self.scanner.scan_all(&targets, &grid).await;

                let report = RunReport {
                    run_number: ticket.number(),
                    mode: ScanMode::Auto,
                    started_at,
                    finished_at: Utc::now(),
                    scans,
                    skipped,
                    manual: None,
                };
                Ok((report, file))
            }
            RunRequest::Manual { destinations, dates } => {
                if let Some(r) = dates.return_date {
                    if r < dates.depart {
                        return Err(FlightError::InvalidTarget(format!(
                            "return date {r} is before departure {}",
                            dates.depart
                        ))
                        .into());
                    }
                }

                let destinations: Vec<String> = destinations
                    .iter()
                    .map(|d| d.trim().to_uppercase())
                    .filter(|d| !d.is_empty())
                    .collect();

                // Airport names are only cosmetic here
                let airports = if self.settings.notify_offers {
                    load_targets(&self.settings.targets_path, &self.settings.default_origin)
                        .unwrap_or_default()
                } else {
                    TargetsFile::default()
                };

                let manual = self
                    .scanner
                    .scan_exact(&self.settings.default_origin, &destinations, dates)
                    .await;

                let report = RunReport {
                    run_number: ticket.number(),
                    mode: ScanMode::Manual,
                    started_at,
                    finished_at: Utc::now(),
                    scans: Vec::new(),
                    skipped: Vec::new(),
                    manual: Some(manual),
                };
                Ok((report, airports))
            }
        }
    }

    async fn notify(&self, report: &RunReport, airports: &TargetsFile) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let offers: Vec<&Offer> = report.offers().collect();
        for offer in offers {
            if let Err(e) = notifier.send(&offer_message(offer, Some(airports))).await {
                warn!(offer = %offer, error = %e, "Failed to send offer notification");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
