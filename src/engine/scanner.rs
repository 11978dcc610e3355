//! Baseline-aware price scanner.
//!
//! Walks the date grid for one destination at a time, classifying each
//! quote against the destination's baseline and stopping early once the
//! evidence is clear either way:
//!
//! - three quotes above `baseline * 1.35` → the route is overpriced for
//!   this window, abandon it
//! - three quotes at or below `baseline * 1.15` → the price regime is
//!   confirmed, further lookups would only burn quota
//!
//! Only quotes at or below the baseline are recorded. Lookups within a
//! destination are strictly sequential; destinations are independent and
//! may run concurrently.

use futures::StreamExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::grid::DateGrid;
use crate::providers::PriceLookup;
use crate::storage::OfferSink;
use crate::types::{DatePair, DestinationTarget, Offer, PriceQuote, ScanMode, SENTINEL_BASELINE};

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Quotes above `baseline * TOO_EXPENSIVE_RATIO` count as a strike.
const TOO_EXPENSIVE_RATIO: Decimal = dec!(1.35);

/// Quotes at or below `baseline * ZONE_RATIO` count as a zone hit.
const ZONE_RATIO: Decimal = dec!(1.15);

/// Strikes before a destination is abandoned.
pub const STRIKE_LIMIT: u32 = 3;

/// Zone hits before a destination is considered confirmed.
pub const ZONE_HIT_LIMIT: u32 = 3;

/// Default delay between consecutive lookups.
pub const DEFAULT_PACING: Duration = Duration::from_millis(300);

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Where a quote falls relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceClass {
    /// Above `baseline * 1.35`.
    TooExpensive,
    /// At or below `baseline * 1.15`.
    InZone,
    /// Between the two bands.
    Acceptable,
}

pub fn classify(price: Decimal, baseline: Decimal) -> PriceClass {
    if price > baseline * TOO_EXPENSIVE_RATIO {
        PriceClass::TooExpensive
    } else if price <= baseline * ZONE_RATIO {
        PriceClass::InZone
    } else {
        PriceClass::Acceptable
    }
}

/// Whether a quote is worth recording.
pub fn qualifies(price: Decimal, baseline: Decimal) -> bool {
    price <= baseline
}

/// Lifecycle of one destination's scan. Every state but `Scanning` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanOutcome {
    Scanning,
    AbandonedTooExpensive,
    AbandonedZoneConfirmed,
    Exhausted,
}

impl ScanOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanOutcome::Scanning)
    }
}

impl fmt::Display for ScanOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanOutcome::Scanning => write!(f, "SCANNING"),
            ScanOutcome::AbandonedTooExpensive => write!(f, "ABANDONED_TOO_EXPENSIVE"),
            ScanOutcome::AbandonedZoneConfirmed => write!(f, "ABANDONED_ZONE_CONFIRMED"),
            ScanOutcome::Exhausted => write!(f, "EXHAUSTED"),
        }
    }
}

/// Per-destination counters. Strikes and zone hits only ever increase,
/// and `entered_zone` never reverts once set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanState {
    pub strikes_too_expensive: u32,
    pub hits_in_zone: u32,
    pub entered_zone: bool,
}

impl ScanState {
    /// Fold one quote into the counters.
    pub fn observe(&mut self, price: Decimal, baseline: Decimal) -> PriceClass {
        let class = classify(price, baseline);
        match class {
            PriceClass::TooExpensive => self.strikes_too_expensive += 1,
            PriceClass::InZone => {
                self.entered_zone = true;
                self.hits_in_zone += 1;
            }
            PriceClass::Acceptable => {}
        }
        class
    }

    pub fn too_expensive(&self) -> bool {
        self.strikes_too_expensive >= STRIKE_LIMIT
    }

    pub fn zone_confirmed(&self) -> bool {
        self.entered_zone && self.hits_in_zone >= ZONE_HIT_LIMIT
    }

    /// Current outcome given the counters alone.
    pub fn outcome(&self) -> ScanOutcome {
        if self.too_expensive() {
            ScanOutcome::AbandonedTooExpensive
        } else if self.zone_confirmed() {
            ScanOutcome::AbandonedZoneConfirmed
        } else {
            ScanOutcome::Scanning
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Result of scanning one destination.
#[derive(Debug, Clone, Serialize)]
pub struct DestinationScan {
    pub target: DestinationTarget,
    pub outcome: ScanOutcome,
    pub state: ScanState,
    pub lookups: usize,
    /// Offers persisted by the sink.
    pub offers: Vec<Offer>,
    /// Sink failures; the offers they concern are not in `offers`.
    pub sink_errors: Vec<String>,
}

/// Result of a manual run on fixed dates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ManualScan {
    pub lookups: usize,
    pub offers: Vec<Offer>,
    /// Destinations with no fare (absent or failed lookup).
    pub misses: Vec<String>,
    pub sink_errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub pacing: Duration,
    pub max_concurrent_destinations: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pacing: DEFAULT_PACING,
            max_concurrent_destinations: 1,
        }
    }
}

/// Stateless between invocations: all counters live inside one
/// `scan_destination` call.
pub struct PriceScanner {
    lookup: Arc<dyn PriceLookup>,
    sink: Arc<dyn OfferSink>,
    config: ScanConfig,
}

impl PriceScanner {
    pub fn new(lookup: Arc<dyn PriceLookup>, sink: Arc<dyn OfferSink>, config: ScanConfig) -> Self {
        Self { lookup, sink, config }
    }

    async fn pace(&self) {
        if !self.config.pacing.is_zero() {
            tokio::time::sleep(self.config.pacing).await;
        }
    }

    /// Fetch one quote. Absent results and errors both count as no data.
    async fn quote(&self, origin: &str, destination: &str, dates: DatePair) -> Option<PriceQuote> {
        match self
            .lookup
            .price_for(origin, destination, dates.depart, dates.return_date)
            .await
        {
            Ok(Some(q)) => Some(q),
            Ok(None) => {
                debug!(origin, destination, dates = %dates, "No fare returned");
                None
            }
            Err(e) => {
                warn!(origin, destination, dates = %dates, error = %e, "Lookup failed, skipping pair");
                None
            }
        }
    }

    /// Persist an offer, returning the error text on failure.
    async fn record(&self, offer: Offer, offers: &mut Vec<Offer>, errors: &mut Vec<String>) {
        match self.sink.record(&offer).await {
            Ok(()) => offers.push(offer),
            Err(e) => {
                warn!(offer = %offer, error = %e, "Failed to record offer");
                errors.push(format!("{offer}: {e:#}"));
            }
        }
    }

    /// Scan one destination over the grid until a limit trips or the grid
    /// runs out.
    pub async fn scan_destination(&self, target: &DestinationTarget, grid: &DateGrid) -> DestinationScan {
        info!(target = %target, pairs = grid.len(), "Scanning destination");

        let mut state = ScanState::default();
        let mut lookups = 0usize;
        let mut offers = Vec::new();
        let mut sink_errors = Vec::new();

        'grid: for departure in grid.departures() {
            for dates in departure.pairs() {
                if lookups > 0 {
                    self.pace().await;
                }
                lookups += 1;

                let Some(quote) = self.quote(&target.origin, &target.destination, dates).await else {
                    continue;
                };

                let class = state.observe(quote.price, target.baseline);
                debug!(
                    destination = %target.destination,
                    dates = %dates,
                    price = %quote.price,
                    baseline = %target.baseline,
                    class = ?class,
                    strikes = state.strikes_too_expensive,
                    zone_hits = state.hits_in_zone,
                    "Quote classified"
                );

                if state.too_expensive() {
                    info!(destination = %target.destination, "Consistently overpriced, abandoning destination");
                    break 'grid;
                }

                if qualifies(quote.price, target.baseline) {
                    let offer = Offer::new(target, dates, &quote, ScanMode::Auto);
                    info!(offer = %offer, "Fare at or below baseline");
                    self.record(offer, &mut offers, &mut sink_errors).await;
                }

                if state.zone_confirmed() {
                    info!(destination = %target.destination, "Price zone confirmed, ending destination");
                    break 'grid;
                }
            }
        }

        let outcome = match state.outcome() {
            ScanOutcome::Scanning => ScanOutcome::Exhausted,
            terminal => terminal,
        };

        info!(
            destination = %target.destination,
            outcome = %outcome,
            lookups,
            offers = offers.len(),
            "Destination scan finished"
        );

        DestinationScan {
            target: target.clone(),
            outcome,
            state,
            lookups,
            offers,
            sink_errors,
        }
    }

    /// Scan every target, up to `max_concurrent_destinations` at a time.
    /// Results come back in target order.
    pub async fn scan_all(&self, targets: &[DestinationTarget], grid: &DateGrid) -> Vec<DestinationScan> {
        futures::stream::iter(targets.iter().cloned())
            .map(|target| async move { self.scan_destination(&target, grid).await })
            .buffered(self.config.max_concurrent_destinations.max(1))
            .collect()
            .await
    }

    /// One lookup per destination on fixed dates; every fare found is
    /// recorded. No grid, no classification, no early exit.
    pub async fn scan_exact(&self, origin: &str, destinations: &[String], dates: DatePair) -> ManualScan {
        info!(origin, destinations = ?destinations, dates = %dates, "Manual run");

        let mut result = ManualScan::default();

        for destination in destinations {
            if result.lookups > 0 {
                self.pace().await;
            }
            result.lookups += 1;

            let target = DestinationTarget::new(origin, destination, SENTINEL_BASELINE);
            match self.quote(&target.origin, &target.destination, dates).await {
                Some(quote) => {
                    let offer = Offer::new(&target, dates, &quote, ScanMode::Manual);
                    info!(offer = %offer, "Manual fare found");
                    self.record(offer, &mut result.offers, &mut result.sink_errors).await;
                }
                None => result.misses.push(target.destination),
            }
        }

        info!(
            lookups = result.lookups,
            offers = result.offers.len(),
            misses = result.misses.len(),
            "Manual run finished"
        );
        result
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
