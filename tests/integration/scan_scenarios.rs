//! Scan behaviour over the default date grid.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use fareradar::config::GridSettings;
use fareradar::engine::{DateGrid, PriceScanner, ScanConfig, ScanOutcome};
use fareradar::types::{DatePair, DestinationTarget, ScanMode, SENTINEL_BASELINE};

use crate::mock_provider::{MemorySink, MockProvider, Scripted};

fn grid() -> DateGrid {
    let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
    DateGrid::reverse_from(today, &GridSettings::default())
}

fn scanner(provider: Arc<MockProvider>, sink: Arc<MemorySink>, concurrency: usize) -> PriceScanner {
    PriceScanner::new(
        provider,
        sink,
        ScanConfig {
            pacing: Duration::ZERO,
            max_concurrent_destinations: concurrency,
        },
    )
}

fn lisbon() -> DestinationTarget {
    DestinationTarget::new("FOR", "LIS", dec!(1000))
}

#[tokio::test]
async fn overpriced_route_abandoned_after_three_strikes() {
    let provider = Arc::new(MockProvider::new().with_prices("LIS", &[1400, 1450, 1500, 800]));
    let sink = Arc::new(MemorySink::default());

    let scan = scanner(provider.clone(), sink.clone(), 1)
        .scan_destination(&lisbon(), &grid())
        .await;

    assert_eq!(scan.outcome, ScanOutcome::AbandonedTooExpensive);
    assert_eq!(provider.calls(), 3);
    assert!(sink.offers().is_empty());
}

#[tokio::test]
async fn zone_confirmed_after_three_cheap_quotes() {
    let provider = Arc::new(MockProvider::new().with_prices("LIS", &[900, 950, 980, 1100]));
    let sink = Arc::new(MemorySink::default());

    let scan = scanner(provider.clone(), sink.clone(), 1)
        .scan_destination(&lisbon(), &grid())
        .await;

    assert_eq!(scan.outcome, ScanOutcome::AbandonedZoneConfirmed);
    assert_eq!(provider.calls(), 3);
    let prices: Vec<_> = sink.offers().iter().map(|o| o.price).collect();
    assert_eq!(prices, vec![dec!(900), dec!(950), dec!(980)]);
    assert!(sink.offers().iter().all(|o| o.mode == ScanMode::Auto));
}

#[tokio::test]
async fn missing_and_failed_quotes_leave_counters_alone() {
    let provider = Arc::new(MockProvider::new().with_script(
        "LIS",
        vec![
            Scripted::NoFare,
            Scripted::Fail("HTTP 500"),
            Scripted::Price(dec!(1400)),
            Scripted::NoFare,
            Scripted::Price(dec!(1400)),
            Scripted::Price(dec!(1400)),
        ],
    ));
    let sink = Arc::new(MemorySink::default());

    let scan = scanner(provider.clone(), sink, 1)
        .scan_destination(&lisbon(), &grid())
        .await;

    assert_eq!(scan.outcome, ScanOutcome::AbandonedTooExpensive);
    assert_eq!(scan.lookups, 6);
    assert_eq!(scan.state.strikes_too_expensive, 3);
}

#[tokio::test]
async fn quiet_provider_exhausts_the_grid_in_order() {
    let g = grid();
    let provider = Arc::new(MockProvider::new());
    let sink = Arc::new(MemorySink::default());

    let scan = scanner(provider.clone(), sink, 1)
        .scan_destination(&lisbon(), &g)
        .await;

    assert_eq!(scan.outcome, ScanOutcome::Exhausted);
    assert_eq!(scan.lookups, g.len());

    let seen = provider.calls_for("LIS");
    let expected: Vec<DatePair> = g.pairs().collect();
    assert_eq!(seen, expected);
    // Most-future departure first
    assert!(seen.first().unwrap().depart > seen.last().unwrap().depart);
}

#[tokio::test]
async fn destinations_keep_independent_state() {
    let provider = Arc::new(
        MockProvider::new()
            .with_prices("LIS", &[1400, 1400, 1400])
            .with_prices("MAD", &[700, 720, 740])
            .with_prices("GRU", &[300]),
    );
    let sink = Arc::new(MemorySink::default());
    let targets = vec![
        lisbon(),
        DestinationTarget::new("FOR", "MAD", dec!(800)),
        DestinationTarget::new("FOR", "GRU", dec!(900)),
    ];
    let g = grid();

    let scans = scanner(provider.clone(), sink.clone(), 3).scan_all(&targets, &g).await;

    let outcomes: Vec<_> = scans.iter().map(|s| (s.target.destination.as_str(), s.outcome)).collect();
    assert_eq!(
        outcomes,
        vec![
            ("LIS", ScanOutcome::AbandonedTooExpensive),
            ("MAD", ScanOutcome::AbandonedZoneConfirmed),
            ("GRU", ScanOutcome::Exhausted),
        ]
    );
    assert_eq!(provider.calls_for("LIS").len(), 3);
    assert_eq!(provider.calls_for("MAD").len(), 3);
    assert_eq!(provider.calls_for("GRU").len(), g.len());
    assert_eq!(sink.offers().len(), 4);
}

#[tokio::test]
async fn manual_mode_records_every_fare_found() {
    let provider = Arc::new(MockProvider::new().with_prices("LIS", &[5200]));
    let sink = Arc::new(MemorySink::default());
    let dates = DatePair::round_trip(
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
    );

    let result = scanner(provider.clone(), sink.clone(), 1)
        .scan_exact("FOR", &["LIS".to_string(), "MAD".to_string()], dates)
        .await;

    assert_eq!(provider.calls(), 2);
    assert_eq!(result.misses, vec!["MAD".to_string()]);
    let offers = sink.offers();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0].destination, "LIS");
    assert_eq!(offers[0].mode, ScanMode::Manual);
    assert_eq!(offers[0].baseline, SENTINEL_BASELINE);
    assert_eq!(offers[0].dates(), dates);
}

/// Small deterministic generator so the property sweep needs no extra crates.
struct Lcg(u64);

impl Lcg {
    fn next_price(&mut self, baseline: i64) -> Scripted {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let r = (self.0 >> 33) % 100;
        match r {
            0..=9 => Scripted::NoFare,
            10..=14 => Scripted::Fail("timeout"),
            _ => {
                // 50% .. 200% of baseline
                let pct = 50 + (r as i64 - 15) * 150 / 85;
                Scripted::Price(Decimal::from(baseline * pct / 100))
            }
        }
    }
}

#[tokio::test]
async fn scan_invariants_hold_for_varied_price_streams() {
    let g = grid();
    let baseline = 2000i64;

    for seed in 1..=40u64 {
        let mut rng = Lcg(seed);
        let script: Vec<_> = (0..g.len()).map(|_| rng.next_price(baseline)).collect();
        let provider = Arc::new(MockProvider::new().with_script("LIS", script));
        let sink = Arc::new(MemorySink::default());
        let target = DestinationTarget::new("FOR", "LIS", Decimal::from(baseline));

        let scan = scanner(provider.clone(), sink.clone(), 1)
            .scan_destination(&target, &g)
            .await;

        assert!(scan.lookups <= g.len(), "seed {seed}: too many lookups");
        assert_eq!(scan.lookups, provider.calls());
        assert!(scan.outcome.is_terminal());
        assert!(
            sink.offers().iter().all(|o| o.price <= target.baseline),
            "seed {seed}: recorded above baseline"
        );
        assert!(scan.state.strikes_too_expensive <= 3);
        assert!(scan.state.hits_in_zone <= 3);
        if scan.outcome == ScanOutcome::AbandonedZoneConfirmed {
            assert!(scan.state.entered_zone);
        }
        if scan.outcome == ScanOutcome::Exhausted {
            assert_eq!(scan.lookups, g.len());
        }
    }
}
