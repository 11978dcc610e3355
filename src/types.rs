//! Shared types for the FARERADAR service.
//!
//! These types form the data model used across all modules.
//! Providers, storage, the scan engine and the dashboard all depend on
//! them without depending on each other.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Baseline assigned to targets whose reference price could not be read,
/// and to offers recorded outside the scan heuristic.
pub const SENTINEL_BASELINE: Decimal = dec!(99999);

// ---------------------------------------------------------------------------
// Destination target
// ---------------------------------------------------------------------------

/// An origin/destination pair with its historical reference price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestinationTarget {
    /// IATA code, e.g. "FOR"
    pub origin: String,
    /// IATA code, e.g. "LIS"
    pub destination: String,
    /// Historical reference price; the ceiling for recording an offer.
    pub baseline: Decimal,
    /// False when the configured baseline could not be read and
    /// `baseline` holds the sentinel instead.
    #[serde(default = "baseline_known_default")]
    pub baseline_known: bool,
}

fn baseline_known_default() -> bool {
    true
}

impl DestinationTarget {
    pub fn new(origin: &str, destination: &str, baseline: Decimal) -> Self {
        Self {
            origin: origin.to_uppercase(),
            destination: destination.to_uppercase(),
            baseline,
            baseline_known: true,
        }
    }

    /// A target whose baseline could not be read. It carries the sentinel
    /// so anything compared against it sorts last.
    pub fn unreadable_baseline(origin: &str, destination: &str) -> Self {
        Self {
            baseline_known: false,
            ..Self::new(origin, destination, SENTINEL_BASELINE)
        }
    }
}

impl fmt::Display for DestinationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} (baseline {:.2})", self.origin, self.destination, self.baseline)
    }
}

// ---------------------------------------------------------------------------
// Dates and quotes
// ---------------------------------------------------------------------------

/// A departure date with an optional return date (one-way when `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatePair {
    pub depart: NaiveDate,
    #[serde(rename = "return", default)]
    pub return_date: Option<NaiveDate>,
}

impl DatePair {
    pub fn round_trip(depart: NaiveDate, return_date: NaiveDate) -> Self {
        Self { depart, return_date: Some(return_date) }
    }

    pub fn one_way(depart: NaiveDate) -> Self {
        Self { depart, return_date: None }
    }
}

impl fmt::Display for DatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.return_date {
            Some(r) => write!(f, "{} → {}", self.depart, r),
            None => write!(f, "{} (one-way)", self.depart),
        }
    }
}

/// A single normalized price returned by a lookup provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub currency: String,
}

impl PriceQuote {
    pub fn new(price: Decimal, currency: &str) -> Self {
        Self { price, currency: currency.to_string() }
    }
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

/// How an offer was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScanMode {
    /// Grid scan with baseline classification.
    Auto,
    /// One-off lookup on caller-specified dates.
    Manual,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanMode::Auto => write!(f, "AUTO"),
            ScanMode::Manual => write!(f, "MANUAL"),
        }
    }
}

/// A recorded price observation. Append-only: never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub origin: String,
    pub destination: String,
    pub depart_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub price: Decimal,
    pub currency: String,
    pub baseline: Decimal,
    pub mode: ScanMode,
    pub link: String,
    pub timestamp: DateTime<Utc>,
}

impl Offer {
    /// Build an offer stamped with the current time.
    pub fn new(
        target: &DestinationTarget,
        dates: DatePair,
        quote: &PriceQuote,
        mode: ScanMode,
    ) -> Self {
        Self {
            origin: target.origin.clone(),
            destination: target.destination.clone(),
            depart_date: dates.depart,
            return_date: dates.return_date,
            price: quote.price,
            currency: quote.currency.clone(),
            baseline: target.baseline,
            mode,
            link: google_flights_link(&target.origin, &target.destination, &quote.currency),
            timestamp: Utc::now(),
        }
    }

    pub fn dates(&self) -> DatePair {
        DatePair {
            depart: self.depart_date,
            return_date: self.return_date,
        }
    }

    /// Savings against the baseline (negative when above it).
    pub fn savings(&self) -> Decimal {
        self.baseline - self.price
    }
}

impl fmt::Display for Offer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}->{} {} | {} {:.2} (baseline {:.2})",
            self.mode,
            self.origin,
            self.destination,
            self.dates(),
            self.currency,
            self.price,
            self.baseline,
        )
    }
}

/// Google Flights search URL for a route.
pub fn google_flights_link(origin: &str, destination: &str, currency: &str) -> String {
    let query = format!("Flights from {origin} to {destination}");
    format!(
        "https://www.google.com/travel/flights/search?q={}&curr={}",
        urlencoding::encode(&query),
        urlencoding::encode(currency),
    )
}

// ---------------------------------------------------------------------------
// Fixed price alerts
// ---------------------------------------------------------------------------

/// A user-defined alert on exact dates: notify when the fare drops to
/// `target_price` or below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedAlert {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub depart_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    pub target_price: Decimal,
}

impl FixedAlert {
    pub fn dates(&self) -> DatePair {
        DatePair {
            depart: self.depart_date,
            return_date: self.return_date,
        }
    }
}

impl fmt::Display for FixedAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}->{} {} (target {:.2})",
            self.id,
            self.origin,
            self.destination,
            self.dates(),
            self.target_price,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for FARERADAR.
#[derive(Debug, thiserror::Error)]
pub enum FlightError {
    #[error("A run is already in progress")]
    RunInProgress,

    #[error("Lookup error ({provider}): {message}")]
    Lookup { provider: String, message: String },

    #[error("Offer store write failed: {0}")]
    Sink(String),

    #[error("Invalid destination target: {0}")]
    InvalidTarget(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification failed ({channel}): {message}")]
    Notify { channel: String, message: String },

    #[error("Alert not found: {0}")]
    AlertNotFound(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
