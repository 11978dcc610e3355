//! Deterministic fare provider and offer sink for integration testing.
//!
//! Prices are scripted per destination and served in order; once a
//! destination's script runs out every further lookup returns no fare.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use fareradar::providers::PriceLookup;
use fareradar::storage::OfferSink;
use fareradar::types::{DatePair, Offer, PriceQuote};

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Scripted {
    Price(Decimal),
    NoFare,
    Fail(&'static str),
}

#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, DatePair)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue prices for a destination.
    pub fn with_prices(self, destination: &str, prices: &[i64]) -> Self {
        let script = prices.iter().map(|p| Scripted::Price(Decimal::from(*p))).collect();
        self.with_script(destination, script)
    }

    pub fn with_script(self, destination: &str, script: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(destination.to_string())
            .or_default()
            .extend(script);
        self
    }

    /// Total lookups so far.
    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Lookups made for one destination.
    pub fn calls_for(&self, destination: &str) -> Vec<DatePair> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(d, _)| d == destination)
            .map(|(_, dates)| *dates)
            .collect()
    }
}

#[async_trait]
impl PriceLookup for MockProvider {
    async fn price_for(
        &self,
        _origin: &str,
        destination: &str,
        depart: NaiveDate,
        return_date: Option<NaiveDate>,
    ) -> Result<Option<PriceQuote>> {
        self.calls
            .lock()
            .unwrap()
            .push((destination.to_string(), DatePair { depart, return_date }));

        let next = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(destination)
            .and_then(|q| q.pop_front());

        match next {
            Some(Scripted::Price(p)) => Ok(Some(PriceQuote::new(p, "BRL"))),
            Some(Scripted::Fail(msg)) => Err(anyhow!(msg)),
            Some(Scripted::NoFare) | None => Ok(None),
        }
    }

    async fn check_credentials(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Collects recorded offers in memory.
#[derive(Default)]
pub struct MemorySink {
    offers: Mutex<Vec<Offer>>,
}

impl MemorySink {
    pub fn offers(&self) -> Vec<Offer> {
        self.offers.lock().unwrap().clone()
    }
}

#[async_trait]
impl OfferSink for MemorySink {
    async fn record(&self, offer: &Offer) -> Result<()> {
        self.offers.lock().unwrap().push(offer.clone());
        Ok(())
    }
}
