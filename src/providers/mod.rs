//! Fare providers.
//!
//! Defines the `PriceLookup` trait consumed by the scan engine and the
//! Amadeus flight-offers implementation.

pub mod amadeus;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::PriceQuote;

/// Abstraction over flight-pricing APIs.
///
/// Implementors return one canonical price per query; any field
/// normalization happens inside the implementation. `Ok(None)` means the
/// provider had no fare for those dates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Price a specific itinerary. One-way when `return_date` is `None`.
    async fn price_for(
        &self,
        origin: &str,
        destination: &str,
        depart: NaiveDate,
        return_date: Option<NaiveDate>,
    ) -> Result<Option<PriceQuote>>;

    /// Confirm the provider accepts our credentials.
    async fn check_credentials(&self) -> Result<()>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}
