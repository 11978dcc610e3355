//! Fixed-alert sniper: checks each saved alert on its exact dates and
//! fires a notification when the fare reaches the alert's target.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::notify::{sniper_message, Notifier};
use crate::providers::PriceLookup;
use crate::storage::AlertStore;
use crate::types::{FixedAlert, PriceQuote};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SniperReport {
    pub checked: usize,
    /// Ids of alerts whose target was reached.
    pub triggered: Vec<String>,
    pub failed: usize,
}

pub struct Sniper {
    lookup: Arc<dyn PriceLookup>,
    alerts: Arc<AlertStore>,
    notifier: Option<Arc<dyn Notifier>>,
    /// Delay between consecutive alert lookups, same rule as the scanner.
    pacing: Duration,
}

impl Sniper {
    pub fn new(
        lookup: Arc<dyn PriceLookup>,
        alerts: Arc<AlertStore>,
        notifier: Option<Arc<dyn Notifier>>,
        pacing: Duration,
    ) -> Self {
        Self {
            lookup,
            alerts,
            notifier,
            pacing,
        }
    }

    /// Whether a quote satisfies an alert.
    pub fn hit(alert: &FixedAlert, quote: &PriceQuote) -> bool {
        quote.price <= alert.target_price
    }

    /// Check every saved alert once.
    pub async fn run(&self) -> Result<SniperReport> {
        let alerts = self.alerts.list().await?;
        let mut report = SniperReport::default();

        if alerts.is_empty() {
            debug!("No fixed alerts to check");
            return Ok(report);
        }
        info!(alerts = alerts.len(), "Sniper pass starting");

        for alert in &alerts {
            if report.checked > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            report.checked += 1;

            let quote = match self
                .lookup
                .price_for(&alert.origin, &alert.destination, alert.depart_date, alert.return_date)
                .await
            {
                Ok(Some(q)) => q,
                Ok(None) => {
                    debug!(alert = %alert, "No fare on alert dates");
                    continue;
                }
                Err(e) => {
                    warn!(alert = %alert, error = %e, "Sniper lookup failed");
                    report.failed += 1;
                    continue;
                }
            };

            if !Self::hit(alert, &quote) {
                debug!(alert = %alert, price = %quote.price, "Above target");
                continue;
            }

            info!(alert = %alert, price = %quote.price, "Alert target reached");
            report.triggered.push(alert.id.clone());

            if let Some(notifier) = &self.notifier {
                if let Err(e) = notifier.send(&sniper_message(alert, &quote)).await {
                    warn!(alert = %alert, error = %e, "Failed to send alert");
                }
            }
        }

        info!(
            checked = report.checked,
            triggered = report.triggered.len(),
            failed = report.failed,
            "Sniper pass finished"
        );
        Ok(report)
    }
}
