//! Fixed price alerts, persisted as a JSON array.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::{FixedAlert, FlightError};

/// Fields a caller supplies when creating an alert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAlert {
    #[serde(default)]
    pub origin: Option<String>,
    pub destination: String,
    pub depart_date: NaiveDate,
    #[serde(default)]
    pub return_date: Option<NaiveDate>,
    pub target_price: Decimal,
}

/// File-backed alert list. Every mutation rewrites the whole file under
/// one lock.
pub struct AlertStore {
    path: PathBuf,
    default_origin: String,
    lock: Mutex<()>,
}

impl AlertStore {
    pub fn new(path: impl Into<PathBuf>, default_origin: &str) -> Self {
        Self {
            path: path.into(),
            default_origin: default_origin.to_uppercase(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<FixedAlert>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read alerts from {}", self.path.display()))?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse alerts from {}", self.path.display()))
    }

    fn write(&self, alerts: &[FixedAlert]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(alerts).context("Failed to serialise alerts")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write alerts to {}", self.path.display()))?;
        debug!(path = %self.path.display(), count = alerts.len(), "Alerts saved");
        Ok(())
    }

    /// All saved alerts.
    pub async fn list(&self) -> Result<Vec<FixedAlert>> {
        let _guard = self.lock.lock().await;
        self.read()
    }

    /// Create and persist an alert with a fresh 8-character id.
    pub async fn add(&self, new: NewAlert) -> Result<FixedAlert> {
        if new.destination.trim().is_empty() {
            return Err(FlightError::InvalidTarget("alert destination is empty".into()).into());
        }
        if new.target_price <= Decimal::ZERO {
            return Err(FlightError::InvalidTarget("alert target price must be positive".into()).into());
        }
        if let Some(r) = new.return_date {
            if r < new.depart_date {
                return Err(FlightError::InvalidTarget(format!(
                    "alert return date {r} is before departure {}",
                    new.depart_date
                ))
                .into());
            }
        }

        let origin = new
            .origin
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .unwrap_or(self.default_origin.as_str())
            .to_uppercase();

        let alert = FixedAlert {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            origin,
            destination: new.destination.trim().to_uppercase(),
            depart_date: new.depart_date,
            return_date: new.return_date,
            target_price: new.target_price,
        };

        let _guard = self.lock.lock().await;
        let mut alerts = self.read()?;
        alerts.push(alert.clone());
        self.write(&alerts)?;

        info!(alert = %alert, "Alert added");
        Ok(alert)
    }

    /// Delete an alert by id.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut alerts = self.read()?;
        let before = alerts.len();
        alerts.retain(|a| a.id != id);
        if alerts.len() == before {
            return Err(FlightError::AlertNotFound(id.to_string()).into());
        }
        self.write(&alerts)?;
        info!(id, "Alert removed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
