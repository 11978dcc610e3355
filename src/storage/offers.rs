//! Offer log.
//!
//! Offers are appended one JSON object per line. Appends from concurrent
//! destination scans are serialized behind a single lock per store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::types::{FlightError, Offer};

/// Append-only destination for recorded offers.
#[async_trait]
pub trait OfferSink: Send + Sync {
    /// Persist one offer. Duplicate suppression, if any, is the sink's job.
    async fn record(&self, offer: &Offer) -> Result<()>;
}

/// JSON-lines offer log on disk.
pub struct JsonlOfferStore {
    path: PathBuf,
    /// Serializes appends. Holds the line count once it has been read.
    write_lock: Mutex<Option<usize>>,
}

impl JsonlOfferStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, offer: &Offer) -> Result<()> {
        let line = serde_json::to_string(offer).context("Failed to serialise offer")?;

        let mut count = self
            .write_lock
            .lock()
            .map_err(|_| FlightError::Sink("offer store lock poisoned".into()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open offer log {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        if let Some(n) = count.as_mut() {
            *n += 1;
        }

        debug!(path = %self.path.display(), offer = %offer, "Offer saved");
        Ok(())
    }

    /// Load the most recent `limit` offers, oldest first.
    /// Malformed lines are skipped; a missing file yields an empty list.
    pub fn load_recent(&self, limit: usize) -> Result<Vec<Offer>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read offer log {}", self.path.display()))?;

        let mut offers: Vec<Offer> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(o) => Some(o),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed offer line");
                    None
                }
            })
            .collect();

        let start = offers.len().saturating_sub(limit);
        Ok(offers.split_off(start))
    }

    /// Number of entries in the log. The file is scanned once, without
    /// parsing; later appends through this store bump the cached count.
    pub fn count(&self) -> Result<usize> {
        let mut count = self
            .write_lock
            .lock()
            .map_err(|_| FlightError::Sink("offer store lock poisoned".into()))?;

        if let Some(n) = *count {
            return Ok(n);
        }

        let n = if self.path.exists() {
            let file = File::open(&self.path)
                .with_context(|| format!("Failed to open offer log {}", self.path.display()))?;
            let mut n = 0;
            for line in BufReader::new(file).lines() {
                let line = line.with_context(|| format!("Failed to read offer log {}", self.path.display()))?;
                if !line.trim().is_empty() {
                    n += 1;
                }
            }
            n
        } else {
            0
        };

        *count = Some(n);
        Ok(n)
    }
}

#[async_trait]
impl OfferSink for JsonlOfferStore {
    async fn record(&self, offer: &Offer) -> Result<()> {
        self.append(offer)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
