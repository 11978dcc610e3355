//! Scan target loading.
//!
//! Targets live in a TOML file:
//!
//! ```toml
//! [[destination]]
//! origin = "FOR"          # optional, falls back to the default origin
//! destination = "LIS"
//! baseline = "3.450,00"   # number or pt-BR formatted string
//!
//! [airports]
//! LIS = "Lisboa"
//! ```
//!
//! A bad baseline never drops the target: it gets the sentinel baseline
//! so the scan simply never records anything for it.

use anyhow::{Context, Result};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::types::DestinationTarget;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBaseline {
    Integer(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    #[serde(default)]
    origin: Option<String>,
    destination: String,
    #[serde(default)]
    baseline: Option<RawBaseline>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTargetsFile {
    #[serde(default)]
    destination: Vec<RawTarget>,
    #[serde(default)]
    airports: HashMap<String, String>,
}

/// Parsed contents of the targets file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetsFile {
    pub targets: Vec<DestinationTarget>,
    /// IATA code → display name.
    pub airports: HashMap<String, String>,
}

impl TargetsFile {
    /// Parse targets from TOML text.
    pub fn from_toml(contents: &str, default_origin: &str) -> Result<Self> {
        let raw: RawTargetsFile = toml::from_str(contents).context("Invalid targets file")?;

        let targets = raw
            .destination
            .into_iter()
            .filter_map(|t| normalize_target(t, default_origin))
            .collect();

        let airports = raw
            .airports
            .into_iter()
            .map(|(code, name)| (code.trim().to_uppercase(), name.trim().to_string()))
            .filter(|(code, name)| !code.is_empty() && !name.is_empty())
            .collect();

        Ok(Self { targets, airports })
    }

    /// Display name for an airport code, or the code itself.
    pub fn airport_name<'a>(&'a self, code: &'a str) -> &'a str {
        self.airports
            .get(&code.to_uppercase())
            .map(String::as_str)
            .unwrap_or(code)
    }
}

fn normalize_target(raw: RawTarget, default_origin: &str) -> Option<DestinationTarget> {
    let destination = raw.destination.trim();
    if destination.is_empty() {
        warn!("Skipping target with empty destination");
        return None;
    }

    let origin = raw
        .origin
        .as_deref()
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .unwrap_or(default_origin);

    match raw.baseline.as_ref().and_then(baseline_value) {
        Some(baseline) => Some(DestinationTarget::new(origin, destination, baseline)),
        None => {
            warn!(
                origin,
                destination,
                raw = ?raw.baseline,
                "Unreadable baseline, using sentinel"
            );
            Some(DestinationTarget::unreadable_baseline(origin, destination))
        }
    }
}

fn baseline_value(raw: &RawBaseline) -> Option<Decimal> {
    let value = match raw {
        RawBaseline::Integer(i) => Some(Decimal::from(*i)),
        RawBaseline::Float(f) => Decimal::from_f64(*f),
        RawBaseline::Text(s) => parse_baseline(s),
    }?;
    (value > Decimal::ZERO).then_some(value)
}

/// Parse a price string. A comma marks pt-BR formatting (`1.234,56`);
/// otherwise the text is read as a plain decimal (`1234.56`).
pub fn parse_baseline(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };

    Decimal::from_str(&normalized).ok()
}

/// Load targets from disk. A missing file yields no targets.
pub fn load_targets(path: &Path, default_origin: &str) -> Result<TargetsFile> {
    if !path.exists() {
        warn!(path = %path.display(), "Targets file not found");
        return Ok(TargetsFile::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read targets from {}", path.display()))?;
    let file = TargetsFile::from_toml(&contents, default_origin)
        .with_context(|| format!("Failed to parse targets from {}", path.display()))?;

    info!(
        path = %path.display(),
        targets = file.targets.len(),
        airports = file.airports.len(),
        "Targets loaded"
    );
    Ok(file)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
