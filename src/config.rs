//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, bot tokens) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::FlightError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub scan: ScanSettings,
    #[serde(default)]
    pub sniper: SniperConfig,
    pub amadeus: AmadeusConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Origin used for manual runs and for targets that omit one.
    pub default_origin: String,
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanSettings {
    pub interval_secs: u64,
    /// Delay between consecutive lookups within one destination.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// How many destinations may be scanned at once.
    #[serde(default = "default_concurrency")]
    pub max_concurrent_destinations: usize,
    #[serde(default)]
    pub grid: GridSettings,
}

/// Shape of the departure/return date grid.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GridSettings {
    pub nearest_days: i64,
    pub furthest_days: i64,
    pub step_days: i64,
    pub return_offsets: Vec<i64>,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            nearest_days: 30,
            furthest_days: 180,
            step_days: 14,
            return_offsets: vec![7, 10, 14],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SniperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub initial_delay_secs: u64,
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 6 * 60 * 60,
            initial_delay_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AmadeusConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    #[serde(default = "default_max_offers")]
    pub max_offers: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub targets_file: String,
    pub offers_file: String,
    pub alerts_file: String,
}

impl StorageConfig {
    pub fn targets_path(&self) -> PathBuf {
        self.data_dir.join(&self.targets_file)
    }

    pub fn offers_path(&self) -> PathBuf {
        self.data_dir.join(&self.offers_file)
    }

    pub fn alerts_path(&self) -> PathBuf {
        self.data_dir.join(&self.alerts_file)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
    /// Push every offer recorded by a run to Telegram.
    #[serde(default)]
    pub notify_offers: bool,
}

fn default_pacing_ms() -> u64 {
    300
}

fn default_concurrency() -> usize {
    1
}

fn default_max_offers() -> u32 {
    5
}

fn default_timeout_secs() -> u64 {
    25
}

impl ScanSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        if config.scan.interval_secs == 0 {
            return Err(FlightError::Config("scan.interval_secs must be positive".into()).into());
        }
        if config.scan.max_concurrent_destinations == 0 {
            return Err(FlightError::Config("scan.max_concurrent_destinations must be at least 1".into()).into());
        }
        if config.scan.grid.step_days <= 0 {
            return Err(FlightError::Config("scan.grid.step_days must be positive".into()).into());
        }
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve an environment variable holding a secret.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }
}
