//! Amadeus Self-Service flight-offers integration.
//!
//! API docs: https://developers.amadeus.com/self-service/category/flights
//! Base URL: https://api.amadeus.com (test: https://test.api.amadeus.com)
//! Auth: OAuth2 client credentials → `Authorization: Bearer {token}`.
//!
//! Only the cheapest (first) offer of each search is used. Its price is
//! normalized here so the scan engine only ever sees one canonical value.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::PriceLookup;
use crate::config::AmadeusConfig;
use crate::types::{FlightError, PriceQuote};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PROVIDER_NAME: &str = "amadeus";
const TOKEN_PATH: &str = "/v1/security/oauth2/token";
const OFFERS_PATH: &str = "/v2/shopping/flight-offers";

/// Refresh the token this long before Amadeus says it expires.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OffersResponse {
    #[serde(default)]
    data: Vec<FlightOffer>,
}

#[derive(Debug, Deserialize)]
struct FlightOffer {
    #[serde(default)]
    price: Option<OfferPrice>,
}

/// Amadeus reports amounts as decimal strings under several names.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferPrice {
    #[serde(default)]
    grand_total: Option<String>,
    #[serde(default)]
    total: Option<String>,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    currency: Option<String>,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Amadeus flight-offers client with a cached access token.
pub struct AmadeusClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: SecretString,
    currency: String,
    max_offers: u32,
    token: RwLock<Option<CachedToken>>,
}

impl AmadeusClient {
    /// Create a client from config, resolving credentials from the
    /// environment variables the config names.
    pub fn from_config(cfg: &AmadeusConfig, currency: &str) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .with_context(|| format!("{} environment variable not set", cfg.api_key_env))?;
        let api_secret = std::env::var(&cfg.api_secret_env)
            .with_context(|| format!("{} environment variable not set", cfg.api_secret_env))?;

        Self::with_credentials(
            &cfg.base_url,
            api_key,
            SecretString::new(api_secret),
            currency,
            cfg.max_offers,
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    /// Create a client with explicit credentials.
    pub fn with_credentials(
        base_url: &str,
        api_key: String,
        api_secret: SecretString,
        currency: &str,
        max_offers: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("FARERADAR/0.1.0 (flight-deal-monitor)")
            .build()
            .context("Failed to build HTTP client for Amadeus")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            currency: currency.to_string(),
            max_offers,
            token: RwLock::new(None),
        })
    }

    // -- Authentication ----------------------------------------------------

    /// Request a fresh access token and cache it.
    async fn authenticate(&self) -> Result<String> {
        debug!("Requesting Amadeus access token");

        let resp = self
            .http
            .post(format!("{}{TOKEN_PATH}", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.api_key.as_str()),
                ("client_secret", self.api_secret.expose_secret().as_str()),
            ])
            .send()
            .await
            .context("Amadeus token request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Amadeus token request rejected {status}: {body}");
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse Amadeus token response")?;

        let lifetime = token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        {
            let mut guard = self
                .token
                .write()
                .map_err(|_| anyhow::anyhow!("Amadeus token lock poisoned"))?;
            *guard = Some(CachedToken {
                token: token.access_token.clone(),
                expires_at: Instant::now() + Duration::from_secs(lifetime),
            });
        }

        info!(expires_in = token.expires_in, "Amadeus token acquired");
        Ok(token.access_token)
    }

    /// Get a valid token, authenticating if the cached one is missing or stale.
    async fn ensure_token(&self) -> Result<String> {
        {
            let guard = self
                .token
                .read()
                .map_err(|_| anyhow::anyhow!("Amadeus token lock poisoned"))?;
            if let Some(cached) = guard.as_ref() {
                if Instant::now() < cached.expires_at {
                    return Ok(cached.token.clone());
                }
            }
        }
        self.authenticate().await
    }

    fn invalidate_token(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    /// Verify credentials by forcing a token request.
    pub async fn check_auth(&self) -> Result<()> {
        self.invalidate_token();
        self.authenticate().await.map(|_| ())
    }

    // -- Search ------------------------------------------------------------

    fn search_params(
        &self,
        origin: &str,
        destination: &str,
        depart: NaiveDate,
        return_date: Option<NaiveDate>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("originLocationCode", origin.to_string()),
            ("destinationLocationCode", destination.to_string()),
            ("departureDate", depart.format("%Y-%m-%d").to_string()),
            ("adults", "1".to_string()),
            ("currencyCode", self.currency.clone()),
            ("max", self.max_offers.to_string()),
        ];
        if let Some(r) = return_date {
            params.push(("returnDate", r.format("%Y-%m-%d").to_string()));
        }
        params
    }

    async fn send_search(
        &self,
        token: &str,
        params: &[(&'static str, String)],
    ) -> Result<reqwest::Response> {
        self.http
            .get(format!("{}{OFFERS_PATH}", self.base_url))
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .context("Amadeus flight-offers request failed")
    }

    /// Reduce a flight-offers payload to a single quote.
    fn quote_from_response(&self, body: OffersResponse) -> Option<PriceQuote> {
        let price = body.data.into_iter().next()?.price?;
        let amount = normalize_price(&price)?;
        let currency = price.currency.unwrap_or_else(|| self.currency.clone());
        Some(PriceQuote { price: amount, currency })
    }
}

/// Pick the canonical amount from an Amadeus price block:
/// `grandTotal`, then `total`, then `base`. Non-positive or unparseable
/// amounts count as no price.
fn normalize_price(price: &OfferPrice) -> Option<Decimal> {
    [&price.grand_total, &price.total, &price.base]
        .into_iter()
        .flatten()
        .find_map(|raw| Decimal::from_str(raw.trim()).ok())
        .filter(|amount| amount.is_sign_positive() && !amount.is_zero())
}

// ---------------------------------------------------------------------------
// PriceLookup trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PriceLookup for AmadeusClient {
    async fn price_for(
        &self,
        origin: &str,
        destination: &str,
        depart: NaiveDate,
        return_date: Option<NaiveDate>,
    ) -> Result<Option<PriceQuote>> {
        let params = self.search_params(origin, destination, depart, return_date);
        let token = self.ensure_token().await?;
        let mut resp = self.send_search(&token, &params).await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            // Token revoked early, re-authenticate and retry once
            warn!("Amadeus token rejected, re-authenticating...");
            self.invalidate_token();
            let token = self.ensure_token().await?;
            resp = self.send_search(&token, &params).await?;
        }

        if resp.status() == StatusCode::NOT_FOUND {
            debug!(origin, destination, %depart, "Amadeus returned no offers");
            return Ok(None);
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(FlightError::Lookup {
                provider: PROVIDER_NAME.to_string(),
                message: format!("flight-offers {status}: {body}"),
            }
            .into());
        }

        let body: OffersResponse = resp
            .json()
            .await
            .context("Failed to parse Amadeus flight-offers response")?;

        Ok(self.quote_from_response(body))
    }

    async fn check_credentials(&self) -> Result<()> {
        self.check_auth().await
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
