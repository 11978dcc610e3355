//! Telegram Bot API channel.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::Notifier;
use crate::config::{AlertsConfig, AppConfig};
use crate::types::FlightError;

const API_BASE: &str = "https://api.telegram.org";
const CHANNEL_NAME: &str = "telegram";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

pub struct TelegramNotifier {
    http: Client,
    api_base: String,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: String) -> Result<Self> {
        Self::with_api_base(API_BASE, bot_token, chat_id)
    }

    pub fn with_api_base(api_base: &str, bot_token: SecretString, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for Telegram")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    /// Build from the env vars named in config. Returns `None` (with a
    /// warning) when either is unset, leaving notifications disabled.
    pub fn from_config(cfg: &AlertsConfig) -> Option<Self> {
        let (Some(token_env), Some(chat_env)) = (
            cfg.telegram_bot_token_env.as_deref(),
            cfg.telegram_chat_id_env.as_deref(),
        ) else {
            warn!("Telegram not configured, notifications disabled");
            return None;
        };

        let token = AppConfig::resolve_secret(token_env);
        let chat_id = AppConfig::resolve_env(chat_env);
        match (token, chat_id) {
            (Ok(token), Ok(chat_id)) if !chat_id.trim().is_empty() => {
                match Self::new(token, chat_id.trim().to_string()) {
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!(error = %e, "Telegram client unavailable, notifications disabled");
                        None
                    }
                }
            }
            _ => {
                warn!(
                    token_env,
                    chat_env, "Telegram credentials missing, notifications disabled"
                );
                None
            }
        }
    }

    fn send_url(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    fn request<'a>(&'a self, text: &'a str) -> SendMessageRequest<'a> {
        SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: true,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.send_url())
            .json(&self.request(text))
            .send()
            .await
            .map_err(|e| FlightError::Notify {
                channel: CHANNEL_NAME.to_string(),
                // Strip the URL: it carries the bot token
                message: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FlightError::Notify {
                channel: CHANNEL_NAME.to_string(),
                message: format!("{status}: {body}"),
            }
            .into());
        }

        debug!(chat_id = %self.chat_id, chars = text.len(), "Telegram message sent");
        Ok(())
    }

    fn name(&self) -> &str {
        CHANNEL_NAME
    }
}
