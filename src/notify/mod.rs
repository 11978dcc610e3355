//! Outbound notifications.
//!
//! Message formatting lives here so every channel renders offers and
//! sniper hits the same way. Channels only deliver text.

pub mod telegram;

pub use telegram::TelegramNotifier;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::storage::TargetsFile;
use crate::types::{google_flights_link, FixedAlert, Offer, PriceQuote, ScanMode};

/// A delivery channel for plain-text (Markdown) messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;

    /// Channel name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Render an amount for humans. BRL uses pt-BR separators (`R$ 1.234,56`),
/// everything else `CUR 1,234.56`.
pub fn format_price(amount: Decimal, currency: &str) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };

    if currency.eq_ignore_ascii_case("BRL") {
        format!("R$ {sign}{},{frac_part}", group_thousands(int_part, '.'))
    } else {
        format!(
            "{} {sign}{}.{frac_part}",
            currency.to_uppercase(),
            group_thousands(int_part, ',')
        )
    }
}

fn group_thousands(digits: &str, sep: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

/// `dd/mm/yyyy`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

fn route_line(label: &str, code: &str, airports: Option<&TargetsFile>) -> String {
    match airports.map(|a| a.airport_name(code)) {
        Some(name) if name != code => format!("📍 *{label}:* {code} - {name}"),
        _ => format!("📍 *{label}:* {code}"),
    }
}

/// Message announcing a recorded offer.
pub fn offer_message(offer: &Offer, airports: Option<&TargetsFile>) -> String {
    let mut text = String::from("✈️ *Fare opportunity*\n\n");
    text.push_str(&route_line("From", &offer.origin, airports));
    text.push('\n');
    text.push_str(&route_line("To", &offer.destination, airports));
    text.push_str("\n\n");
    text.push_str(&format!("📅 *Depart:* {}\n", format_date(offer.depart_date)));
    if let Some(r) = offer.return_date {
        text.push_str(&format!("📅 *Return:* {}\n", format_date(r)));
    }
    text.push_str(&format!(
        "\n💰 *Total:* {}\n",
        format_price(offer.price, &offer.currency)
    ));
    if offer.mode == ScanMode::Auto && offer.savings() > Decimal::ZERO {
        text.push_str(&format!(
            "📉 {} below the usual {}\n",
            format_price(offer.savings(), &offer.currency),
            format_price(offer.baseline, &offer.currency)
        ));
    }
    text.push_str(&format!("\n🔗 {}", offer.link));
    text
}

/// Message for a fixed alert whose target price was reached.
pub fn sniper_message(alert: &FixedAlert, quote: &PriceQuote) -> String {
    let mut text = format!(
        "🎯 *Price alert reached!*\n\n✈️ *{} ➔ {}*\n📅 Depart: {}\n",
        alert.origin,
        alert.destination,
        format_date(alert.depart_date)
    );
    if let Some(r) = alert.return_date {
        text.push_str(&format!("📅 Return: {}\n", format_date(r)));
    }
    text.push_str(&format!(
        "💰 *Found: {}*\n📉 Target was {}\n\n🔗 {}",
        format_price(quote.price, &quote.currency),
        format_price(alert.target_price, &quote.currency),
        google_flights_link(&alert.origin, &alert.destination, &quote.currency)
    ));
    text
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
