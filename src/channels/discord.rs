//! Discord webhook notification sink.

use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{env_parse_or, env_required};
use crate::error::{ConfigError, NotifyError};
use crate::pipeline::types::{Message, NotificationSink};

/// Discord webhook configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub webhook_url: SecretString,
    /// Display name of the posting bot.
    pub username: String,
    /// Number of people the bill is split between.
    pub split_ways: u32,
}

impl DiscordConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let split_ways = env_parse_or("BILL_SPLIT_WAYS", 2u32)?;
        if split_ways == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BILL_SPLIT_WAYS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            webhook_url: SecretString::from(env_required("BILL_DISCORD_WEBHOOK_URL")?),
            username: std::env::var("BILL_DISCORD_USERNAME").unwrap_or_else(|_| "Bill".to_string()),
            split_ways,
        })
    }
}

/// Posts each bill as a Discord embed.
pub struct DiscordNotifier {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Webhook body for one bill.
    pub fn payload(&self, message: &Message) -> serde_json::Value {
        let share = message.amount / Decimal::from(self.config.split_ways.max(1));
        serde_json::json!({
            "username": self.config.username,
            "embeds": [{
                "author": { "name": "New Bill" },
                "title": message.company,
                "description": message.subject,
                "fields": [
                    { "name": "Due Date", "value": message.date.format("%Y-%m-%d").to_string(), "inline": true },
                    { "name": "Amount", "value": format_money(message.amount), "inline": true },
                    { "name": "Split", "value": format_money(share), "inline": true },
                ],
            }],
        })
    }
}

/// `$X.XX`, rounding half away from zero.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("${rounded:.2}")
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send(&self, message: &Message, cancel: &CancellationToken) -> Result<(), NotifyError> {
        let request = self
            .client
            .post(self.config.webhook_url.expose_secret())
            .json(&self.payload(message))
            .send();

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(NotifyError::RequestFailed {
                    sink: "discord".into(),
                    reason: "cancelled".into(),
                });
            }
            result = request => result.map_err(|e| NotifyError::RequestFailed {
                sink: "discord".into(),
                reason: e.without_url().to_string(),
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected {
                sink: "discord".into(),
                status: status.as_u16(),
            });
        }

        debug!(company = %message.company, "Bill posted to Discord");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn notifier(split_ways: u32) -> DiscordNotifier {
        DiscordNotifier::new(DiscordConfig {
            webhook_url: SecretString::from("https://discord.example/api/webhooks/1/abc"),
            username: "Bill".into(),
            split_ways,
        })
    }

    fn bill(amount: Decimal) -> Message {
        Message {
            subject: "Electricity".into(),
            company: "PowerCo".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            amount,
        }
    }

    #[test]
    fn payload_has_embed_with_three_fields() {
        let payload = notifier(2).payload(&bill(dec!(120)));

        assert_eq!(payload["username"], "Bill");
        let embed = &payload["embeds"][0];
        assert_eq!(embed["author"]["name"], "New Bill");
        assert_eq!(embed["title"], "PowerCo");
        assert_eq!(embed["description"], "Electricity");

        let fields = embed["fields"].as_array().unwrap();
        assert_eq!(fields[0]["name"], "Due Date");
        assert_eq!(fields[0]["value"], "2024-03-01");
        assert_eq!(fields[1]["value"], "$120.00");
        assert_eq!(fields[2]["value"], "$60.00");
        assert!(fields.iter().all(|f| f["inline"] == true));
    }

    #[test]
    fn split_honors_configured_ways() {
        let payload = notifier(3).payload(&bill(dec!(90)));
        assert_eq!(payload["embeds"][0]["fields"][2]["value"], "$30.00");
    }

    #[test]
    fn money_rounds_half_away_from_zero() {
        assert_eq!(format_money(dec!(22.775)), "$22.78");
        assert_eq!(format_money(dec!(0)), "$0.00");
        assert_eq!(format_money(dec!(45.5)), "$45.50");
    }
}
