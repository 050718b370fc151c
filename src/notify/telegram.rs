use super::{Notification, Notifier};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub token: String,
    pub chat_id: String,
}

impl TelegramConfig {
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("TELEGRAM_TOKEN").ok()?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").ok()?;
        Some(Self { token, chat_id })
    }
}

pub struct TelegramNotifier {
    config: TelegramConfig,
    client: Client,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    fn format_text(notification: &Notification) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        format!(
            "<i>{}</i><pre>\n{}: \n{}</pre>",
            timestamp, notification.subject, notification.message
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.config.token
        );
        let text = Self::format_text(notification);
        let response = self
            .client
            .post(&url)
            .form(&[
                ("chat_id", self.config.chat_id.as_str()),
                ("text", text.as_str()),
                ("parse_mode", "HTML"),
            ])
            .send()
            .await
            .context("failed to reach the Telegram API")?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Telegram API returned HTTP {}",
                response.status()
            ));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}
