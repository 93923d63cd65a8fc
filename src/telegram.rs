//! 📱 Telegram chat client
//!
//! Sends alert announcements to the configured channel and periodic summary
//! DMs to individual subscribers. Messages are HTML-formatted and paced so a
//! webhook burst doesn't trip the bot API's flood control.

use anyhow::Result;
use reqwest::Client;
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::TelegramConfig;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Minimum spacing between two outgoing messages.
const MIN_SEND_GAP: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

pub struct TelegramClient {
    client: Client,
    bot_token: String,
    chat_id: String,
    /// Earliest instant the next message may go out
    next_send: Mutex<Instant>,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        Ok(TelegramClient {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            next_send: Mutex::new(Instant::now()),
        })
    }

    /// False when credentials are absent; sends become warn-and-skip upstream.
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    /// Announce to the configured alert channel.
    pub async fn send_channel(&self, text: &str) -> Result<()> {
        self.send_to(self.chat_id.as_str(), text).await
    }

    /// DM one user (periodic summaries).
    pub async fn send_direct(&self, user_id: i64, text: &str) -> Result<()> {
        self.send_to(&user_id.to_string(), text).await
    }

    /// Reserve the next send slot, then sleep until it arrives. Concurrent
    /// callers each get their own slot, MIN_SEND_GAP apart.
    async fn pace(&self) {
        let wait = {
            let mut next = self.next_send.lock().await;
            let now = Instant::now();
            let wait = next.saturating_duration_since(now);
            *next = now.max(*next) + MIN_SEND_GAP;
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn send_to(&self, chat_id: &str, text: &str) -> Result<()> {
        self.pace().await;

        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = response.text().await.unwrap_or_default();
        anyhow::bail!("Telegram API returned {}: {}", status, detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: &str, chat: &str) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.to_string(),
            chat_id: chat.to_string(),
            admin_user_ids: vec![],
        }
    }

    #[test]
    fn test_is_configured() {
        assert!(TelegramClient::new(&config("t", "c")).unwrap().is_configured());
        assert!(!TelegramClient::new(&config("", "c")).unwrap().is_configured());
        assert!(!TelegramClient::new(&config("t", "")).unwrap().is_configured());
    }

    #[tokio::test]
    async fn test_pace_spaces_consecutive_sends() {
        let client = TelegramClient::new(&config("t", "c")).unwrap();

        let start = Instant::now();
        client.pace().await;
        client.pace().await;

        // The second slot sits at least one gap after the first
        assert!(start.elapsed() >= MIN_SEND_GAP);
    }

    #[test]
    fn test_request_wire_shape() {
        let request = SendMessageRequest {
            chat_id: "42",
            text: "hello",
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let raw = serde_json::to_value(&request).unwrap();
        assert_eq!(raw["chat_id"], "42");
        assert_eq!(raw["parse_mode"], "HTML");
        assert_eq!(raw["disable_web_page_preview"], true);
    }
}
