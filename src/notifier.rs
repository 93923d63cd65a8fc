//! Notification dispatcher
//!
//! Formats alert messages and fans them out: channel announcements via
//! Telegram, per-subscriber push via Pushover, summary DMs per chat
//! subscriber. Per-subscriber sends run concurrently; one failure is logged
//! with the subscriber id and never aborts the siblings.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use log::{error, info, warn};

use crate::pushover::PushoverClient;
use crate::registry::{PushSubscription, Registry};
use crate::telegram::TelegramClient;
use crate::types::{short, TradeDirection, TransferEvent};

fn usd_str(usd: Option<f64>) -> String {
    match usd {
        Some(v) => format!("${:.2}", v),
        None => "n/a".to_string(),
    }
}

fn time_str(unix_secs: u64) -> String {
    match Utc.timestamp_opt(unix_secs as i64, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => unix_secs.to_string(),
    }
}

/// Channel announcement for a single large trade.
pub fn chat_large_trade(event: &TransferEvent, token_label: &str) -> String {
    format!(
        "{} <b>Large {}</b>\n\n\
        Amount: {:.2} {} ({})\n\
        Wallet: <code>{}</code>\n\
        Tx: <a href=\"https://solscan.io/tx/{}\">{}</a>\n\
        Time: {}",
        event.direction.symbol(),
        event.direction.as_str().to_uppercase(),
        event.ui_amount(),
        token_label,
        usd_str(event.usd_value),
        short(&event.wallet),
        event.signature,
        short(&event.signature),
        time_str(event.timestamp),
    )
}

/// Push title/body for a single large trade.
pub fn push_large_trade(event: &TransferEvent, token_label: &str) -> (String, String) {
    (
        format!("Large {} alert", event.direction.as_str()),
        format!(
            "{} {} {:.2} {} ({}) at {}",
            short(&event.wallet),
            match event.direction {
                TradeDirection::Buy => "bought",
                TradeDirection::Sell => "sold",
            },
            event.ui_amount(),
            token_label,
            usd_str(event.usd_value),
            time_str(event.timestamp),
        ),
    )
}

/// Push title/body when the sliding-window cumulative crosses the threshold.
pub fn push_cumulative(
    event: &TransferEvent,
    cumulative_usd: f64,
    window_seconds: u64,
    token_label: &str,
) -> (String, String) {
    (
        format!("Cumulative {} volume", event.direction.as_str()),
        format!(
            "${:.2} of {} {}s in the last {} min. Latest: {} {:.2} ({})",
            cumulative_usd,
            token_label,
            event.direction.as_str(),
            window_seconds / 60,
            short(&event.wallet),
            event.ui_amount(),
            usd_str(event.usd_value),
        ),
    )
}

/// Push title/body for a completed sequential-sells streak.
pub fn push_sequential_sells(
    event: &TransferEvent,
    streak: i64,
    token_label: &str,
) -> (String, String) {
    (
        "Sequential sells".to_string(),
        format!(
            "{} made {} consecutive sells above the threshold. Latest: {:.2} {} ({}) at {}",
            short(&event.wallet),
            streak,
            event.ui_amount(),
            token_label,
            usd_str(event.usd_value),
            time_str(event.timestamp),
        ),
    )
}

/// Periodic summary DM body.
pub fn summary_message(
    period_seconds: u64,
    buys_usd: f64,
    sells_usd: f64,
    token_label: &str,
) -> String {
    format!(
        "📊 <b>{} summary (last {} min)</b>\n\n\
        🟢 Buys: ${:.2}\n\
        🔴 Sells: ${:.2}\n\
        Net: ${:+.2}",
        token_label,
        period_seconds / 60,
        buys_usd,
        sells_usd,
        buys_usd - sells_usd,
    )
}

pub struct Notifier {
    telegram: TelegramClient,
    pushover: PushoverClient,
    registry: Registry,
    token_label: String,
}

impl Notifier {
    pub fn new(
        telegram: TelegramClient,
        pushover: PushoverClient,
        registry: Registry,
        token_label: String,
    ) -> Self {
        Self {
            telegram,
            pushover,
            registry,
            token_label,
        }
    }

    pub fn token_label(&self) -> &str {
        &self.token_label
    }

    /// Announce to the alert channel. Missing credentials downgrade to a warn.
    pub async fn announce_chat(&self, text: &str) -> Result<()> {
        if !self.telegram.is_configured() {
            warn!("⚠️  Telegram not configured, dropping channel announcement");
            return Ok(());
        }
        self.telegram.send_channel(text).await
    }

    /// Fan out one push to every general subscriber. Returns delivered count.
    pub async fn push_general(&self, title: &str, body: &str) -> Result<usize> {
        let subs = self.registry.subscribers_general()?;
        Ok(self.fan_out_push(subs, title, body).await)
    }

    /// Fan out one push to every sequential-sells subscriber.
    pub async fn push_sequential_sells(&self, title: &str, body: &str) -> Result<usize> {
        let subs = self.registry.subscribers_sequential_sells()?;
        Ok(self.fan_out_push(subs, title, body).await)
    }

    /// DM every chat subscriber (periodic summaries). Returns delivered count.
    pub async fn dm_chat_subscribers(&self, text: &str) -> Result<usize> {
        if !self.telegram.is_configured() {
            warn!("⚠️  Telegram not configured, dropping summary DMs");
            return Ok(0);
        }

        let user_ids = self.registry.chat_subscribers()?;
        let sends = user_ids
            .iter()
            .map(|&user_id| async move { (user_id, self.telegram.send_direct(user_id, text).await) });

        let mut delivered = 0;
        for (user_id, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => error!("❌ Summary DM to {} failed: {:#}", user_id, e),
            }
        }
        Ok(delivered)
    }

    /// Canned message to each channel; returns per-channel success flags
    /// (chat, push).
    pub async fn send_test(&self) -> (bool, bool) {
        let chat_ok = match self.announce_chat("🔔 Test notification from wallet-tracker").await {
            Ok(()) => true,
            Err(e) => {
                error!("❌ Test chat message failed: {:#}", e);
                false
            }
        };

        let push_ok = match self.registry.subscribers_general() {
            Ok(subs) => match subs.first() {
                Some(sub) => match self
                    .pushover
                    .send(&sub.push_key, "Test notification", "wallet-tracker test push")
                    .await
                {
                    Ok(()) => true,
                    Err(e) => {
                        error!("❌ Test push to {} failed: {:#}", sub.user_id, e);
                        false
                    }
                },
                None => {
                    info!("No push subscribers to test against");
                    false
                }
            },
            Err(e) => {
                error!("❌ Reading subscribers failed: {:#}", e);
                false
            }
        };

        (chat_ok, push_ok)
    }

    async fn fan_out_push(&self, subs: Vec<PushSubscription>, title: &str, body: &str) -> usize {
        if !self.pushover.is_configured() {
            warn!("⚠️  Pushover not configured, dropping {} pushes", subs.len());
            return 0;
        }

        let sends = subs.iter().map(|sub| async move {
            (
                sub.user_id,
                self.pushover.send(&sub.push_key, title, body).await,
            )
        });

        let mut delivered = 0;
        for (user_id, result) in join_all(sends).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => error!("❌ Push to {} failed: {:#}", user_id, e),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(direction: TradeDirection, usd: Option<f64>) -> TransferEvent {
        TransferEvent {
            wallet: "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU".to_string(),
            mint: "M".to_string(),
            amount: 1_500_000_000,
            decimals: 9,
            signature: "5ZkV8iY1sig".to_string(),
            timestamp: 1_700_000_000,
            direction,
            usd_value: usd,
        }
    }

    #[test]
    fn test_chat_large_trade_fields() {
        let msg = chat_large_trade(&event(TradeDirection::Buy, Some(512.3)), "BONK");
        assert!(msg.contains("🟢"));
        assert!(msg.contains("Large BUY"));
        assert!(msg.contains("$512.30"));
        assert!(msg.contains("1.50 BONK"));
        assert!(msg.contains("solscan.io/tx/5ZkV8iY1sig"));
        assert!(msg.contains("7xKXtg..gAsU"));
    }

    #[test]
    fn test_push_large_trade_direction_verbs() {
        let (title, body) = push_large_trade(&event(TradeDirection::Sell, Some(400.0)), "BONK");
        assert_eq!(title, "Large sell alert");
        assert!(body.contains("sold"));
        assert!(body.contains("$400.00"));
    }

    #[test]
    fn test_push_cumulative_window_minutes() {
        let (title, body) =
            push_cumulative(&event(TradeDirection::Buy, Some(150.0)), 350.0, 3600, "BONK");
        assert!(title.contains("buy"));
        assert!(body.contains("$350.00"));
        assert!(body.contains("60 min"));
    }

    #[test]
    fn test_push_sequential_sells_mentions_streak() {
        let (title, body) =
            push_sequential_sells(&event(TradeDirection::Sell, Some(350.0)), 5, "BONK");
        assert_eq!(title, "Sequential sells");
        assert!(body.contains("5 consecutive sells"));
    }

    #[test]
    fn test_summary_message_net() {
        let msg = summary_message(1800, 1000.0, 250.0, "BONK");
        assert!(msg.contains("30 min"));
        assert!(msg.contains("$1000.00"));
        assert!(msg.contains("$250.00"));
        assert!(msg.contains("+750.00"));
    }

    #[test]
    fn test_missing_usd_renders_na() {
        let msg = chat_large_trade(&event(TradeDirection::Buy, None), "BONK");
        assert!(msg.contains("n/a"));
    }
}
