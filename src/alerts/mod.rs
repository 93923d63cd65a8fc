//! 🚨 Alert engine
//!
//! Runs the rule set over each canonical transfer event:
//! - chat-announce-large: single event ≥ chat threshold → channel message
//! - push-large-single: single event ≥ push threshold → general push
//! - push-cumulative: sliding-window sum ≥ threshold → general push,
//!   suppressed by a per-(mint, direction) cooldown
//! - sequential-sells: five qualifying sells in a row → dedicated push
//!
//! Dispatches run in rule order; one rule failing to deliver never stops the
//! rest. A window-store failure aborts the remaining rules for that event
//! only.

use anyhow::Result;
use log::{debug, error, info};
use std::sync::Arc;

use crate::config::ThresholdConfig;
use crate::notifier::{
    chat_large_trade, push_cumulative, push_large_trade, push_sequential_sells, Notifier,
};
use crate::parser::TransferParser;
use crate::price::PriceOracle;
use crate::types::{short, EnhancedTransaction, TradeDirection, TransferEvent};
use crate::window_store::WindowStore;

/// Count at which the sequential-sells rule fires and resets.
const SEQUENTIAL_SELLS_TRIGGER: i64 = 5;

/// Which single-event rules fire for a resolved USD value. The chat and push
/// rules are independent; both may fire for the same event.
pub fn single_event_rules(usd: Option<f64>, thresholds: &ThresholdConfig) -> (bool, bool) {
    match usd {
        Some(v) => (
            v >= thresholds.chat_threshold_usd,
            v >= thresholds.single_threshold_usd,
        ),
        None => (false, false),
    }
}

/// What the sequential-sells rule does with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequentialAction {
    /// A buy wipes the wallet's streak
    Reset,
    /// A qualifying sell extends the streak
    Increment,
    /// Below threshold, unpriced, or rule disabled
    Ignore,
}

pub fn sequential_action(
    direction: TradeDirection,
    usd: Option<f64>,
    thresholds: &ThresholdConfig,
) -> SequentialAction {
    if !thresholds.five_sells_enabled {
        return SequentialAction::Ignore;
    }
    match direction {
        TradeDirection::Buy => SequentialAction::Reset,
        TradeDirection::Sell => match usd {
            Some(v) if v >= thresholds.five_sells_threshold_usd => SequentialAction::Increment,
            _ => SequentialAction::Ignore,
        },
    }
}

/// Cooldown key for the cumulative rule, per (mint, direction).
pub fn cumulative_cooldown_key(mint: &str, direction: TradeDirection) -> String {
    format!("{}:{}:cumulative", mint, direction.as_str())
}

pub struct AlertEngine {
    parser: TransferParser,
    oracle: Arc<PriceOracle>,
    store: WindowStore,
    notifier: Arc<Notifier>,
    thresholds: ThresholdConfig,
}

impl AlertEngine {
    pub fn new(
        parser: TransferParser,
        oracle: Arc<PriceOracle>,
        store: WindowStore,
        notifier: Arc<Notifier>,
        thresholds: ThresholdConfig,
    ) -> Self {
        Self {
            parser,
            oracle,
            store,
            notifier,
            thresholds,
        }
    }

    /// Process one webhook payload end-to-end.
    pub async fn handle_payload(&self, tx: &EnhancedTransaction) {
        for event in self.parser.parse(tx) {
            if let Err(e) = self.process_event(event).await {
                error!("❌ Event {} dropped: {:#}", short(&tx.signature), e);
            }
        }
    }

    /// Apply the rule set to one event. Errors mean the window store was
    /// unreachable; the event is dropped without further side effects.
    async fn process_event(&self, mut event: TransferEvent) -> Result<()> {
        event.usd_value = self
            .oracle
            .usd_value(&event.mint, event.amount, event.decimals)
            .await;

        debug!(
            "🔎 {} {} {} ({})",
            event.direction.as_str(),
            event.ui_amount(),
            short(&event.mint),
            event
                .usd_value
                .map(|v| format!("${:.2}", v))
                .unwrap_or_else(|| "unpriced".to_string()),
        );

        let (fire_chat, fire_push) = single_event_rules(event.usd_value, &self.thresholds);

        // Chat announcement, no cooldown
        if fire_chat {
            info!(
                "📢 Large {} ${:.2} announced for {}",
                event.direction.as_str(),
                event.usd_value.unwrap_or(0.0),
                short(&event.wallet)
            );
            let msg = chat_large_trade(&event, self.notifier.token_label());
            if let Err(e) = self.notifier.announce_chat(&msg).await {
                error!("❌ Chat dispatch failed: {:#}", e);
            }
        }

        // Single-event push, no cooldown
        if fire_push {
            let (title, body) = push_large_trade(&event, self.notifier.token_label());
            if let Err(e) = self.notifier.push_general(&title, &body).await {
                error!("❌ Large-single push dispatch failed: {:#}", e);
            }
        }

        // Cumulative window. The window update always happens for priced
        // events, including while the cooldown suppresses the notification.
        if let Some(usd) = event.usd_value {
            self.apply_cumulative_rule(&event, usd).await?;
        }

        // Sequential sells
        match sequential_action(event.direction, event.usd_value, &self.thresholds) {
            SequentialAction::Reset => {
                self.store.reset_sequential_sells(&event.wallet).await?;
            }
            SequentialAction::Increment => {
                let count = self.store.increment_sequential_sells(&event.wallet).await?;
                debug!(
                    "🧮 Sequential sells for {}: {}",
                    short(&event.wallet),
                    count
                );
                if count >= SEQUENTIAL_SELLS_TRIGGER {
                    info!(
                        "📢 Sequential-sells streak fired for {}",
                        short(&event.wallet)
                    );
                    let (title, body) =
                        push_sequential_sells(&event, count, self.notifier.token_label());
                    if let Err(e) = self.notifier.push_sequential_sells(&title, &body).await {
                        error!("❌ Sequential-sells push dispatch failed: {:#}", e);
                    }
                    self.store.reset_sequential_sells(&event.wallet).await?;
                }
            }
            SequentialAction::Ignore => {}
        }

        Ok(())
    }

    async fn apply_cumulative_rule(&self, event: &TransferEvent, usd: f64) -> Result<()> {
        let cumulative = self
            .store
            .add_amount_to_window(&event.mint, event.direction, usd, event.timestamp)
            .await?;

        if cumulative < self.thresholds.cumulative_threshold_usd {
            return Ok(());
        }

        let key = cumulative_cooldown_key(&event.mint, event.direction);
        if self.store.is_in_cooldown(&key).await? {
            debug!(
                "🔕 Cumulative alert suppressed for {}: ${:.2} inside cooldown",
                key, cumulative
            );
            return Ok(());
        }

        info!(
            "📢 Cumulative {} ${:.2} over {}s crossed the threshold",
            event.direction.as_str(),
            cumulative,
            self.thresholds.window_seconds
        );
        let (title, body) = push_cumulative(
            event,
            cumulative,
            self.thresholds.window_seconds,
            self.notifier.token_label(),
        );
        if let Err(e) = self.notifier.push_general(&title, &body).await {
            error!("❌ Cumulative push dispatch failed: {:#}", e);
        }

        self.store
            .set_cooldown(&key, self.thresholds.window_seconds)
            .await?;
        Ok(())
    }
}
