//! 🛰️ Wallet Tracker - On-chain event tracker
//!
//! Ingests enhanced-transaction webhooks for one configured token mint,
//! detects buys and sells, prices them in USD, evaluates the alert rules
//! over sliding windows, and fans notifications out to Telegram and
//! Pushover.
//!
//! ## Architecture
//! - Ingress (axum): POST /webhook, health, stats, admin provisioning
//! - Window store (Redis): atomic sliding-window sums, cooldowns, streaks
//! - Registry (SQLite): tracked wallets + notification subscriptions
//! - Price oracle: DEX pair quotes with a TTL cache
//! - Scheduler: periodic volume summaries to chat subscribers

use anyhow::{Context, Result};
use log::info;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use wallet_tracker::alerts::AlertEngine;
use wallet_tracker::config::Config;
use wallet_tracker::helius::HeliusClient;
use wallet_tracker::notifier::Notifier;
use wallet_tracker::parser::TransferParser;
use wallet_tracker::price::PriceOracle;
use wallet_tracker::pushover::PushoverClient;
use wallet_tracker::registry::Registry;
use wallet_tracker::scheduler::SummaryScheduler;
use wallet_tracker::server::{self, AppState};
use wallet_tracker::telegram::TelegramClient;
use wallet_tracker::window_store::WindowStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so the logger can honor its level
    dotenv::dotenv().ok();
    let config = Config::from_env().context("Failed to load configuration")?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.log_level.as_str()),
    )
    .init();

    config.validate().context("Invalid configuration")?;
    info!("✅ Configuration: Loaded");
    print_banner(&config);

    // Shared backends
    let store = WindowStore::connect(&config.redis.url, config.thresholds.window_seconds)
        .await
        .context("Failed to connect window store")?;
    let registry =
        Registry::new(&config.database.sqlite_path).context("Failed to open registry")?;

    // Pipeline components
    let oracle = Arc::new(PriceOracle::new(&config.price)?);
    let telegram = TelegramClient::new(&config.telegram)?;
    let pushover = PushoverClient::new(&config.pushover)?;
    let notifier = Arc::new(Notifier::new(
        telegram,
        pushover,
        registry.clone(),
        config.tracker.token_label.clone(),
    ));
    let parser = TransferParser::new(config.tracker.target_token_mint.clone());
    let engine = Arc::new(AlertEngine::new(
        parser,
        oracle.clone(),
        store.clone(),
        notifier.clone(),
        config.thresholds.clone(),
    ));
    let helius = Arc::new(HeliusClient::new(&config.helius)?);

    // Periodic summaries
    SummaryScheduler::new(
        store.clone(),
        notifier.clone(),
        config.tracker.target_token_mint.clone(),
    )
    .spawn();
    info!("✅ Scheduler: Summary jobs started");

    // Serve until shutdown
    let state = AppState {
        engine,
        store,
        oracle,
        registry,
        notifier,
        helius,
        thresholds: config.thresholds.clone(),
        target_mint: config.tracker.target_token_mint.clone(),
        in_flight: Arc::new(AtomicUsize::new(0)),
    };
    server::run(state, &config.server).await?;

    info!("👋 Shutdown complete");
    Ok(())
}

fn print_banner(config: &Config) {
    info!("🛰️  Wallet Tracker starting");
    info!("   🎯 Target mint: {}", config.tracker.target_token_mint);
    info!(
        "   💬 Chat alert ≥ ${:.0} | 📲 Push alert ≥ ${:.0}",
        config.thresholds.chat_threshold_usd, config.thresholds.single_threshold_usd
    );
    info!(
        "   📈 Cumulative ≥ ${:.0} over {}s",
        config.thresholds.cumulative_threshold_usd, config.thresholds.window_seconds
    );
    info!(
        "   🔁 Sequential sells: {} (≥ ${:.0} each)",
        if config.thresholds.five_sells_enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.thresholds.five_sells_threshold_usd
    );
    info!(
        "   💵 Price TTL: {}s ({})",
        config.price.price_ttl_secs, config.price.quote_endpoint
    );
    info!(
        "   🌐 Ingress: {}:{}",
        config.server.bind_address, config.server.port
    );
}
