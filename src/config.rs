//! Configuration management for the tracker service
//!
//! Loads configuration from environment variables (via .env file) and provides
//! validated, type-safe access to all service parameters. Components receive
//! the sections they need explicitly so tests can override per-instance.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Complete configuration for the tracker service
#[derive(Debug, Clone)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub thresholds: ThresholdConfig,
    pub price: PriceConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub pushover: PushoverConfig,
    pub helius: HeliusConfig,
    pub logging: LoggingConfig,
}

/// What the pipeline watches
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Token mint the pipeline watches (required)
    pub target_token_mint: String,
    /// Human-readable token label for messages
    pub token_label: String,
}

/// Alert rule thresholds
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Single-event USD threshold for the chat announcement
    pub chat_threshold_usd: f64,
    /// Single-event USD threshold for general push
    pub single_threshold_usd: f64,
    /// Sliding-window cumulative USD threshold
    pub cumulative_threshold_usd: f64,
    /// Sliding window length (seconds), also the cumulative cooldown
    pub window_seconds: u64,
    /// Minimum USD value for a sell to count toward the streak
    pub five_sells_threshold_usd: f64,
    /// Whether the sequential-sells rule runs at all
    pub five_sells_enabled: bool,
}

/// Price oracle configuration
#[derive(Debug, Clone)]
pub struct PriceConfig {
    /// Quote cache TTL (seconds)
    pub price_ttl_secs: u64,
    /// DEX quote endpoint; the mint is appended as a path segment
    pub quote_endpoint: String,
    /// Hard timeout on quote fetches (seconds)
    pub quote_timeout_secs: u64,
}

/// Window-store connection parameters
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Registry storage
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub sqlite_path: PathBuf,
}

/// HTTP ingress
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Bounded drain window for in-flight pipeline tasks on shutdown (seconds)
    pub shutdown_drain_secs: u64,
}

/// Chat channel credentials
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Channel all rule alerts are announced to
    pub chat_id: String,
    /// Administrator user ids for the bot command surface
    pub admin_user_ids: Vec<i64>,
}

/// Mobile push credentials
#[derive(Debug, Clone)]
pub struct PushoverConfig {
    pub app_token: String,
}

/// Upstream enhanced-transaction provider (webhook provisioning)
#[derive(Debug, Clone)]
pub struct HeliusConfig {
    pub api_key: String,
    /// URL the provider will POST webhook batches to
    pub webhook_callback_url: String,
    pub api_base: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Expects a .env file in the working directory or environment variables
    /// to be set. Returns an error if values fail to parse.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (ignoring error if not found)
        let _ = dotenv::dotenv();

        Ok(Config {
            tracker: TrackerConfig {
                target_token_mint: get_env_string("TARGET_TOKEN_MINT", "")?,
                token_label: get_env_string("TOKEN_LABEL", "tokens")?,
            },
            thresholds: ThresholdConfig {
                chat_threshold_usd: get_env_f64("CHAT_THRESHOLD_USD", 500.0)?,
                single_threshold_usd: get_env_f64("SINGLE_THRESHOLD_USD", 300.0)?,
                cumulative_threshold_usd: get_env_f64("CUMULATIVE_THRESHOLD_USD", 300.0)?,
                window_seconds: get_env_u64("WINDOW_SECONDS", 3600)?,
                five_sells_threshold_usd: get_env_f64("FIVE_SELLS_THRESHOLD_USD", 300.0)?,
                five_sells_enabled: get_env_bool("FIVE_SELLS_ENABLED", true)?,
            },
            price: PriceConfig {
                price_ttl_secs: get_env_u64("PRICE_TTL_SECS", 60)?,
                quote_endpoint: get_env_string(
                    "QUOTE_ENDPOINT",
                    "https://api.dexscreener.com/latest/dex/tokens",
                )?,
                quote_timeout_secs: get_env_u64("QUOTE_TIMEOUT_SECS", 5)?,
            },
            redis: RedisConfig {
                url: get_env_string("REDIS_URL", "redis://127.0.0.1:6379")?,
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from(get_env_string(
                    "SQLITE_PATH",
                    "./data/wallet_tracker.db",
                )?),
            },
            server: ServerConfig {
                bind_address: get_env_string("BIND_ADDRESS", "0.0.0.0")?,
                port: get_env_u16("PORT", 3000)?,
                shutdown_drain_secs: get_env_u64("SHUTDOWN_DRAIN_SECS", 30)?,
            },
            telegram: TelegramConfig {
                bot_token: get_env_string("TELEGRAM_BOT_TOKEN", "")?,
                chat_id: get_env_string("TELEGRAM_CHAT_ID", "")?,
                admin_user_ids: get_env_i64_list("TELEGRAM_ADMIN_IDS")?,
            },
            pushover: PushoverConfig {
                app_token: get_env_string("PUSHOVER_APP_TOKEN", "")?,
            },
            helius: HeliusConfig {
                api_key: get_env_string("HELIUS_API_KEY", "")?,
                webhook_callback_url: get_env_string("WEBHOOK_CALLBACK_URL", "")?,
                api_base: get_env_string("HELIUS_API_BASE", "https://api.helius.xyz")?,
            },
            logging: LoggingConfig {
                log_level: get_env_string("LOG_LEVEL", "info")?,
            },
        })
    }

    /// Validate configuration values are within acceptable ranges
    ///
    /// Startup is aborted when this fails.
    pub fn validate(&self) -> Result<()> {
        if self.tracker.target_token_mint.is_empty() {
            anyhow::bail!("TARGET_TOKEN_MINT must be set");
        }

        if self.thresholds.chat_threshold_usd < 0.0 {
            anyhow::bail!("CHAT_THRESHOLD_USD must be ≥ 0");
        }
        if self.thresholds.single_threshold_usd < 0.0 {
            anyhow::bail!("SINGLE_THRESHOLD_USD must be ≥ 0");
        }
        if self.thresholds.cumulative_threshold_usd < 0.0 {
            anyhow::bail!("CUMULATIVE_THRESHOLD_USD must be ≥ 0");
        }
        if self.thresholds.window_seconds == 0 {
            anyhow::bail!("WINDOW_SECONDS must be > 0");
        }
        if self.thresholds.five_sells_threshold_usd < 0.0 {
            anyhow::bail!("FIVE_SELLS_THRESHOLD_USD must be ≥ 0");
        }

        if self.price.price_ttl_secs == 0 {
            anyhow::bail!("PRICE_TTL_SECS must be > 0");
        }
        if self.price.quote_endpoint.is_empty() {
            anyhow::bail!("QUOTE_ENDPOINT must be set");
        }
        if self.price.quote_timeout_secs == 0 {
            anyhow::bail!("QUOTE_TIMEOUT_SECS must be > 0");
        }

        if self.redis.url.is_empty() {
            anyhow::bail!("REDIS_URL must be set");
        }
        if self.server.port == 0 {
            anyhow::bail!("PORT must be > 0");
        }

        if self.telegram.bot_token.is_empty() {
            log::warn!("TELEGRAM_BOT_TOKEN is empty - chat alerts will be disabled");
        }
        if self.telegram.chat_id.is_empty() {
            log::warn!("TELEGRAM_CHAT_ID is empty - chat alerts will be disabled");
        }
        if self.pushover.app_token.is_empty() {
            log::warn!("PUSHOVER_APP_TOKEN is empty - push alerts will be disabled");
        }
        if self.helius.api_key.is_empty() {
            log::warn!("HELIUS_API_KEY is empty - admin webhook endpoints will fail");
        }

        Ok(())
    }
}

// Helper functions for environment variable parsing

fn get_env_string(key: &str, default: &str) -> Result<String> {
    Ok(env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn get_env_u16(key: &str, default: u16) -> Result<u16> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("Invalid {} value", key))
}

fn get_env_u64(key: &str, default: u64) -> Result<u64> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("Invalid {} value", key))
}

fn get_env_f64(key: &str, default: f64) -> Result<f64> {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .or(Some(default))
        .context(format!("Invalid {} value", key))
}

fn get_env_bool(key: &str, default: bool) -> Result<bool> {
    Ok(env::var(key)
        .ok()
        .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default))
}

/// Comma-separated list of i64 ids; empty or unset means empty list
fn get_env_i64_list(key: &str) -> Result<Vec<i64>> {
    let raw = env::var(key).unwrap_or_default();
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>().context(format!("Invalid {} entry: {}", key, s)))
        .collect()
}
