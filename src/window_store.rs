//! Sliding-window store
//!
//! Per-(mint, direction) sorted sets of USD amounts plus cooldown flags and
//! sequential-sell counters, all kept in Redis so multiple instances see the
//! same state. Every compound evict/insert/read operation runs as a single
//! server-side Lua script; concurrent callers never need client-side locks.

use anyhow::{Context, Result};
use deadpool_redis::{Config as RedisConfig, Pool, Runtime};
use log::info;
use once_cell::sync::Lazy;
use redis::AsyncCommands;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::TradeDirection;

/// Keys idle past the window keep their data this much longer before expiry.
const WINDOW_TTL_SLACK_SECS: u64 = 300;

/// Sequential-sell counters live at most a day.
const SEQ_SELLS_TTL_SECS: u64 = 86_400;

/// Per-process sequence so two inserts at the same timestamp never produce
/// the same sorted-set member.
static MEMBER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Evict entries older than the window, insert the new one, refresh the key
/// TTL, then sum what remains in the window. Returned as a string because
/// Lua-to-Redis number conversion truncates to integer.
static ADD_AND_SUM: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local cutoff = now - window
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', '(' .. cutoff)
redis.call('ZADD', KEYS[1], now, ARGV[3])
redis.call('EXPIRE', KEYS[1], window + tonumber(ARGV[4]))
local members = redis.call('ZRANGEBYSCORE', KEYS[1], cutoff, '+inf')
local sum = 0
for _, m in ipairs(members) do
    local amt = string.match(m, '([^:]+)$')
    sum = sum + (tonumber(amt) or 0)
end
return tostring(sum)
"#,
    )
});

/// Read-only window sum over an arbitrary period. Does not evict: summary
/// periods can be shorter than the alert window, and removing entries here
/// would corrupt the cumulative rule's view.
static SUM_WINDOW: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local cutoff = tonumber(ARGV[1]) - tonumber(ARGV[2])
local members = redis.call('ZRANGEBYSCORE', KEYS[1], cutoff, '+inf')
local sum = 0
for _, m in ipairs(members) do
    local amt = string.match(m, '([^:]+)$')
    sum = sum + (tonumber(amt) or 0)
end
return tostring(sum)
"#,
    )
});

/// INCR plus TTL on first increment, in one atomic unit.
static INCR_WITH_TTL: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], tonumber(ARGV[1]))
end
return count
"#,
    )
});

/// Encode one window entry. The amount is the last `:`-separated segment so
/// the Lua scripts can recover it regardless of prefix shape.
pub fn encode_member(ts: u64, seq: u64, usd_amount: f64) -> String {
    format!("{}:{}:{}", ts, seq, usd_amount)
}

/// Rust mirror of the member parsing the Lua scripts do.
pub fn member_amount(member: &str) -> f64 {
    member
        .rsplit(':')
        .next()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn window_key(mint: &str, direction: TradeDirection) -> String {
    format!("window:{}:{}", mint, direction.as_str())
}

fn cooldown_key(key: &str) -> String {
    format!("cooldown:{}", key)
}

fn seq_sells_key(wallet: &str) -> String {
    format!("seqsells:{}", wallet)
}

#[derive(Clone)]
pub struct WindowStore {
    pool: Pool,
    window_seconds: u64,
}

impl WindowStore {
    pub async fn connect(url: &str, window_seconds: u64) -> Result<Self> {
        let cfg = RedisConfig::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .context("Failed to create Redis pool")?;

        let store = Self {
            pool,
            window_seconds,
        };
        store.ping().await.context("Redis not reachable")?;
        info!("✅ Window store: Connected ({})", url);
        Ok(store)
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        anyhow::ensure!(pong == "PONG", "Unexpected PING reply: {}", pong);
        Ok(())
    }

    /// Atomically record `usd_amount` at `ts` and return the cumulative USD
    /// over the window ending at `ts`.
    pub async fn add_amount_to_window(
        &self,
        mint: &str,
        direction: TradeDirection,
        usd_amount: f64,
        ts: u64,
    ) -> Result<f64> {
        let seq = MEMBER_SEQ.fetch_add(1, Ordering::Relaxed);
        let member = encode_member(ts, seq, usd_amount);

        let mut conn = self.pool.get().await?;
        let sum: String = ADD_AND_SUM
            .key(window_key(mint, direction))
            .arg(ts)
            .arg(self.window_seconds)
            .arg(member)
            .arg(WINDOW_TTL_SLACK_SECS)
            .invoke_async(&mut conn)
            .await
            .context("add_amount_to_window script failed")?;

        sum.parse::<f64>()
            .context("Window sum did not parse as a number")
    }

    /// Cumulative USD over `[now - period_seconds, now]` without inserting.
    pub async fn cumulative_amount(
        &self,
        mint: &str,
        direction: TradeDirection,
        now: u64,
        period_seconds: u64,
    ) -> Result<f64> {
        let mut conn = self.pool.get().await?;
        let sum: String = SUM_WINDOW
            .key(window_key(mint, direction))
            .arg(now)
            .arg(period_seconds)
            .invoke_async(&mut conn)
            .await
            .context("cumulative_amount script failed")?;

        sum.parse::<f64>()
            .context("Window sum did not parse as a number")
    }

    pub async fn is_in_cooldown(&self, key: &str) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let exists: bool = conn.exists(cooldown_key(key)).await?;
        Ok(exists)
    }

    pub async fn set_cooldown(&self, key: &str, seconds: u64) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.set_ex(cooldown_key(key), 1u8, seconds).await?;
        Ok(())
    }

    /// Returns the new count. The 24h TTL is set in the same script as the
    /// increment so a crash between the two cannot leave an immortal counter.
    pub async fn increment_sequential_sells(&self, wallet: &str) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let count: i64 = INCR_WITH_TTL
            .key(seq_sells_key(wallet))
            .arg(SEQ_SELLS_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .context("increment_sequential_sells script failed")?;
        Ok(count)
    }

    pub async fn reset_sequential_sells(&self, wallet: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = conn.del(seq_sells_key(wallet)).await?;
        Ok(())
    }

    pub async fn get_sequential_sells(&self, wallet: &str) -> Result<i64> {
        let mut conn = self.pool.get().await?;
        let count: Option<i64> = conn.get(seq_sells_key(wallet)).await?;
        Ok(count.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_round_trip() {
        let member = encode_member(1_700_000_000, 7, 123.45);
        assert_eq!(member, "1700000000:7:123.45");
        assert!((member_amount(&member) - 123.45).abs() < 1e-9);
    }

    #[test]
    fn test_member_amount_integer_sum_shape() {
        // Whole-dollar amounts render without a fraction and must still parse
        let member = encode_member(1000, 0, 100.0);
        assert!((member_amount(&member) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_members_never_collide_at_same_timestamp() {
        let a = encode_member(1000, MEMBER_SEQ.fetch_add(1, Ordering::Relaxed), 50.0);
        let b = encode_member(1000, MEMBER_SEQ.fetch_add(1, Ordering::Relaxed), 50.0);
        assert_ne!(a, b);
    }

    #[test]
    fn test_member_amount_garbage_is_zero() {
        assert_eq!(member_amount("not-a-member"), 0.0);
        assert_eq!(member_amount("1000:3:"), 0.0);
    }

    #[test]
    fn test_key_shapes() {
        assert_eq!(window_key("M", TradeDirection::Buy), "window:M:buy");
        assert_eq!(window_key("M", TradeDirection::Sell), "window:M:sell");
        assert_eq!(cooldown_key("M:buy:cumulative"), "cooldown:M:buy:cumulative");
        assert_eq!(seq_sells_key("W1"), "seqsells:W1");
    }
}
