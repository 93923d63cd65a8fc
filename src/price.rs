//! 💵 Price oracle
//!
//! Resolves USD values for token amounts via a DEX pair quote endpoint, with
//! a TTL cache in front. Cache hit rate is the primary performance lever; a
//! fetch failure returns None and never populates the cache.

use anyhow::{Context, Result};
use dashmap::DashMap;
use log::{debug, warn};
use serde::Deserialize;
use std::time::{Duration, Instant};

use crate::config::PriceConfig;
use crate::types::short;

/// Cached USD quote for one mint.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub price_usd: f64,
    pub fetched_at: Instant,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    pairs: Option<Vec<QuotePair>>,
}

#[derive(Debug, Deserialize)]
struct QuotePair {
    #[serde(rename = "priceUsd")]
    price_usd: Option<String>,
    liquidity: Option<PairLiquidity>,
}

#[derive(Debug, Deserialize)]
struct PairLiquidity {
    usd: Option<f64>,
}

/// Pick the USD price of the deepest pair whose price parses as a positive
/// finite number.
fn select_best_price(pairs: &[QuotePair]) -> Option<f64> {
    pairs
        .iter()
        .filter_map(|p| {
            let price = p.price_usd.as_deref()?.parse::<f64>().ok()?;
            if !price.is_finite() || price <= 0.0 {
                return None;
            }
            let liquidity = p.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0);
            Some((liquidity, price))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, price)| price)
}

pub struct PriceOracle {
    client: reqwest::Client,
    cache: DashMap<String, PriceQuote>,
    quote_endpoint: String,
    ttl: Duration,
}

impl PriceOracle {
    pub fn new(config: &PriceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.quote_timeout_secs))
            .build()
            .context("Failed to create quote HTTP client")?;

        Ok(Self {
            client,
            cache: DashMap::new(),
            quote_endpoint: config.quote_endpoint.trim_end_matches('/').to_string(),
            ttl: Duration::from_secs(config.price_ttl_secs),
        })
    }

    /// Current USD price of one whole token, or None when unresolvable.
    pub async fn token_price(&self, mint: &str) -> Option<f64> {
        if let Some(quote) = self.cache.get(mint) {
            if quote.fetched_at.elapsed() < self.ttl {
                debug!("💵 Price cache hit for {}: ${}", short(mint), quote.price_usd);
                return Some(quote.price_usd);
            }
        }

        match self.fetch_price(mint).await {
            Ok(price) => {
                // Concurrent misses may race here; last writer wins
                self.cache.insert(
                    mint.to_string(),
                    PriceQuote {
                        price_usd: price,
                        fetched_at: Instant::now(),
                    },
                );
                Some(price)
            }
            Err(e) => {
                warn!("⚠️  Quote fetch failed for {}: {:#}", short(mint), e);
                None
            }
        }
    }

    /// USD value of `raw_amount / 10^decimals` tokens.
    pub async fn usd_value(&self, mint: &str, raw_amount: u64, decimals: u8) -> Option<f64> {
        let price = self.token_price(mint).await?;
        Some(raw_amount as f64 / 10f64.powi(decimals as i32) * price)
    }

    async fn fetch_price(&self, mint: &str) -> Result<f64> {
        let url = format!("{}/{}", self.quote_endpoint, mint);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Quote request failed")?;

        anyhow::ensure!(
            response.status().is_success(),
            "Quote endpoint returned {}",
            response.status()
        );

        let body: QuoteResponse = response
            .json()
            .await
            .context("Failed to parse quote response")?;

        let pairs = body.pairs.unwrap_or_default();
        select_best_price(&pairs).context("No pair with a usable USD price")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(price: Option<&str>, liquidity: Option<f64>) -> QuotePair {
        QuotePair {
            price_usd: price.map(|s| s.to_string()),
            liquidity: liquidity.map(|usd| PairLiquidity { usd: Some(usd) }),
        }
    }

    fn oracle() -> PriceOracle {
        PriceOracle::new(&PriceConfig {
            price_ttl_secs: 60,
            // Unroutable on purpose: any fetch in these tests is a bug
            quote_endpoint: "http://127.0.0.1:1/latest/dex/tokens".to_string(),
            quote_timeout_secs: 1,
        })
        .unwrap()
    }

    #[test]
    fn test_select_deepest_pair() {
        let pairs = vec![
            pair(Some("1.5"), Some(10_000.0)),
            pair(Some("2.5"), Some(50_000.0)),
            pair(Some("9.9"), Some(100.0)),
        ];
        assert_eq!(select_best_price(&pairs), Some(2.5));
    }

    #[test]
    fn test_select_skips_unparseable_and_nonpositive() {
        let pairs = vec![
            pair(Some("abc"), Some(1_000_000.0)),
            pair(Some("-3.0"), Some(500_000.0)),
            pair(Some("0"), Some(400_000.0)),
            pair(None, Some(300_000.0)),
            pair(Some("0.004"), Some(10.0)),
        ];
        assert_eq!(select_best_price(&pairs), Some(0.004));
    }

    #[test]
    fn test_select_empty_is_none() {
        assert_eq!(select_best_price(&[]), None);
        assert_eq!(select_best_price(&[pair(Some("inf"), Some(1.0))]), None);
    }

    #[test]
    fn test_missing_liquidity_counts_as_zero() {
        let pairs = vec![pair(Some("7.0"), None), pair(Some("3.0"), Some(1.0))];
        assert_eq!(select_best_price(&pairs), Some(3.0));
    }

    #[tokio::test]
    async fn test_cache_hit_avoids_fetch() {
        let oracle = oracle();
        oracle.cache.insert(
            "M".to_string(),
            PriceQuote {
                price_usd: 2.5,
                fetched_at: Instant::now(),
            },
        );

        // The endpoint is unroutable, so Some(2.5) proves the cache answered
        assert_eq!(oracle.token_price("M").await, Some(2.5));
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_none_and_does_not_cache() {
        let oracle = oracle();
        assert_eq!(oracle.token_price("M").await, None);
        assert!(oracle.cache.get("M").is_none());
    }

    #[tokio::test]
    async fn test_usd_value_monotonic_in_amount() {
        let oracle = oracle();
        oracle.cache.insert(
            "M".to_string(),
            PriceQuote {
                price_usd: 2.5,
                fetched_at: Instant::now(),
            },
        );

        let small = oracle.usd_value("M", 1_000_000_000, 9).await.unwrap();
        let large = oracle.usd_value("M", 2_000_000_000, 9).await.unwrap();
        assert!((small - 2.5).abs() < 1e-9);
        assert!(large > small);
    }
}
