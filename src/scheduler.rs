//! ⏰ Summary scheduler
//!
//! Periodic volume summaries DM'd to chat subscribers: every 30 minutes,
//! hour, and 4 hours, each over the matching lookback period. Jobs are
//! independent of each other, but a single job never overlaps itself: a tick
//! arriving while the previous run is still going is skipped with a warning.

use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::notifier::{summary_message, Notifier};
use crate::types::TradeDirection;
use crate::window_store::WindowStore;

const SUMMARY_JOBS: [(&str, u64); 3] = [("30m", 1800), ("1h", 3600), ("4h", 14400)];

pub struct SummaryScheduler {
    store: WindowStore,
    notifier: Arc<Notifier>,
    mint: String,
}

impl SummaryScheduler {
    pub fn new(store: WindowStore, notifier: Arc<Notifier>, mint: String) -> Self {
        Self {
            store,
            notifier,
            mint,
        }
    }

    /// Spawn one task per summary job.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        let scheduler = Arc::new(self);
        SUMMARY_JOBS
            .iter()
            .map(|&(name, period_secs)| {
                let scheduler = scheduler.clone();
                tokio::spawn(scheduler.run_job(name, period_secs))
            })
            .collect()
    }

    async fn run_job(self: Arc<Self>, name: &'static str, period_secs: u64) {
        let mut ticker = interval(Duration::from_secs(period_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; a summary of nothing is noise
        ticker.tick().await;

        let guard = Arc::new(Mutex::new(()));
        loop {
            ticker.tick().await;
            match guard.clone().try_lock_owned() {
                Ok(permit) => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = scheduler.run_summary(period_secs).await {
                            error!("❌ {} summary failed: {:#}", name, e);
                        }
                    });
                }
                Err(_) => {
                    warn!("⚠️  {} summary still running, skipping this tick", name);
                }
            }
        }
    }

    async fn run_summary(&self, period_secs: u64) -> Result<()> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();

        let buys = self
            .store
            .cumulative_amount(&self.mint, TradeDirection::Buy, now, period_secs)
            .await?;
        let sells = self
            .store
            .cumulative_amount(&self.mint, TradeDirection::Sell, now, period_secs)
            .await?;

        let message = summary_message(period_secs, buys, sells, self.notifier.token_label());
        let delivered = self.notifier.dm_chat_subscribers(&message).await?;
        info!(
            "📊 {}s summary (buys ${:.2} / sells ${:.2}) delivered to {} subscriber(s)",
            period_secs, buys, sells, delivered
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overlap_guard_skips_second_acquire() {
        let guard = Arc::new(Mutex::new(()));

        let held = guard.clone().try_lock_owned().unwrap();
        // A tick arriving while the job runs must not get the lock
        assert!(guard.clone().try_lock_owned().is_err());

        drop(held);
        assert!(guard.clone().try_lock_owned().is_ok());
    }

    #[test]
    fn test_job_periods_match_lookbacks() {
        assert_eq!(SUMMARY_JOBS, [("30m", 1800), ("1h", 3600), ("4h", 14400)]);
    }
}
