//! Subscription registry
//!
//! Tracked wallets and notification subscriptions in a single SQLite file
//! (WAL). Read-mostly: the pipeline and the health surface read snapshots,
//! mutations come from the bot command surface. Readers observing the pre- or
//! post-state of a concurrent mutation are both acceptable.

use anyhow::{Context, Result};
use log::{info, warn};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use crate::types::short;

#[derive(Debug, Clone)]
pub struct TrackedWallet {
    pub address: String,
    pub added_by: i64,
    pub added_at: i64,
}

#[derive(Debug, Clone)]
pub struct PushSubscription {
    pub user_id: i64,
    pub push_key: String,
    pub created_at: i64,
}

/// Subscription class a push credential is registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushClass {
    General,
    SequentialSells,
}

impl PushClass {
    fn table(&self) -> &'static str {
        match self {
            PushClass::General => "push_subscriptions",
            PushClass::SequentialSells => "push_sequential_sells_subscriptions",
        }
    }
}

#[derive(Clone)]
pub struct Registry {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl Registry {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let manager = SqliteConnectionManager::file(path.as_ref())
            .with_init(|conn| conn.execute_batch("PRAGMA journal_mode=WAL;"));
        let pool = r2d2::Pool::new(manager).context("Failed to create SQLite pool")?;

        let registry = Self { pool };
        registry.initialize_schema()?;
        info!("✅ Registry: SQLite ready ({})", path.as_ref().display());
        Ok(registry)
    }

    /// Single shared in-memory database, for tests.
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = r2d2::Pool::builder().max_size(1).build(manager)?;
        let registry = Self { pool };
        registry.initialize_schema()?;
        Ok(registry)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_wallets (
                address TEXT PRIMARY KEY COLLATE NOCASE,
                added_by INTEGER NOT NULL,
                added_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS push_subscriptions (
                user_id INTEGER PRIMARY KEY,
                push_key TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS push_sequential_sells_subscriptions (
                user_id INTEGER PRIMARY KEY,
                push_key TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chat_subscribers (
                user_id INTEGER PRIMARY KEY,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .context("Failed to initialize registry schema")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Tracked wallets
    // ------------------------------------------------------------------

    /// Idempotent insert. Returns false when the wallet was already tracked.
    pub fn add_wallet(&self, address: &str, added_by: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tracked_wallets (address, added_by, added_at) VALUES (?1, ?2, ?3)",
            params![address, added_by, chrono::Utc::now().timestamp()],
        )?;
        Ok(inserted == 1)
    }

    pub fn remove_wallet(&self, address: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM tracked_wallets WHERE address = ?1",
            params![address],
        )?;
        Ok(removed == 1)
    }

    /// Case-insensitive membership check. An empty tracked set answers true
    /// (open tracking) so a fresh deployment observes everything.
    pub fn is_wallet_tracked(&self, address: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM tracked_wallets", [], |r| r.get(0))?;
        if total == 0 {
            warn!(
                "⚠️  Tracked-wallet set is empty, treating {} as tracked",
                short(address)
            );
            return Ok(true);
        }

        let found: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracked_wallets WHERE address = ?1",
            params![address],
            |r| r.get(0),
        )?;
        Ok(found > 0)
    }

    pub fn list_wallets(&self, skip: u32, limit: u32) -> Result<Vec<TrackedWallet>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT address, added_by, added_at FROM tracked_wallets
             ORDER BY added_at LIMIT ?1 OFFSET ?2",
        )?;
        let wallets = stmt
            .query_map(params![limit, skip], |row| {
                Ok(TrackedWallet {
                    address: row.get(0)?,
                    added_by: row.get(1)?,
                    added_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(wallets)
    }

    pub fn wallet_count(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracked_wallets", [], |r| r.get(0))?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Push subscriptions (one per user per class)
    // ------------------------------------------------------------------

    pub fn add_push_subscription(
        &self,
        class: PushClass,
        user_id: i64,
        push_key: &str,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (user_id, push_key, created_at) VALUES (?1, ?2, ?3)",
                class.table()
            ),
            params![user_id, push_key, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    pub fn remove_push_subscription(&self, class: PushClass, user_id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            &format!("DELETE FROM {} WHERE user_id = ?1", class.table()),
            params![user_id],
        )?;
        Ok(removed == 1)
    }

    pub fn subscribers(&self, class: PushClass) -> Result<Vec<PushSubscription>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, push_key, created_at FROM {} ORDER BY user_id",
            class.table()
        ))?;
        let subs = stmt
            .query_map([], |row| {
                Ok(PushSubscription {
                    user_id: row.get(0)?,
                    push_key: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(subs)
    }

    pub fn subscribers_general(&self) -> Result<Vec<PushSubscription>> {
        self.subscribers(PushClass::General)
    }

    pub fn subscribers_sequential_sells(&self) -> Result<Vec<PushSubscription>> {
        self.subscribers(PushClass::SequentialSells)
    }

    // ------------------------------------------------------------------
    // Chat subscribers (periodic summaries)
    // ------------------------------------------------------------------

    pub fn add_chat_subscriber(&self, user_id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO chat_subscribers (user_id, created_at) VALUES (?1, ?2)",
            params![user_id, chrono::Utc::now().timestamp()],
        )?;
        Ok(inserted == 1)
    }

    pub fn remove_chat_subscriber(&self, user_id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn.execute(
            "DELETE FROM chat_subscribers WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(removed == 1)
    }

    pub fn chat_subscribers(&self) -> Result<Vec<i64>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT user_id FROM chat_subscribers ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// (general, sequential-sells, chat) subscriber counts for the health body.
    pub fn subscriber_counts(&self) -> Result<(u64, u64, u64)> {
        let conn = self.pool.get()?;
        let general: i64 =
            conn.query_row("SELECT COUNT(*) FROM push_subscriptions", [], |r| r.get(0))?;
        let sequential: i64 = conn.query_row(
            "SELECT COUNT(*) FROM push_sequential_sells_subscriptions",
            [],
            |r| r.get(0),
        )?;
        let chat: i64 =
            conn.query_row("SELECT COUNT(*) FROM chat_subscribers", [], |r| r.get(0))?;
        Ok((general as u64, sequential as u64, chat as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_wallet_idempotent() {
        let registry = Registry::in_memory().unwrap();
        assert!(registry.add_wallet("Wallet1", 10).unwrap());
        assert!(!registry.add_wallet("Wallet1", 10).unwrap());
        assert_eq!(registry.wallet_count().unwrap(), 1);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let registry = Registry::in_memory().unwrap();
        registry.add_wallet("AbCdEf", 1).unwrap();
        // Second wallet so the open-tracking fallback is not in play
        registry.add_wallet("Other", 1).unwrap();

        assert!(registry.is_wallet_tracked("abcdef").unwrap());
        assert!(registry.is_wallet_tracked("ABCDEF").unwrap());
        assert!(!registry.is_wallet_tracked("missing").unwrap());
    }

    #[test]
    fn test_case_insensitive_duplicate_rejected() {
        let registry = Registry::in_memory().unwrap();
        assert!(registry.add_wallet("AbC", 1).unwrap());
        assert!(!registry.add_wallet("abc", 1).unwrap());
    }

    #[test]
    fn test_open_tracking_fallback_when_empty() {
        let registry = Registry::in_memory().unwrap();
        assert!(registry.is_wallet_tracked("anything").unwrap());
    }

    #[test]
    fn test_remove_wallet() {
        let registry = Registry::in_memory().unwrap();
        registry.add_wallet("W1", 1).unwrap();
        assert!(registry.remove_wallet("W1").unwrap());
        assert!(!registry.remove_wallet("W1").unwrap());
    }

    #[test]
    fn test_list_wallets_pagination() {
        let registry = Registry::in_memory().unwrap();
        for i in 0..5 {
            registry.add_wallet(&format!("W{}", i), 1).unwrap();
        }
        let page = registry.list_wallets(2, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(registry.list_wallets(0, 10).unwrap().len(), 5);
    }

    #[test]
    fn test_push_subscription_one_per_class() {
        let registry = Registry::in_memory().unwrap();
        registry
            .add_push_subscription(PushClass::General, 7, "key-a")
            .unwrap();
        registry
            .add_push_subscription(PushClass::General, 7, "key-b")
            .unwrap();

        let subs = registry.subscribers_general().unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].push_key, "key-b");
    }

    #[test]
    fn test_subscription_classes_are_independent() {
        let registry = Registry::in_memory().unwrap();
        registry
            .add_push_subscription(PushClass::General, 7, "key-a")
            .unwrap();
        registry
            .add_push_subscription(PushClass::SequentialSells, 7, "key-b")
            .unwrap();

        assert_eq!(registry.subscribers_general().unwrap().len(), 1);
        assert_eq!(registry.subscribers_sequential_sells().unwrap().len(), 1);
        assert!(registry
            .remove_push_subscription(PushClass::General, 7)
            .unwrap());
        assert_eq!(registry.subscribers_general().unwrap().len(), 0);
        assert_eq!(registry.subscribers_sequential_sells().unwrap().len(), 1);
    }

    #[test]
    fn test_chat_subscribers() {
        let registry = Registry::in_memory().unwrap();
        assert!(registry.add_chat_subscriber(5).unwrap());
        assert!(!registry.add_chat_subscriber(5).unwrap());
        registry.add_chat_subscriber(9).unwrap();

        assert_eq!(registry.chat_subscribers().unwrap(), vec![5, 9]);
        assert!(registry.remove_chat_subscriber(5).unwrap());
        assert_eq!(registry.chat_subscribers().unwrap(), vec![9]);
    }

    #[test]
    fn test_subscriber_counts() {
        let registry = Registry::in_memory().unwrap();
        registry
            .add_push_subscription(PushClass::General, 1, "k1")
            .unwrap();
        registry
            .add_push_subscription(PushClass::SequentialSells, 2, "k2")
            .unwrap();
        registry.add_chat_subscriber(3).unwrap();
        registry.add_chat_subscriber(4).unwrap();

        assert_eq!(registry.subscriber_counts().unwrap(), (1, 1, 2));
    }
}
