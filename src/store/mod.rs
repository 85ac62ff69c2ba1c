//! SQLite persistence gateway.
//!
//! The store is append-only. Records enter through a [`Batch`], which wraps one
//! transaction per collection cycle:
//!
//! 1. [`Store::begin`] opens the transaction on its own pooled connection with
//!    `BEGIN IMMEDIATE`, taking the write lock up front. A second cycle waits on
//!    the busy timeout instead of failing its first insert on a stale snapshot.
//! 2. [`Batch::insert_if_new`] checks the fingerprint and stages the row only
//!    when it is unseen. Rows staged earlier in the same batch are visible to
//!    the check.
//! 3. [`Batch::commit`] makes the whole cycle visible at once.
//!
//! A batch dropped without commit rolls back, which is how cancellation and
//! persistence errors discard a partial cycle.
//!
//! # Single writer
//!
//! The check-then-insert is not atomic against a second writer on the same
//! table. Each table has exactly one collection loop; if that ever changes, the
//! `UNIQUE` constraint on `hash` turns a lost race into a failed (rolled back)
//! cycle rather than a duplicate row.

pub mod funds;
pub mod news;

use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS news_articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        source TEXT NOT NULL,
        published_date TEXT NOT NULL,
        content TEXT NOT NULL,
        hash TEXT NOT NULL UNIQUE,
        captured_at TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_news_title ON news_articles (title)",
    "CREATE INDEX IF NOT EXISTS idx_news_source ON news_articles (source)",
    "CREATE INDEX IF NOT EXISTS idx_news_published ON news_articles (published_date)",
    r#"CREATE TABLE IF NOT EXISTS fund_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        name TEXT NOT NULL,
        chart TEXT NOT NULL,
        price_intraday TEXT NOT NULL,
        change TEXT NOT NULL,
        change_percent TEXT NOT NULL,
        volume TEXT NOT NULL,
        ytd_return TEXT NOT NULL,
        three_mo_return TEXT NOT NULL,
        one_year TEXT NOT NULL,
        three_year_return TEXT NOT NULL,
        five_year_return TEXT NOT NULL,
        net_expense_ratio TEXT NOT NULL,
        gross_expense_ratio TEXT NOT NULL,
        net_assets TEXT NOT NULL,
        morningstar_rating TEXT NOT NULL,
        fifty_day_avg TEXT NOT NULL,
        two_hundred_day_avg TEXT NOT NULL,
        fifty_two_week_range TEXT NOT NULL,
        hash TEXT NOT NULL UNIQUE,
        captured_at TEXT NOT NULL,
        captured_year INTEGER NOT NULL,
        captured_month INTEGER NOT NULL,
        captured_day INTEGER NOT NULL,
        captured_time TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_funds_symbol ON fund_snapshots (symbol)",
    "CREATE INDEX IF NOT EXISTS idx_funds_name ON fund_snapshots (name)",
    "CREATE INDEX IF NOT EXISTS idx_funds_captured ON fund_snapshots (captured_year, captured_month, captured_day)",
];

/// A record kind that can be written to the store.
#[async_trait]
pub trait Persistable: Send + Sync {
    /// Table holding this record kind. Must have a `hash` column.
    const TABLE: &'static str;

    /// Insert one row. Called only for unseen fingerprints.
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        fingerprint: &Fingerprint,
        captured_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error>;
}

/// Handle to the database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `url`.
    ///
    /// File databases use WAL with a 5 second busy timeout. `sqlite::memory:`
    /// gets a single long-lived connection so every caller sees the same data.
    ///
    /// # Arguments
    ///
    /// * `url` - sqlx connection string, e.g. `sqlite://finfeed.db`
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };
        let pool = pool_options.connect_with(options).await?;
        info!(url, in_memory, "Connected to database");
        Ok(Self { pool })
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(statements = SCHEMA.len(), "Schema ready");
        Ok(())
    }

    /// Open the batch for one collection cycle.
    #[instrument(level = "debug", skip(self), fields(table = R::TABLE))]
    pub async fn begin<R: Persistable>(
        &self,
        captured_at: DateTime<Utc>,
    ) -> Result<Batch<R>, sqlx::Error> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;
        Ok(Batch {
            tx,
            captured_at,
            outcome: BatchOutcome::default(),
            _record: PhantomData,
        })
    }

    /// Number of rows in a record kind's table.
    pub async fn count<R: Persistable>(&self) -> Result<i64, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// What a committed batch did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

/// One cycle's open transaction. Rolls back on drop unless committed.
pub struct Batch<R> {
    tx: Transaction<'static, Sqlite>,
    captured_at: DateTime<Utc>,
    outcome: BatchOutcome,
    _record: PhantomData<fn(&R)>,
}

impl<R: Persistable> Batch<R> {
    /// Whether a row with this fingerprint is stored or staged in this batch.
    pub async fn exists(&mut self, fingerprint: &Fingerprint) -> Result<bool, sqlx::Error> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE hash = ?", R::TABLE);
        let found = sqlx::query_scalar::<_, i64>(&sql)
            .bind(fingerprint.as_str())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(found > 0)
    }

    /// Stage `record` unless its fingerprint is already known.
    ///
    /// # Returns
    ///
    /// `true` when the row was staged, `false` for a duplicate.
    pub async fn insert_if_new(
        &mut self,
        record: &R,
        fingerprint: &Fingerprint,
    ) -> Result<bool, sqlx::Error> {
        if self.exists(fingerprint).await? {
            self.outcome.duplicates += 1;
            return Ok(false);
        }
        record
            .insert(&mut *self.tx, fingerprint, self.captured_at)
            .await?;
        self.outcome.inserted += 1;
        Ok(true)
    }

    pub async fn commit(self) -> Result<BatchOutcome, sqlx::Error> {
        self.tx.commit().await?;
        debug!(
            table = R::TABLE,
            inserted = self.outcome.inserted,
            duplicates = self.outcome.duplicates,
            "Batch committed"
        );
        Ok(self.outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fingerprint::Fingerprinted;
    use crate::models::NewsArticle;
    use chrono::TimeZone;

    pub(crate) async fn memory_store() -> Store {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    pub(crate) fn article(title: &str, source: &str) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            source: source.to_string(),
            published_date: Utc.with_ymd_and_hms(2025, 1, 16, 14, 30, 0).unwrap(),
            content: format!("{title} body"),
        }
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = memory_store().await;
        store.migrate().await.unwrap();
        assert_eq!(store.count::<NewsArticle>().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_dedupes_within_and_across_cycles() {
        let store = memory_store().await;
        let a = article("A", "PR Newswire");
        let b = article("B", "PR Newswire");

        let mut batch = store.begin::<NewsArticle>(Utc::now()).await.unwrap();
        assert!(batch.insert_if_new(&a, &a.fingerprint()).await.unwrap());
        assert!(!batch.insert_if_new(&a, &a.fingerprint()).await.unwrap());
        assert!(batch.insert_if_new(&b, &b.fingerprint()).await.unwrap());
        let outcome = batch.commit().await.unwrap();
        assert_eq!(outcome, BatchOutcome { inserted: 2, duplicates: 1 });

        let mut batch = store.begin::<NewsArticle>(Utc::now()).await.unwrap();
        assert!(!batch.insert_if_new(&a, &a.fingerprint()).await.unwrap());
        batch.commit().await.unwrap();

        assert_eq!(store.count::<NewsArticle>().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dropped_batch_rolls_back() {
        let store = memory_store().await;
        let a = article("A", "PR Newswire");
        {
            let mut batch = store.begin::<NewsArticle>(Utc::now()).await.unwrap();
            batch.insert_if_new(&a, &a.fingerprint()).await.unwrap();
        }
        assert_eq!(store.count::<NewsArticle>().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_batches_on_file_database_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("finfeed.db").display());
        let store = Store::connect(&url).await.unwrap();
        store.migrate().await.unwrap();

        let a = article("A", "PR Newswire");
        let mut news = store.begin::<NewsArticle>(Utc::now()).await.unwrap();
        assert!(!news.exists(&a.fingerprint()).await.unwrap());

        // A fund cycle starting now has to wait for the news batch.
        let funds_store = store.clone();
        let funds = tokio::spawn(async move {
            let snapshot = crate::models::FundSnapshot::default();
            let mut batch = funds_store.begin::<crate::models::FundSnapshot>(Utc::now()).await?;
            batch.insert_if_new(&snapshot, &snapshot.fingerprint()).await?;
            batch.commit().await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(news.insert_if_new(&a, &a.fingerprint()).await.unwrap());
        news.commit().await.unwrap();

        let outcome = funds.await.unwrap().unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(store.count::<NewsArticle>().await.unwrap(), 1);
        assert_eq!(store.count::<crate::models::FundSnapshot>().await.unwrap(), 1);
        store.close().await;
    }

    #[tokio::test]
    async fn test_unique_hash_is_enforced() {
        let store = memory_store().await;
        let a = article("A", "PR Newswire");
        let fp = a.fingerprint();

        let mut batch = store.begin::<NewsArticle>(Utc::now()).await.unwrap();
        batch.insert_if_new(&a, &fp).await.unwrap();
        batch.commit().await.unwrap();

        // Bypass the existence check, as a racing writer would.
        let mut conn = store.pool.acquire().await.unwrap();
        let result = a.insert(&mut *conn, &fp, Utc::now()).await;
        assert!(result.is_err());
    }
}
