//! News article persistence and reads.

use super::{Persistable, Store};
use crate::fingerprint::Fingerprint;
use crate::models::{NewsArticle, StoredNewsArticle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

#[async_trait]
impl Persistable for NewsArticle {
    const TABLE: &'static str = "news_articles";

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        fingerprint: &Fingerprint,
        captured_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO news_articles (title, source, published_date, content, hash, captured_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&self.title)
        .bind(&self.source)
        .bind(self.published_date)
        .bind(&self.content)
        .bind(fingerprint.as_str())
        .bind(captured_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}

impl Store {
    /// The `limit` most recently published articles, newest first.
    pub async fn latest_news(&self, limit: i64) -> Result<Vec<StoredNewsArticle>, sqlx::Error> {
        sqlx::query_as::<_, StoredNewsArticle>(
            "SELECT id, title, source, published_date, content, hash, captured_at \
             FROM news_articles ORDER BY published_date DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
