//! Fund snapshot persistence and the filtered, sorted read path.

use super::{Persistable, Store};
use crate::fingerprint::Fingerprint;
use crate::models::{FundColumn, FundSnapshot, StoredFundSnapshot};
use crate::query::FundQuery;
use crate::utils::CaptureBucket;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use once_cell::sync::Lazy;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, instrument};

static INSERT_SQL: Lazy<String> = Lazy::new(|| {
    let columns = FundColumn::ALL.iter().map(|c| c.sql_column()).join(", ");
    let placeholders = vec!["?"; FundColumn::ALL.len() + 6].join(", ");
    format!(
        "INSERT INTO fund_snapshots ({columns}, hash, captured_at, captured_year, \
         captured_month, captured_day, captured_time) VALUES ({placeholders})"
    )
});

#[async_trait]
impl Persistable for FundSnapshot {
    const TABLE: &'static str = "fund_snapshots";

    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        fingerprint: &Fingerprint,
        captured_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let bucket = CaptureBucket::of(captured_at);
        let mut query = sqlx::query(INSERT_SQL.as_str());
        for column in FundColumn::ALL {
            query = query.bind(self.get(column));
        }
        query
            .bind(fingerprint.as_str())
            .bind(captured_at)
            .bind(bucket.year)
            .bind(bucket.month)
            .bind(bucket.day)
            .bind(bucket.time)
            .execute(conn)
            .await?;
        Ok(())
    }
}

impl Store {
    /// Run a validated fund query.
    #[instrument(level = "debug", skip_all, fields(filters = query.filters.len()))]
    pub async fn query_funds(
        &self,
        query: &FundQuery,
    ) -> Result<Vec<StoredFundSnapshot>, sqlx::Error> {
        let mut builder = build_fund_query(query);
        let rows = builder
            .build_query_as::<StoredFundSnapshot>()
            .fetch_all(&self.pool)
            .await?;
        debug!(rows = rows.len(), "Fund query complete");
        Ok(rows)
    }
}

fn build_fund_query(query: &FundQuery) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM fund_snapshots WHERE 1 = 1");

    for (column, value) in &query.filters {
        match column {
            FundColumn::Name => {
                builder.push(" AND name LIKE ");
                builder.push_bind(format!("%{}%", escape_like(value)));
                builder.push(" ESCAPE '\\'");
            }
            other => {
                builder.push(format!(" AND {} = ", other.sql_column()));
                builder.push_bind(value.clone());
            }
        }
    }

    for (column, value) in [
        ("captured_year", query.year),
        ("captured_month", query.month),
        ("captured_day", query.day),
    ] {
        if let Some(value) = value {
            builder.push(format!(" AND {column} = "));
            builder.push_bind(value);
        }
    }

    match query.sort {
        Some((field, order)) => {
            builder.push(format!(
                " ORDER BY {} {}, id ASC",
                field.sql_expr(),
                order.as_sql()
            ));
        }
        None => {
            builder.push(" ORDER BY id ASC");
        }
    }

    builder.push(" LIMIT ");
    builder.push_bind(query.count);
    builder.push(" OFFSET ");
    builder.push_bind(query.start);
    builder
}

/// Escape `LIKE` wildcards so user text matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
