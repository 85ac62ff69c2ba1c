//! One fetch → dedupe → persist cycle per source.
//!
//! A [`Pipeline`] owns the fetchers of one source kind and the store handle.
//! Each call to [`Collector::run_cycle`]:
//!
//! 1. Fans out to every fetcher, at most `max_parallel` at a time, and waits
//!    for all of them.
//! 2. Merges the results and arranges them ([`CandidateRecord::arrange`]); news
//!    is ordered newest first.
//! 3. Fingerprints each record and stages the unseen ones in a single batch.
//! 4. Commits the batch.
//!
//! Fetchers never fail, so the only error a cycle can return is a persistence
//! error, after which the batch has rolled back.

use crate::error::PipelineError;
use crate::fingerprint::Fingerprinted;
use crate::models::{FundSnapshot, NewsArticle};
use crate::scheduler::{CycleState, PhaseReporter};
use crate::scrapers::Fetcher;
use crate::store::{Persistable, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Counters for one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub source: String,
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub elapsed: Duration,
}

impl CycleStats {
    pub fn log_summary(&self) {
        info!(
            source = %self.source,
            fetched = self.fetched,
            inserted = self.inserted,
            duplicates = self.duplicates,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Cycle complete"
        );
    }
}

/// Something the scheduler can run on an interval.
#[async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Name of the source, used in logs and status reports.
    fn source(&self) -> &str;

    async fn run_cycle(&self, phase: &PhaseReporter) -> Result<CycleStats, PipelineError>;
}

/// A record kind a [`Pipeline`] can collect.
pub trait CandidateRecord: Fingerprinted + Persistable + Send + Sync + 'static {
    /// Order the merged results of one cycle before they are persisted.
    fn arrange(records: Vec<Self>) -> Vec<Self>
    where
        Self: Sized,
    {
        records
    }
}

impl CandidateRecord for NewsArticle {
    /// Newest first, so the most recent items get the lowest ids of the cycle.
    fn arrange(records: Vec<Self>) -> Vec<Self> {
        records
            .into_iter()
            .sorted_by(|a, b| b.published_date.cmp(&a.published_date))
            .collect()
    }
}

impl CandidateRecord for FundSnapshot {}

/// Fetchers of one source kind plus the store they feed.
pub struct Pipeline<R> {
    source: String,
    fetchers: Vec<Arc<dyn Fetcher<Record = R>>>,
    store: Store,
    max_parallel: usize,
}

impl<R: CandidateRecord> Pipeline<R> {
    /// # Arguments
    ///
    /// * `source` - Name reported for the whole pipeline, e.g. `"news"`
    /// * `fetchers` - Sub-fetchers whose results are merged every cycle
    /// * `store` - Where new records are persisted
    /// * `max_parallel` - Upper bound on concurrent fetches within a cycle
    pub fn new(
        source: impl Into<String>,
        fetchers: Vec<Arc<dyn Fetcher<Record = R>>>,
        store: Store,
        max_parallel: usize,
    ) -> Self {
        Self {
            source: source.into(),
            fetchers,
            store,
            max_parallel: max_parallel.max(1),
        }
    }
}

#[async_trait]
impl<R: CandidateRecord> Collector for Pipeline<R> {
    fn source(&self) -> &str {
        &self.source
    }

    #[instrument(level = "info", skip_all, fields(source = %self.source))]
    async fn run_cycle(&self, phase: &PhaseReporter) -> Result<CycleStats, PipelineError> {
        let started = Instant::now();
        let captured_at = Utc::now();

        phase.enter(CycleState::Fetching);
        let fetched = fetch_all(&self.fetchers, captured_at, self.max_parallel).await;
        let records = R::arrange(fetched);
        let fetched = records.len();

        phase.enter(CycleState::Deduping);
        let mut batch = self.store.begin::<R>(captured_at).await?;
        for record in &records {
            batch.insert_if_new(record, &record.fingerprint()).await?;
        }

        phase.enter(CycleState::Persisting);
        let outcome = batch.commit().await?;

        Ok(CycleStats {
            source: self.source.clone(),
            fetched,
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
            elapsed: started.elapsed(),
        })
    }
}

/// Run every fetcher, at most `max_parallel` at a time, and merge the results.
async fn fetch_all<R: Send + 'static>(
    fetchers: &[Arc<dyn Fetcher<Record = R>>],
    captured_at: DateTime<Utc>,
    max_parallel: usize,
) -> Vec<R> {
    let pending: Vec<BoxFuture<'static, Vec<R>>> = fetchers
        .iter()
        .cloned()
        .map(|fetcher| {
            async move {
                let records = fetcher.fetch(captured_at).await;
                debug!(fetcher = fetcher.name(), count = records.len(), "Sub-fetch finished");
                records
            }
            .boxed()
        })
        .collect();

    stream::iter(pending)
        .buffer_unordered(max_parallel)
        .concat()
        .await
}
