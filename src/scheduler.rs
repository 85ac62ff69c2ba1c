//! Long-running collection loops.
//!
//! Each source runs in its own task with its own interval:
//!
//! ```text
//! Idle → Fetching → Deduping → Persisting → Sleeping → Idle → ...
//! ```
//!
//! The loop is the outermost barrier of the pipeline. An error or a panic in a
//! cycle is logged and counted, then the loop sleeps and tries again; a failing
//! source never stops the process or the other loops. The first cycle starts
//! immediately.
//!
//! All loops share one [`CancellationToken`]. Cancelling it drops the in-flight
//! cycle, whose uncommitted batch rolls back, and ends the loop.

use crate::pipeline::{CycleStats, Collector};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Where a loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Fetching,
    Deduping,
    Persisting,
    Sleeping,
}

/// Live status of one loop, as served by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub state: CycleState,
    pub completed_cycles: u64,
    pub failed_cycles: u64,
    /// Rows inserted by the last successful cycle.
    pub last_inserted: usize,
    pub last_error: Option<String>,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl SourceStatus {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            state: CycleState::Idle,
            completed_cycles: 0,
            failed_cycles: 0,
            last_inserted: 0,
            last_error: None,
            last_cycle_at: None,
        }
    }
}

/// Write side of a loop's [`SourceStatus`].
#[derive(Debug)]
pub struct PhaseReporter {
    tx: watch::Sender<SourceStatus>,
}

impl PhaseReporter {
    fn new(source: &str) -> (Self, watch::Receiver<SourceStatus>) {
        let (tx, rx) = watch::channel(SourceStatus::new(source));
        (Self { tx }, rx)
    }

    /// A reporter nobody watches, for running a cycle outside a loop.
    pub fn detached(source: &str) -> Self {
        Self::new(source).0
    }

    pub fn enter(&self, state: CycleState) {
        self.tx.send_modify(|status| status.state = state);
    }

    pub fn current(&self) -> SourceStatus {
        self.tx.borrow().clone()
    }

    fn record_success(&self, stats: &CycleStats) {
        self.tx.send_modify(|status| {
            status.completed_cycles += 1;
            status.last_inserted = stats.inserted;
            status.last_error = None;
            status.last_cycle_at = Some(Utc::now());
        });
    }

    fn record_failure(&self, message: String) {
        self.tx.send_modify(|status| {
            status.failed_cycles += 1;
            status.last_error = Some(message);
            status.last_cycle_at = Some(Utc::now());
        });
    }
}

/// Read side of every loop's status. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    receivers: Vec<watch::Receiver<SourceStatus>>,
}

impl StatusBoard {
    pub fn snapshot(&self) -> Vec<SourceStatus> {
        self.receivers.iter().map(|rx| rx.borrow().clone()).collect()
    }
}

/// Owns the collection loops.
///
/// ```ignore
/// let mut supervisor = Supervisor::new();
/// supervisor.spawn(Arc::new(news_pipeline), Duration::from_secs(600));
/// let board = supervisor.statuses();
/// // ...
/// supervisor.shutdown().await;
/// ```
#[derive(Debug, Default)]
pub struct Supervisor {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    board: StatusBoard,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a loop for `collector`, running a cycle now and then every `interval`.
    pub fn spawn<C: Collector>(&mut self, collector: Arc<C>, interval: Duration) {
        let (reporter, rx) = PhaseReporter::new(collector.source());
        self.board.receivers.push(rx);
        let token = self.token.child_token();
        self.tasks
            .push(tokio::spawn(run_loop(collector, interval, reporter, token)));
    }

    pub fn statuses(&self) -> StatusBoard {
        self.board.clone()
    }

    /// Cancel every loop and wait for them to finish.
    pub async fn shutdown(self) {
        info!(loops = self.tasks.len(), "Stopping collection loops");
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Collection loop ended abnormally");
            }
        }
    }
}

async fn run_loop<C: Collector>(
    collector: Arc<C>,
    interval: Duration,
    reporter: PhaseReporter,
    token: CancellationToken,
) {
    let source = collector.source().to_string();
    info!(source = %source, interval_secs = interval.as_secs(), "Collection loop started");

    loop {
        let cycle = AssertUnwindSafe(collector.run_cycle(&reporter)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = cycle => outcome,
        };

        match outcome {
            Ok(Ok(stats)) => {
                stats.log_summary();
                reporter.record_success(&stats);
            }
            Ok(Err(e)) => {
                error!(source = %source, error = %e, "Cycle failed; will retry next interval");
                reporter.record_failure(e.to_string());
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(source = %source, panic = %message, "Cycle panicked; will retry next interval");
                reporter.record_failure(format!("panic: {message}"));
            }
        }

        reporter.enter(CycleState::Sleeping);
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        reporter.enter(CycleState::Idle);
    }

    reporter.enter(CycleState::Idle);
    let status = reporter.current();
    info!(
        source = %source,
        completed = status.completed_cycles,
        failed = status.failed_cycles,
        "Collection loop stopped"
    );
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
