//! # finfeed
//!
//! A financial news and mutual-fund collector. Background loops scrape
//! syndication feeds and the Yahoo Finance fund screener, deduplicate every
//! record by a SHA-256 content fingerprint, and append the new ones to SQLite.
//! A small HTTP API serves the stored data together with service health.
//!
//! ## Usage
//!
//! ```sh
//! finfeed --config ./finfeed.yaml --bind 127.0.0.1:8000
//! ```
//!
//! ## Architecture
//!
//! Each source runs its own loop (see [`scheduler`]):
//! 1. **Fetching**: [`scrapers`] return candidate records and never fail
//! 2. **Deduping**: [`fingerprint`] keys each record; the [`store`] skips known keys
//! 3. **Persisting**: the cycle's batch commits as one transaction
//! 4. **Sleeping**: until the source's next interval
//!
//! The read API ([`api`]) runs alongside the loops and never waits on them.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod fingerprint;
mod health;
mod models;
mod pipeline;
mod query;
mod scheduler;
mod scrapers;
mod store;
mod utils;

use api::AppState;
use cli::Cli;
use config::Config;
use health::HealthTracker;
use models::{FundSnapshot, NewsArticle};
use pipeline::Pipeline;
use scheduler::Supervisor;
use scrapers::rss::RssFetcher;
use scrapers::screener::ScreenerFetcher;
use scrapers::{Fetcher, build_client};
use store::Store;

const NEWS_USER_AGENT: &str = concat!("finfeed/", env!("CARGO_PKG_VERSION"));
const METRICS_UPKEEP: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("finfeed starting up");

    // Parse CLI and layer it over the config file
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);

    // --- Store ---
    let store = Store::connect(&config.database_url).await?;
    store.migrate().await?;
    info!(
        news_articles = store.count::<NewsArticle>().await?,
        fund_snapshots = store.count::<FundSnapshot>().await?,
        "Store ready"
    );

    // --- Collection loops ---
    let mut supervisor = Supervisor::new();
    if args.no_scheduler {
        info!("Scheduler disabled; serving stored data only");
    } else {
        start_collectors(&config, &store, &mut supervisor)?;
    }

    // --- Read API ---
    let health = Arc::new(HealthTracker::new());
    let upkeep = tokio::spawn({
        let health = health.clone();
        async move {
            let mut ticker = tokio::time::interval(METRICS_UPKEEP);
            loop {
                ticker.tick().await;
                health.run_upkeep();
            }
        }
    });
    let state = AppState {
        store: store.clone(),
        health,
        statuses: supervisor.statuses(),
        news_limit: config.api.news_limit,
    };
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Read API listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            supervisor.shutdown().await;
        })
        .await?;

    upkeep.abort();
    store.close().await;
    info!(
        uptime_secs = start_time.elapsed().as_secs(),
        "finfeed stopped"
    );
    Ok(())
}

/// Spawn the news and screener loops.
fn start_collectors(
    config: &Config,
    store: &Store,
    supervisor: &mut Supervisor,
) -> Result<(), reqwest::Error> {
    let news_client = build_client(config.request_timeout(), NEWS_USER_AGENT)?;
    let feeds: Vec<Arc<dyn Fetcher<Record = NewsArticle>>> = config
        .news
        .feeds
        .iter()
        .map(|feed| {
            Arc::new(RssFetcher::new(
                feed.name.clone(),
                feed.url.clone(),
                news_client.clone(),
            )) as Arc<dyn Fetcher<Record = NewsArticle>>
        })
        .collect();
    info!(
        feeds = feeds.len(),
        interval_secs = config.news.interval_secs,
        "Scheduling news collection"
    );
    supervisor.spawn(
        Arc::new(Pipeline::new(
            "news",
            feeds,
            store.clone(),
            config.news.max_parallel_fetches,
        )),
        config.news.interval(),
    );

    let screener_client = build_client(config.request_timeout(), &config.screener.user_agent)?;
    let screener: Arc<dyn Fetcher<Record = FundSnapshot>> = Arc::new(ScreenerFetcher::new(
        config.screener.url.clone(),
        config.screener.effective_page_size(),
        config.screener.max_rows,
        screener_client,
    ));
    info!(
        url = %config.screener.url,
        interval_secs = config.screener.interval_secs,
        "Scheduling fund screener collection"
    );
    supervisor.spawn(
        Arc::new(Pipeline::new("funds", vec![screener], store.clone(), 1)),
        config.screener.interval(),
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Cannot listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}
