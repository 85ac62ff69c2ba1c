//! Yahoo Finance mutual-fund screener scraper.
//!
//! The screener is an HTML table paginated with `start`/`count` query
//! parameters. Rows are `tr.simpTblRow`. Columns are located by name rather
//! than by position: every [`FundColumn`] is read from the cell whose
//! `aria-label` is the column's [markup label](FundColumn::markup_label), so a
//! markup change surfaces as a rejected row at this boundary instead of
//! silently shifted values.
//!
//! # Row policy
//!
//! - A row whose cell count differs from the schema width is skipped.
//! - A row of the right width that lacks a labelled cell is rejected and logged.

use crate::models::{FundColumn, FundSnapshot};
use crate::scrapers::{Fetcher, get_text};
use crate::utils::collapse_whitespace;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

const SOURCE_NAME: &str = "Yahoo Finance screener";

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr.simpTblRow").expect("row selector is valid"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("cell selector is valid"));

/// Column → cell selector table, in screener order.
static COLUMN_SELECTORS: Lazy<Vec<(FundColumn, Selector)>> = Lazy::new(|| {
    FundColumn::ALL
        .iter()
        .map(|column| {
            let css = format!(r#"td[aria-label="{}"]"#, column.markup_label());
            let selector = Selector::parse(&css).expect("column selector is valid");
            (*column, selector)
        })
        .collect()
});

/// What became of the rows on one page.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub rows_seen: usize,
    pub wrong_width: usize,
    pub missing_label: usize,
}

/// Fetches the fund screener, one or more pages per cycle.
#[derive(Debug, Clone)]
pub struct ScreenerFetcher {
    base_url: Url,
    page_size: usize,
    max_rows: usize,
    client: Client,
}

impl ScreenerFetcher {
    /// # Arguments
    ///
    /// * `base_url` - Screener URL without pagination parameters
    /// * `page_size` - Rows per request (50 or 100)
    /// * `max_rows` - Rows fetched per cycle across all pages
    /// * `client` - HTTP client carrying the browser User-Agent
    pub fn new(base_url: Url, page_size: usize, max_rows: usize, client: Client) -> Self {
        Self {
            base_url,
            page_size: page_size.max(1),
            max_rows,
            client,
        }
    }

    /// URLs for every page of one cycle.
    pub fn page_urls(&self) -> Vec<Url> {
        (0..self.max_rows)
            .step_by(self.page_size)
            .map(|start| {
                let mut url = self.base_url.clone();
                url.query_pairs_mut()
                    .append_pair("start", &start.to_string())
                    .append_pair("count", &self.page_size.to_string());
                url
            })
            .collect()
    }
}

#[async_trait]
impl Fetcher for ScreenerFetcher {
    type Record = FundSnapshot;

    fn name(&self) -> &str {
        SOURCE_NAME
    }

    #[instrument(level = "info", skip_all, fields(source = SOURCE_NAME))]
    async fn fetch(&self, _captured_at: DateTime<Utc>) -> Vec<FundSnapshot> {
        let mut snapshots = Vec::new();
        for url in self.page_urls() {
            let body = match get_text(&self.client, SOURCE_NAME, &url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(%url, error = %e, "Screener page fetch failed; skipping page");
                    continue;
                }
            };
            let (rows, report) = parse_screener_page(&body);
            if report.missing_label > 0 {
                warn!(
                    %url,
                    rejected = report.missing_label,
                    "Screener rows missing labelled cells; markup may have changed"
                );
            }
            debug!(%url, ?report, parsed = rows.len(), "Parsed screener page");
            snapshots.extend(rows);
        }
        info!(count = snapshots.len(), "Fetched screener rows");
        snapshots
    }
}

/// Parse one screener page into snapshots.
pub fn parse_screener_page(html: &str) -> (Vec<FundSnapshot>, PageReport) {
    let document = Html::parse_document(html);
    let mut report = PageReport::default();
    let mut snapshots = Vec::new();

    for row in document.select(&ROW_SELECTOR) {
        report.rows_seen += 1;
        if row.select(&CELL_SELECTOR).count() != FundColumn::ALL.len() {
            report.wrong_width += 1;
            continue;
        }
        match extract_row(row) {
            Some(snapshot) => snapshots.push(snapshot),
            None => report.missing_label += 1,
        }
    }
    (snapshots, report)
}

fn extract_row(row: ElementRef<'_>) -> Option<FundSnapshot> {
    let mut snapshot = FundSnapshot::default();
    for (column, selector) in COLUMN_SELECTORS.iter() {
        let cell = row.select(selector).next()?;
        snapshot.set(*column, cell_text(cell));
    }
    Some(snapshot)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" "))
}
