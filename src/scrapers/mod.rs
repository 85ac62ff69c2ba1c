//! Source fetchers for news feeds and the fund screener.
//!
//! Every fetcher implements [`Fetcher`]: one call returns the candidate records
//! for one cycle and never fails. Problems are handled at this boundary:
//!
//! | Problem | Handling |
//! |---------|----------|
//! | Non-success status, network error | Logged; that feed/page contributes nothing |
//! | Document not well-formed | Logged; that feed/page contributes nothing |
//! | Missing field in a feed item | Field becomes `"N/A"` |
//! | Unparseable feed date | Capture instant is used |
//! | Screener row of the wrong width | Row skipped |
//! | Screener row missing a labelled cell | Row rejected, logged as markup change |
//!
//! # Supported Sources
//!
//! | Source | Module | Method |
//! |--------|--------|--------|
//! | Syndication feeds (PR Newswire, Business Wire, ...) | [`rss`] | RSS 2.0 XML |
//! | Yahoo Finance mutual-fund screener | [`screener`] | HTML table scraping |

pub mod rss;
pub mod screener;

use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// A source of candidate records.
#[async_trait]
pub trait Fetcher: Send + Sync {
    type Record: Send;

    /// Display name used in logs and as the news `source` field.
    fn name(&self) -> &str;

    /// Fetch everything the source currently offers.
    ///
    /// `captured_at` is the instant the cycle started; it stands in for any
    /// timestamp the source fails to provide.
    async fn fetch(&self, captured_at: DateTime<Utc>) -> Vec<Self::Record>;
}

/// Build the HTTP client shared by a fetcher's requests.
pub fn build_client(timeout: Duration, user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
}

/// GET a URL and return its body, mapping failures to [`FetchError`].
#[instrument(level = "debug", skip_all, fields(source = source_name, %url))]
pub(crate) async fn get_text(
    client: &Client,
    source_name: &str,
    url: &Url,
) -> Result<String, FetchError> {
    let http_err = |e: reqwest::Error| FetchError::Http {
        source_name: source_name.to_string(),
        reason: e.to_string(),
    };

    let response = client.get(url.clone()).send().await.map_err(http_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            source_name: source_name.to_string(),
            status: status.as_u16(),
        });
    }
    let body = response.text().await.map_err(http_err)?;
    debug!(bytes = body.len(), "Fetched body");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_text_maps_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/down")
            .with_status(503)
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5), "finfeed-test").unwrap();
        let url = Url::parse(&format!("{}/down", server.url())).unwrap();
        let err = get_text(&client, "Test", &url).await.unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_get_text_returns_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("hello")
            .create_async()
            .await;

        let client = build_client(Duration::from_secs(5), "finfeed-test").unwrap();
        let url = Url::parse(&format!("{}/ok", server.url())).unwrap();
        assert_eq!(get_text(&client, "Test", &url).await.unwrap(), "hello");
    }
}
