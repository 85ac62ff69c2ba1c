//! RSS 2.0 feed fetcher.
//!
//! Each configured feed is fetched with one GET. Every `<item>` becomes a
//! [`NewsArticle`] built from the named fields `title`, `pubDate` and
//! `description`; the article `source` is the feed's configured name.
//!
//! Items are isolated from each other: a missing field turns into
//! [`NOT_AVAILABLE`] and an unparseable date into the capture instant. Only a
//! document that is not well-formed is rejected, and then only for this feed.

use crate::error::FetchError;
use crate::models::{NOT_AVAILABLE, NewsArticle};
use crate::scrapers::{Fetcher, get_text};
use crate::utils::{parse_feed_date, truncate_for_log};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::Event;
use reqwest::Client;
use tracing::{error, info, instrument, warn};
use url::Url;

/// Fetches one syndication feed.
#[derive(Debug, Clone)]
pub struct RssFetcher {
    name: String,
    url: Url,
    client: Client,
}

impl RssFetcher {
    pub fn new(name: impl Into<String>, url: Url, client: Client) -> Self {
        Self {
            name: name.into(),
            url,
            client,
        }
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    type Record = NewsArticle;

    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(level = "info", skip_all, fields(source = %self.name))]
    async fn fetch(&self, captured_at: DateTime<Utc>) -> Vec<NewsArticle> {
        let body = match get_text(&self.client, &self.name, &self.url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Feed fetch failed; contributing no articles");
                return Vec::new();
            }
        };

        match parse_feed(&body, &self.name, captured_at) {
            Ok(articles) => {
                info!(count = articles.len(), "Parsed feed");
                articles
            }
            Err(e) => {
                error!(
                    error = %e,
                    body_preview = %truncate_for_log(&body, 200),
                    "Feed document rejected"
                );
                Vec::new()
            }
        }
    }
}

/// The named fields read from an `<item>`.
#[derive(Debug, Default)]
struct RawItem {
    title: Option<String>,
    pub_date: Option<String>,
    description: Option<String>,
}

impl RawItem {
    fn into_article(self, source: &str, captured_at: DateTime<Utc>) -> NewsArticle {
        NewsArticle {
            title: self.title.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            source: source.to_string(),
            published_date: parse_feed_date(self.pub_date.as_deref(), captured_at),
            content: self
                .description
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        }
    }
}

/// Parse an RSS document into articles.
///
/// # Errors
///
/// [`FetchError::Malformed`] when the XML is not well-formed.
pub fn parse_feed(
    xml: &str,
    source: &str,
    captured_at: DateTime<Utc>,
) -> Result<Vec<NewsArticle>, FetchError> {
    let malformed = |reason: String| FetchError::Malformed {
        source_name: source.to_string(),
        reason,
    };

    let mut reader = Reader::from_str(xml);

    let mut articles = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"item" => {
                let item = read_item(&mut reader).map_err(malformed)?;
                articles.push(item.into_article(source, captured_at));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(e.to_string())),
        }
    }
    Ok(articles)
}

/// Read the children of an `<item>` up to and including its end tag.
fn read_item(reader: &mut Reader<&[u8]>) -> Result<RawItem, String> {
    let mut item = RawItem::default();
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let field = e.local_name().as_ref().to_vec();
                let value = read_field(reader)?;
                match field.as_slice() {
                    b"title" => item.title = value,
                    b"pubDate" => item.pub_date = value,
                    b"description" => item.description = value,
                    _ => {}
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"item" => return Ok(item),
            Event::Eof => return Err("document ended inside <item>".to_string()),
            _ => {}
        }
    }
}

/// Collect the text of one field up to its end tag.
///
/// Text, CDATA sections and entity references are joined in document order,
/// then trimmed. Blank text yields `None`.
fn read_field(reader: &mut Reader<&[u8]>) -> Result<Option<String>, String> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Text(e) => {
                let raw = String::from_utf8_lossy(&e);
                match unescape(&raw) {
                    Ok(unescaped) => text.push_str(&unescaped),
                    Err(_) => text.push_str(&raw),
                }
            }
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::GeneralRef(e) => push_reference(&mut text, &String::from_utf8_lossy(&e)),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err("document ended inside an item field".to_string()),
            _ => {}
        }
    }
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

/// Resolve `&name;`. References that cannot be resolved are kept verbatim.
fn push_reference(text: &mut String, name: &str) {
    let resolved = match name.strip_prefix('#') {
        Some(code) => {
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => code.parse::<u32>().ok(),
            };
            value.and_then(char::from_u32).map(String::from)
        }
        None => resolve_predefined_entity(name).map(String::from),
    };
    match resolved {
        Some(value) => text.push_str(&value),
        None => {
            text.push('&');
            text.push_str(name);
            text.push(';');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Financial Services Latest News</title>
    <link>https://www.prnewswire.com/</link>
    <item>
      <title>Acme &amp; Co. Reports Record Quarter</title>
      <link>https://www.prnewswire.com/news/acme</link>
      <guid isPermaLink="false">acme-1</guid>
      <pubDate>Thu, 16 Jan 2025 09:30:00 -0500</pubDate>
      <description><![CDATA[  <p>Revenue rose 12%.</p>  ]]></description>
      <dc:creator>Acme</dc:creator>
    </item>
    <item>
      <pubDate>sometime last week</pubDate>
      <description>   </description>
    </item>
  </channel>
</rss>"#;

    fn captured_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 17, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_feed_reads_named_fields() {
        let articles = parse_feed(FEED, "PR Newswire", captured_at()).unwrap();
        assert_eq!(articles.len(), 2);

        let first = &articles[0];
        assert_eq!(first.title, "Acme & Co. Reports Record Quarter");
        assert_eq!(first.source, "PR Newswire");
        assert_eq!(
            first.published_date,
            Utc.with_ymd_and_hms(2025, 1, 16, 14, 30, 0).unwrap()
        );
        assert_eq!(first.content, "<p>Revenue rose 12%.</p>");
    }

    #[test]
    fn test_parse_feed_substitutes_missing_fields() {
        let articles = parse_feed(FEED, "PR Newswire", captured_at()).unwrap();
        let second = &articles[1];
        assert_eq!(second.title, NOT_AVAILABLE);
        assert_eq!(second.content, NOT_AVAILABLE);
        assert_eq!(second.published_date, captured_at());
    }

    #[test]
    fn test_parse_feed_ignores_channel_title() {
        let articles = parse_feed(FEED, "PR Newswire", captured_at()).unwrap();
        assert!(articles.iter().all(|a| a.title != "Financial Services Latest News"));
    }

    #[test]
    fn test_parse_feed_rejects_malformed_document() {
        let xml = "<rss><channel><item><title>Broken</item></channel></rss>";
        let result = parse_feed(xml, "Business Wire", captured_at());
        assert!(matches!(result, Err(FetchError::Malformed { .. })));
    }

    #[test]
    fn test_parse_feed_empty_channel() {
        let xml = "<rss><channel><title>Nothing</title></channel></rss>";
        assert!(parse_feed(xml, "Business Wire", captured_at()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_feed_joins_text_and_cdata() {
        let xml = r#"<rss><channel><item>
            <title>Rates &amp; <![CDATA[<Bonds>]]> weekly</title>
            <description>Intro <![CDATA[<b>bold</b>]]> tail &#8212; end</description>
        </item></channel></rss>"#;
        let articles = parse_feed(xml, "Business Wire", captured_at()).unwrap();
        assert_eq!(articles[0].title, "Rates & <Bonds> weekly");
        assert_eq!(articles[0].content, "Intro <b>bold</b> tail \u{2014} end");
    }

    #[test]
    fn test_parse_feed_keeps_unknown_entities() {
        let xml = "<rss><channel><item><title>a&nbsp;b</title></item></channel></rss>";
        let articles = parse_feed(xml, "Business Wire", captured_at()).unwrap();
        assert_eq!(articles[0].title, "a&nbsp;b");
    }

    #[tokio::test]
    async fn test_fetch_non_success_yields_nothing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rss")
            .with_status(500)
            .create_async()
            .await;

        let client = crate::scrapers::build_client(Duration::from_secs(5), "finfeed-test").unwrap();
        let url = Url::parse(&format!("{}/rss", server.url())).unwrap();
        let fetcher = RssFetcher::new("PR Newswire", url, client);

        assert!(fetcher.fetch(captured_at()).await.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_parses_served_feed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/rss")
            .with_status(200)
            .with_header("content-type", "application/rss+xml")
            .with_body(FEED)
            .create_async()
            .await;

        let client = crate::scrapers::build_client(Duration::from_secs(5), "finfeed-test").unwrap();
        let url = Url::parse(&format!("{}/rss", server.url())).unwrap();
        let fetcher = RssFetcher::new("PR Newswire", url, client);

        let articles = fetcher.fetch(captured_at()).await;
        assert_eq!(articles.len(), 2);
        assert_eq!(fetcher.name(), "PR Newswire");
    }
}
