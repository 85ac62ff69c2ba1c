//! Service configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then the
//! CLI flags and environment variables handled in [`crate::cli`].
//!
//! ```yaml
//! database_url: sqlite://finfeed.db
//! bind_addr: 0.0.0.0:8000
//! news:
//!   interval_secs: 600
//!   feeds:
//!     - name: PR Newswire
//!       url: https://www.prnewswire.com/apac/rss/financial-services-latest-news/financial-services-latest-news-list.rss
//! screener:
//!   interval_secs: 20
//!   max_rows: 100
//! ```

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;
use url::Url;

const PR_NEWSWIRE_FEED: &str = "https://www.prnewswire.com/apac/rss/financial-services-latest-news/financial-services-latest-news-list.rss";
const BUSINESS_WIRE_FEED: &str = "https://feed.businesswire.com/rss/home/?rss=G1QFDERJXkJeGVtWXw==";
const SCREENER_URL: &str = "https://finance.yahoo.com/research-hub/screener/mutualfunds";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// sqlx connection string, e.g. `sqlite://finfeed.db` or `sqlite::memory:`.
    pub database_url: String,
    /// Address the read API listens on.
    pub bind_addr: String,
    /// Timeout applied to every outbound request.
    pub request_timeout_secs: u64,
    pub news: NewsConfig,
    pub screener: ScreenerConfig,
    pub api: ApiConfig,
}

/// News aggregation loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub interval_secs: u64,
    /// Upper bound on feeds fetched at the same time within one cycle.
    pub max_parallel_fetches: usize,
    pub feeds: Vec<FeedConfig>,
}

/// One syndication feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Display name stored as the article source.
    pub name: String,
    pub url: Url,
}

/// Fund screener loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenerConfig {
    pub interval_secs: u64,
    pub url: Url,
    /// Rows requested per page. The screener only honours 50 or 100.
    pub page_size: usize,
    /// Rows fetched per cycle across all pages.
    pub max_rows: usize,
    pub user_agent: String,
}

/// Read API defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Articles returned by `GET /news` when no `limit` is given.
    pub news_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://finfeed.db".to_string(),
            bind_addr: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
            news: NewsConfig::default(),
            screener: ScreenerConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            max_parallel_fetches: 4,
            feeds: vec![
                FeedConfig {
                    name: "PR Newswire".to_string(),
                    url: Url::parse(PR_NEWSWIRE_FEED).expect("default feed URL is valid"),
                },
                FeedConfig {
                    name: "Business Wire".to_string(),
                    url: Url::parse(BUSINESS_WIRE_FEED).expect("default feed URL is valid"),
                },
            ],
        }
    }
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 20,
            url: Url::parse(SCREENER_URL).expect("default screener URL is valid"),
            page_size: 100,
            max_rows: 100,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { news_limit: 8 }
    }
}

impl Config {
    /// Load configuration from an optional YAML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or when
    /// the resulting values fail [`Config::validate`].
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_string(),
                    source,
                })?;
                let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_string(),
                    source,
                })?;
                info!(path, "Loaded configuration file");
                config
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    /// Reject values that would make a loop spin or never fetch anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.news.interval_secs == 0 || self.screener.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.news.max_parallel_fetches == 0 {
            return Err(ConfigError::Invalid(
                "news.max_parallel_fetches must be greater than zero".to_string(),
            ));
        }
        if self.screener.max_rows == 0 {
            return Err(ConfigError::Invalid(
                "screener.max_rows must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl NewsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ScreenerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Page size actually sent upstream: 50 or 100, anything else becomes 100.
    pub fn effective_page_size(&self) -> usize {
        match self.page_size {
            50 | 100 => self.page_size,
            _ => 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.news.feeds.len(), 2);
        assert_eq!(config.news.interval(), Duration::from_secs(600));
        assert_eq!(config.screener.interval(), Duration::from_secs(20));
        assert_eq!(config.api.news_limit, 8);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            r#"
database_url: "sqlite::memory:"
screener:
  interval_secs: 45
"#,
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.screener.interval_secs, 45);
        assert_eq!(config.screener.page_size, 100);
        assert_eq!(config.news.interval_secs, 600);
    }

    #[test]
    fn test_yaml_feeds_replace_defaults() {
        let config = Config::from_yaml(
            r#"
news:
  feeds:
    - name: Example Wire
      url: https://example.com/rss
"#,
        )
        .unwrap();
        assert_eq!(config.news.feeds.len(), 1);
        assert_eq!(config.news.feeds[0].name, "Example Wire");
    }

    #[test]
    fn test_invalid_feed_url_is_rejected() {
        let result = Config::from_yaml(
            r#"
news:
  feeds:
    - name: Broken
      url: "not a url"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let mut config = Config::default();
        config.news.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_effective_page_size() {
        let mut screener = ScreenerConfig::default();
        screener.page_size = 50;
        assert_eq!(screener.effective_page_size(), 50);
        screener.page_size = 25;
        assert_eq!(screener.effective_page_size(), 100);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Some("/nonexistent/finfeed.yaml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
