//! Error types for the fetch, persist and query paths.
//!
//! Every error in the collection pipeline is recoverable. Fetch errors are
//! swallowed at the fetcher boundary, persistence errors roll back one cycle,
//! and query errors are reported to the HTTP caller. Only [`ConfigError`] can
//! stop the process, and only before any scheduler loop has started.

use thiserror::Error;

/// A source could not be fetched or its document could not be read.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The upstream answered with a non-success status.
    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    /// Connection, TLS, timeout or body read failure.
    #[error("request to {source_name} failed: {reason}")]
    Http { source_name: String, reason: String },

    /// The document as a whole is not well-formed.
    #[error("malformed document from {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },
}

/// A collection cycle failed after fetching.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("persistence failed: {0}")]
    Persistence(#[from] sqlx::Error),
}

/// A read query was rejected before reaching the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("unknown sort field `{0}`")]
    UnknownSortField(String),

    #[error("invalid sort order `{0}` (expected `asc` or `desc`)")]
    InvalidSortOrder(String),

    #[error("invalid value `{value}` for `{param}`")]
    InvalidValue { param: String, value: String },
}

/// Startup configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let e = FetchError::Status {
            source_name: "PR Newswire".to_string(),
            status: 503,
        };
        assert_eq!(e.to_string(), "PR Newswire returned HTTP 503");
    }

    #[test]
    fn test_query_error_display() {
        let e = QueryError::UnknownSortField("nonexistent_field".to_string());
        assert_eq!(e.to_string(), "unknown sort field `nonexistent_field`");
    }
}
