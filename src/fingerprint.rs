//! Content fingerprints used as the deduplication key.
//!
//! A fingerprint is the SHA-256 of a record's defining fields, joined in a fixed
//! order with the ASCII unit separator. The separator keeps `("ab", "c")` and
//! `("a", "bc")` apart.

use crate::models::{FundColumn, FundSnapshot, NewsArticle};
use chrono::SecondsFormat;
use sha2::{Digest, Sha256};
use std::fmt;

const FIELD_SEPARATOR: u8 = 0x1f;

/// Hex-encoded SHA-256 digest, 64 lowercase characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash an ordered list of field values.
    pub fn of_fields<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut hasher = Sha256::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                hasher.update([FIELD_SEPARATOR]);
            }
            hasher.update(field.as_bytes());
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Records that can be reduced to a [`Fingerprint`].
pub trait Fingerprinted {
    fn fingerprint(&self) -> Fingerprint;
}

/// Title, source and publication instant identify a news item.
impl Fingerprinted for NewsArticle {
    fn fingerprint(&self) -> Fingerprint {
        let published = self
            .published_date
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        Fingerprint::of_fields([self.title.as_str(), self.source.as_str(), published.as_str()])
    }
}

/// Every screener column takes part, the capture time does not.
impl Fingerprinted for FundSnapshot {
    fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_fields(FundColumn::ALL.iter().map(|c| self.get(*c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn article() -> NewsArticle {
        NewsArticle {
            title: "Fund launches".to_string(),
            source: "PR Newswire".to_string(),
            published_date: Utc.with_ymd_and_hms(2025, 1, 16, 14, 30, 0).unwrap(),
            content: "Body".to_string(),
        }
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let fp = article().fingerprint();
        assert_eq!(fp.as_str().len(), 64);
        assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        assert_eq!(article().fingerprint(), article().fingerprint());
    }

    #[test]
    fn test_news_defining_fields_change_fingerprint() {
        let base = article().fingerprint();

        let mut a = article();
        a.title.push('!');
        assert_ne!(a.fingerprint(), base);

        let mut a = article();
        a.source = "Business Wire".to_string();
        assert_ne!(a.fingerprint(), base);

        let mut a = article();
        a.published_date = a.published_date + chrono::Duration::seconds(1);
        assert_ne!(a.fingerprint(), base);
    }

    #[test]
    fn test_news_content_is_not_a_defining_field() {
        let mut a = article();
        a.content = "Edited body".to_string();
        assert_eq!(a.fingerprint(), article().fingerprint());
    }

    #[test]
    fn test_field_boundaries_matter() {
        assert_ne!(
            Fingerprint::of_fields(["ab", "c"]),
            Fingerprint::of_fields(["a", "bc"])
        );
    }

    #[test]
    fn test_every_fund_column_changes_fingerprint() {
        let mut base = FundSnapshot::default();
        for column in FundColumn::ALL {
            base.set(column, "1".to_string());
        }
        let base_fp = base.fingerprint();

        for column in FundColumn::ALL {
            let mut changed = base.clone();
            changed.set(column, "2".to_string());
            assert_ne!(changed.fingerprint(), base_fp, "column {:?}", column);
        }
    }
}
