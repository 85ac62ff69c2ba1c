//! Record types shared by the fetchers, the store and the read API.
//!
//! - [`NewsArticle`] and [`FundSnapshot`] are candidate records: freshly fetched,
//!   not yet fingerprinted or persisted.
//! - [`StoredNewsArticle`] and [`StoredFundSnapshot`] are rows read back from the
//!   store. They are never mutated after insert.
//! - [`FundColumn`] is the fixed, ordered column schema of the fund screener. It is
//!   the single place that ties a screener label to a query name and a SQL column.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Placeholder stored when a feed item is missing a field.
pub const NOT_AVAILABLE: &str = "N/A";

/// A news item as parsed from a syndication feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    /// Headline, or [`NOT_AVAILABLE`].
    pub title: String,
    /// Configured display name of the feed the item came from.
    pub source: String,
    /// Publication instant; the capture instant when the feed date is unparseable.
    pub published_date: DateTime<Utc>,
    /// Item description, trimmed, or [`NOT_AVAILABLE`].
    pub content: String,
}

/// A persisted news article.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StoredNewsArticle {
    pub id: i64,
    pub title: String,
    pub source: String,
    pub published_date: DateTime<Utc>,
    pub content: String,
    #[serde(skip)]
    pub hash: String,
    pub captured_at: DateTime<Utc>,
}

/// One column of the mutual-fund screener table.
///
/// The declaration order is the screener's column order and the order in which
/// values are fed to the fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundColumn {
    Symbol,
    Name,
    Chart,
    Price,
    Change,
    ChangePercent,
    Volume,
    YtdReturn,
    ThreeMonthReturn,
    OneYear,
    ThreeYearReturn,
    FiveYearReturn,
    NetExpenseRatio,
    GrossExpenseRatio,
    NetAssets,
    MorningstarRating,
    FiftyDayAvg,
    TwoHundredDayAvg,
    FiftyTwoWeekRange,
}

impl FundColumn {
    /// All columns in screener order.
    pub const ALL: [FundColumn; 19] = [
        FundColumn::Symbol,
        FundColumn::Name,
        FundColumn::Chart,
        FundColumn::Price,
        FundColumn::Change,
        FundColumn::ChangePercent,
        FundColumn::Volume,
        FundColumn::YtdReturn,
        FundColumn::ThreeMonthReturn,
        FundColumn::OneYear,
        FundColumn::ThreeYearReturn,
        FundColumn::FiveYearReturn,
        FundColumn::NetExpenseRatio,
        FundColumn::GrossExpenseRatio,
        FundColumn::NetAssets,
        FundColumn::MorningstarRating,
        FundColumn::FiftyDayAvg,
        FundColumn::TwoHundredDayAvg,
        FundColumn::FiftyTwoWeekRange,
    ];

    /// Key used for this column in JSON responses.
    pub fn label(self) -> &'static str {
        match self {
            FundColumn::Symbol => "Symbol",
            FundColumn::Name => "Name",
            FundColumn::Chart => "1D Chart",
            FundColumn::Price => "Price (Intraday)",
            FundColumn::Change => "Change",
            FundColumn::ChangePercent => "Change %",
            FundColumn::Volume => "Volume",
            FundColumn::YtdReturn => "YTD Return",
            FundColumn::ThreeMonthReturn => "3-Mo Return",
            FundColumn::OneYear => "1-Year",
            FundColumn::ThreeYearReturn => "3-Year Return",
            FundColumn::FiveYearReturn => "5-Year Return",
            FundColumn::NetExpenseRatio => "Net Expense Ratio",
            FundColumn::GrossExpenseRatio => "Gross Expense Ratio",
            FundColumn::NetAssets => "Net Assets",
            FundColumn::MorningstarRating => "Morningstar Rating",
            FundColumn::FiftyDayAvg => "50 Day Avg",
            FundColumn::TwoHundredDayAvg => "200 Day Avg",
            FundColumn::FiftyTwoWeekRange => "52 Week Range",
        }
    }

    /// `aria-label` of this column's cell in the screener markup.
    ///
    /// Matches [`label`](Self::label) except for the fund name, which the
    /// screener labels `Fund Name`.
    pub fn markup_label(self) -> &'static str {
        match self {
            FundColumn::Name => "Fund Name",
            other => other.label(),
        }
    }

    /// Name of the HTTP query parameter that filters on this column.
    pub fn query_name(self) -> &'static str {
        match self {
            FundColumn::Symbol => "symbol",
            FundColumn::Name => "name",
            FundColumn::Chart => "chart",
            FundColumn::Price => "price",
            FundColumn::Change => "change",
            FundColumn::ChangePercent => "change_percent",
            FundColumn::Volume => "volume",
            FundColumn::YtdReturn => "ytd_return",
            FundColumn::ThreeMonthReturn => "three_mo_return",
            FundColumn::OneYear => "one_year",
            FundColumn::ThreeYearReturn => "three_year_return",
            FundColumn::FiveYearReturn => "five_year_return",
            FundColumn::NetExpenseRatio => "net_expense_ratio",
            FundColumn::GrossExpenseRatio => "gross_expense_ratio",
            FundColumn::NetAssets => "net_assets",
            FundColumn::MorningstarRating => "morningstar_rating",
            FundColumn::FiftyDayAvg => "fifty_day_avg",
            FundColumn::TwoHundredDayAvg => "two_hundred_day_avg",
            FundColumn::FiftyTwoWeekRange => "fifty_two_week_range",
        }
    }

    /// SQL column in `fund_snapshots`.
    pub fn sql_column(self) -> &'static str {
        match self {
            FundColumn::Price => "price_intraday",
            other => other.query_name(),
        }
    }

    /// Whether ordering by this column should compare numerically.
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            FundColumn::Symbol
                | FundColumn::Name
                | FundColumn::Chart
                | FundColumn::MorningstarRating
                | FundColumn::FiftyTwoWeekRange
        )
    }

    /// Resolve a query parameter name.
    pub fn from_query_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.query_name() == name)
    }
}

/// One row of the fund screener, all values kept as displayed upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FundSnapshot {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "1D Chart")]
    pub chart: String,
    #[serde(rename = "Price (Intraday)")]
    pub price_intraday: String,
    #[serde(rename = "Change")]
    pub change: String,
    #[serde(rename = "Change %")]
    pub change_percent: String,
    #[serde(rename = "Volume")]
    pub volume: String,
    #[serde(rename = "YTD Return")]
    pub ytd_return: String,
    #[serde(rename = "3-Mo Return")]
    pub three_mo_return: String,
    #[serde(rename = "1-Year")]
    pub one_year: String,
    #[serde(rename = "3-Year Return")]
    pub three_year_return: String,
    #[serde(rename = "5-Year Return")]
    pub five_year_return: String,
    #[serde(rename = "Net Expense Ratio")]
    pub net_expense_ratio: String,
    #[serde(rename = "Gross Expense Ratio")]
    pub gross_expense_ratio: String,
    #[serde(rename = "Net Assets")]
    pub net_assets: String,
    #[serde(rename = "Morningstar Rating")]
    pub morningstar_rating: String,
    #[serde(rename = "50 Day Avg")]
    pub fifty_day_avg: String,
    #[serde(rename = "200 Day Avg")]
    pub two_hundred_day_avg: String,
    #[serde(rename = "52 Week Range")]
    pub fifty_two_week_range: String,
}

impl FundSnapshot {
    /// Borrow the value of one column.
    pub fn get(&self, column: FundColumn) -> &str {
        match column {
            FundColumn::Symbol => &self.symbol,
            FundColumn::Name => &self.name,
            FundColumn::Chart => &self.chart,
            FundColumn::Price => &self.price_intraday,
            FundColumn::Change => &self.change,
            FundColumn::ChangePercent => &self.change_percent,
            FundColumn::Volume => &self.volume,
            FundColumn::YtdReturn => &self.ytd_return,
            FundColumn::ThreeMonthReturn => &self.three_mo_return,
            FundColumn::OneYear => &self.one_year,
            FundColumn::ThreeYearReturn => &self.three_year_return,
            FundColumn::FiveYearReturn => &self.five_year_return,
            FundColumn::NetExpenseRatio => &self.net_expense_ratio,
            FundColumn::GrossExpenseRatio => &self.gross_expense_ratio,
            FundColumn::NetAssets => &self.net_assets,
            FundColumn::MorningstarRating => &self.morningstar_rating,
            FundColumn::FiftyDayAvg => &self.fifty_day_avg,
            FundColumn::TwoHundredDayAvg => &self.two_hundred_day_avg,
            FundColumn::FiftyTwoWeekRange => &self.fifty_two_week_range,
        }
    }

    /// Set the value of one column.
    pub fn set(&mut self, column: FundColumn, value: String) {
        let slot = match column {
            FundColumn::Symbol => &mut self.symbol,
            FundColumn::Name => &mut self.name,
            FundColumn::Chart => &mut self.chart,
            FundColumn::Price => &mut self.price_intraday,
            FundColumn::Change => &mut self.change,
            FundColumn::ChangePercent => &mut self.change_percent,
            FundColumn::Volume => &mut self.volume,
            FundColumn::YtdReturn => &mut self.ytd_return,
            FundColumn::ThreeMonthReturn => &mut self.three_mo_return,
            FundColumn::OneYear => &mut self.one_year,
            FundColumn::ThreeYearReturn => &mut self.three_year_return,
            FundColumn::FiveYearReturn => &mut self.five_year_return,
            FundColumn::NetExpenseRatio => &mut self.net_expense_ratio,
            FundColumn::GrossExpenseRatio => &mut self.gross_expense_ratio,
            FundColumn::NetAssets => &mut self.net_assets,
            FundColumn::MorningstarRating => &mut self.morningstar_rating,
            FundColumn::FiftyDayAvg => &mut self.fifty_day_avg,
            FundColumn::TwoHundredDayAvg => &mut self.two_hundred_day_avg,
            FundColumn::FiftyTwoWeekRange => &mut self.fifty_two_week_range,
        };
        *slot = value;
    }
}

/// A persisted fund snapshot with its capture bucket.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StoredFundSnapshot {
    pub id: i64,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub snapshot: FundSnapshot,
    #[serde(skip)]
    pub hash: String,
    pub captured_at: DateTime<Utc>,
    pub captured_year: i64,
    pub captured_month: i64,
    pub captured_day: i64,
    pub captured_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_fund_columns_are_unique() {
        let labels: HashSet<_> = FundColumn::ALL.iter().map(|c| c.label()).collect();
        let names: HashSet<_> = FundColumn::ALL.iter().map(|c| c.query_name()).collect();
        let sql: HashSet<_> = FundColumn::ALL.iter().map(|c| c.sql_column()).collect();
        assert_eq!(labels.len(), FundColumn::ALL.len());
        assert_eq!(names.len(), FundColumn::ALL.len());
        assert_eq!(sql.len(), FundColumn::ALL.len());
    }

    #[test]
    fn test_from_query_name() {
        assert_eq!(FundColumn::from_query_name("price"), Some(FundColumn::Price));
        assert_eq!(
            FundColumn::from_query_name("three_mo_return"),
            Some(FundColumn::ThreeMonthReturn)
        );
        assert_eq!(FundColumn::from_query_name("Price (Intraday)"), None);
    }

    #[test]
    fn test_markup_label_differs_only_for_name() {
        assert_eq!(FundColumn::Name.label(), "Name");
        assert_eq!(FundColumn::Name.markup_label(), "Fund Name");
        let differing: Vec<_> = FundColumn::ALL
            .into_iter()
            .filter(|c| c.markup_label() != c.label())
            .collect();
        assert_eq!(differing, vec![FundColumn::Name]);
    }

    #[test]
    fn test_get_set_cover_every_column() {
        let mut snapshot = FundSnapshot::default();
        for column in FundColumn::ALL {
            snapshot.set(column, column.query_name().to_uppercase());
        }
        for column in FundColumn::ALL {
            assert_eq!(snapshot.get(column), column.query_name().to_uppercase());
        }
    }

    #[test]
    fn test_fund_snapshot_serializes_with_labels() {
        let mut snapshot = FundSnapshot::default();
        snapshot.set(FundColumn::Symbol, "VTSMX".to_string());
        snapshot.set(FundColumn::Price, "144.16".to_string());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["Symbol"], "VTSMX");
        assert_eq!(json["Price (Intraday)"], "144.16");
    }
}
