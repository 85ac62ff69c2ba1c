//! Validation of read-API query parameters.
//!
//! Raw HTTP parameters are turned into a typed [`FundQuery`] before anything
//! touches the store. Column names and sort keys resolve through the closed
//! [`FundColumn`] set, so no caller-supplied text ever becomes SQL.
//!
//! | Parameter | Meaning |
//! |-----------|---------|
//! | `<column query name>` | Equality filter (`name` is a case-insensitive substring) |
//! | `year`, `month`, `day` | Capture-bucket equality, integers |
//! | `sort_by` | A column query name, `captured_at` or `id` |
//! | `sort_order` | `asc` (default) or `desc` |
//! | `start`, `count` | Offset and page size |
//!
//! Unrecognised parameters are ignored.

use crate::error::QueryError;
use crate::models::FundColumn;
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 500;
pub const MAX_NEWS_LIMIT: i64 = 100;

/// What a fund query may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Column(FundColumn),
    CapturedAt,
    Id,
}

impl SortField {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        match raw {
            "captured_at" => Ok(SortField::CapturedAt),
            "id" => Ok(SortField::Id),
            other => FundColumn::from_query_name(other)
                .map(SortField::Column)
                .ok_or_else(|| QueryError::UnknownSortField(other.to_string())),
        }
    }

    /// SQL ordering expression. Numeric columns are compared by value once
    /// thousands separators, percent and plus signs are stripped.
    pub fn sql_expr(self) -> String {
        match self {
            SortField::Column(column) if column.is_numeric() => format!(
                "CAST(REPLACE(REPLACE(REPLACE({}, ',', ''), '%', ''), '+', '') AS REAL)",
                column.sql_column()
            ),
            SortField::Column(column) => column.sql_column().to_string(),
            SortField::CapturedAt => "captured_at".to_string(),
            SortField::Id => "id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(QueryError::InvalidSortOrder(raw.to_string())),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// A validated query over stored fund snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundQuery {
    /// Column filters in [`FundColumn::ALL`] order.
    pub filters: Vec<(FundColumn, String)>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    /// `None` means insertion (id) order.
    pub sort: Option<(SortField, SortOrder)>,
    pub start: i64,
    pub count: i64,
}

impl Default for FundQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            year: None,
            month: None,
            day: None,
            sort: None,
            start: 0,
            count: DEFAULT_PAGE_SIZE,
        }
    }
}

impl FundQuery {
    /// Build a query from raw HTTP parameters.
    ///
    /// # Errors
    ///
    /// [`QueryError`] for an unknown sort key, a bad sort order, or a
    /// non-integer bucket/pagination value.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, QueryError> {
        let filters = FundColumn::ALL
            .iter()
            .filter_map(|column| {
                params
                    .get(column.query_name())
                    .map(|value| (*column, value.clone()))
            })
            .collect();

        let order = params
            .get("sort_order")
            .map(|raw| SortOrder::parse(raw))
            .transpose()?
            .unwrap_or_default();
        let sort = params
            .get("sort_by")
            .map(|raw| SortField::parse(raw).map(|field| (field, order)))
            .transpose()?;

        Ok(Self {
            filters,
            year: int_param(params, "year")?,
            month: int_param(params, "month")?,
            day: int_param(params, "day")?,
            sort,
            start: int_param(params, "start")?.unwrap_or(0).max(0),
            count: int_param(params, "count")?
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

/// Resolve the `limit` parameter of `GET /news`.
pub fn news_limit(raw: Option<&str>, default: i64) -> Result<i64, QueryError> {
    let limit = match raw {
        Some(raw) => parse_int("limit", raw)?,
        None => default,
    };
    Ok(limit.clamp(1, MAX_NEWS_LIMIT))
}

fn int_param(params: &HashMap<String, String>, param: &str) -> Result<Option<i64>, QueryError> {
    params
        .get(param)
        .map(|raw| parse_int(param, raw))
        .transpose()
}

fn parse_int(param: &str, raw: &str) -> Result<i64, QueryError> {
    raw.trim().parse().map_err(|_| QueryError::InvalidValue {
        param: param.to_string(),
        value: raw.to_string(),
    })
}
