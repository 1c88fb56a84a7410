//! Core data models shared by the walkers, the normalizer, and the stores.
//!
//! A run turns [`FetchUnit`]s into [`RawRecord`]s (the upstream JSON shape),
//! normalizes them into [`CanonicalRecord`]s, and upserts those into a
//! [`Collection`] keyed by `uri`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar month, the archive-mode fetch granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    /// 1-based month (1 = January).
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        Self { year, month }
    }

    /// Months elapsed since year 0, used for offset arithmetic.
    pub fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    pub fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// Shift by a signed number of months.
    pub fn add_months(&self, months: i64) -> Self {
        Self::from_ordinal(self.ordinal() + months)
    }

    /// The month following this one, wrapping December into January.
    pub fn succ(&self) -> Self {
        self.add_months(1)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One independently retryable request target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchUnit {
    /// `GET {base}/{year}/{month}.json`
    Month(YearMonth),
    /// `GET {base}/articlesearch.json?page={n}`
    Page(u32),
}

impl FetchUnit {
    /// Endpoint path relative to the mode's base URL.
    pub fn endpoint(&self) -> String {
        match self {
            FetchUnit::Month(ym) => format!("{}/{}.json", ym.year, ym.month),
            FetchUnit::Page(_) => "articlesearch.json".to_string(),
        }
    }

    /// Unit-specific query parameters (the API key is added by the client).
    pub fn params(&self) -> Vec<(String, String)> {
        match self {
            FetchUnit::Month(_) => Vec::new(),
            FetchUnit::Page(n) => vec![("page".to_string(), n.to_string())],
        }
    }
}

impl fmt::Display for FetchUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchUnit::Month(ym) => write!(f, "month {}", ym),
            FetchUnit::Page(n) => write!(f, "page {}", n),
        }
    }
}

/// One article exactly as the upstream API returned it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord(pub serde_json::Value);

impl RawRecord {
    pub fn uri(&self) -> Option<&str> {
        self.0.get("uri").and_then(|v| v.as_str())
    }
}

impl From<serde_json::Value> for RawRecord {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// The persisted article shape.
///
/// `uri` is the natural key; a collection holds at most one record per `uri`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub uri: String,
    pub headline: Option<String>,
    pub byline: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub section: String,
    pub subsection: String,
    pub word_count: Option<i64>,
    /// Assigned only in search mode.
    pub sequence_id: Option<i64>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub web_url: Option<String>,
    pub lead_paragraph: Option<String>,
    pub snippet: Option<String>,
    pub source: Option<String>,
    pub document_type: Option<String>,
    pub news_desk: Option<String>,
    pub type_of_material: Option<String>,
    /// Upstream fields with no dedicated column.
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// SHA-256 over every field above except `sequence_id`.
    pub content_hash: String,
}

/// The two article collections kept by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Archive,
    Search,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Archive => "archive",
            Collection::Search => "search",
        }
    }

    /// Backing SQL table.
    pub fn table(&self) -> &'static str {
        match self {
            Collection::Archive => "archive_articles",
            Collection::Search => "search_articles",
        }
    }

    pub fn all() -> [Collection; 2] {
        [Collection::Archive, Collection::Search]
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive" => Ok(Collection::Archive),
            "search" => Ok(Collection::Search),
            other => Err(format!(
                "unknown collection '{}': expected archive or search",
                other
            )),
        }
    }
}

/// What an upsert did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same content hash and sequence id; nothing was written.
    Unchanged,
}
