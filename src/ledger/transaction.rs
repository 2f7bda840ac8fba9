use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Calendar-date format used for transaction dates at rest.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A recorded outflow. Immutable once created; removal is full deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: String,
    pub amount: f64,
    pub description: String,
    /// ISO 8601 calendar date (`YYYY-MM-DD`).
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl Expense {
    pub fn new(
        amount: f64,
        description: impl Into<String>,
        date: Option<NaiveDate>,
        category_id: Option<String>,
    ) -> Self {
        Self {
            id: new_entry_id(),
            amount,
            description: description.into(),
            date: format_entry_date(date),
            category_id,
        }
    }
}

/// A recorded inflow. `source` is free text describing where it came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Income {
    pub id: String,
    pub amount: f64,
    pub description: String,
    /// ISO 8601 calendar date (`YYYY-MM-DD`).
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Income {
    pub fn new(
        amount: f64,
        description: impl Into<String>,
        date: Option<NaiveDate>,
        source: Option<String>,
    ) -> Self {
        Self {
            id: new_entry_id(),
            amount,
            description: description.into(),
            date: format_entry_date(date),
            source,
        }
    }
}

/// Common surface the aggregator needs from expenses and incomes.
pub trait LedgerEntry {
    fn amount(&self) -> f64;
    fn date_str(&self) -> &str;

    /// Parsed calendar date, `None` when missing or unparsable.
    fn parsed_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date_str(), DATE_FORMAT).ok()
    }
}

impl LedgerEntry for Expense {
    fn amount(&self) -> f64 {
        self.amount
    }

    fn date_str(&self) -> &str {
        &self.date
    }
}

impl LedgerEntry for Income {
    fn amount(&self) -> f64 {
        self.amount
    }

    fn date_str(&self) -> &str {
        &self.date
    }
}

/// Generates a unique, separator-free id for a new entry.
pub(crate) fn new_entry_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn format_entry_date(date: Option<NaiveDate>) -> String {
    date.unwrap_or_else(|| Local::now().date_naive())
        .format(DATE_FORMAT)
        .to_string()
}
