use std::fmt;

use chrono::{Datelike, Local, NaiveDate};

/// Canonical `YYYY-MM` identifier of a calendar month, used as the storage
/// partition for budgets and as the anchor for monthly aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Month containing the given date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Month containing today, in local time.
    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Parses a `YYYY-MM` token.
    pub fn parse(token: &str) -> Option<Self> {
        let (year, month) = token.split_once('-')?;
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// First calendar day of the month.
    pub fn first_day(&self) -> NaiveDate {
        // Constructed from validated year/month, day 1 always exists.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Last calendar day of the month.
    pub fn last_day(&self) -> NaiveDate {
        self.next().first_day().pred_opt().unwrap_or_else(|| self.first_day())
    }

    /// Returns true when the date falls inside this calendar month.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first_day() && date <= self.last_day()
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_and_parses_round_trip() {
        let key = MonthKey::new(2024, 6).unwrap();
        assert_eq!(key.to_string(), "2024-06");
        assert_eq!(MonthKey::parse("2024-06"), Some(key));
        assert_eq!(MonthKey::parse("2024-13"), None);
        assert_eq!(MonthKey::parse("junk"), None);
    }

    #[test]
    fn month_window_covers_leap_february() {
        let feb = MonthKey::new(2024, 2).unwrap();
        assert_eq!(feb.first_day(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(feb.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert!(feb.contains(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert!(!feb.contains(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
    }

    #[test]
    fn next_and_previous_wrap_across_years() {
        let dec = MonthKey::new(2023, 12).unwrap();
        assert_eq!(dec.next(), MonthKey::new(2024, 1).unwrap());
        assert_eq!(MonthKey::new(2024, 1).unwrap().previous(), dec);
    }
}
