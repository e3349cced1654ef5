//! Calendar helpers for billing periods
//!
//! Billing periods are inclusive date windows (`DOSFrom..=DOSTo`). Month
//! arithmetic clamps to the last day of the target month, so Jan 31 plus one
//! month is Feb 28 (or 29).

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod {
        start: String,
        end: String,
    },

    #[error("Date out of range: {0}")]
    OutOfRange(String),
}

/// Adds calendar months, clamping the day to the end of the target month
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(NaiveDate::MAX)
}

/// Subtracts calendar months, clamping the day to the end of the target month
pub fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months)).unwrap_or(NaiveDate::MIN)
}

/// First day of the month containing `date`
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing `date`
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    add_months(start_of_month(date), 1)
        .pred_opt()
        .unwrap_or(date)
}

/// Number of days in the month containing `date`
pub fn days_in_month(date: NaiveDate) -> u32 {
    end_of_month(date).day()
}

/// Inclusive day count between two dates (`from..=to`), zero when reversed
pub fn inclusive_days(from: NaiveDate, to: NaiveDate) -> i64 {
    if to < from {
        0
    } else {
        (to - from).num_days() + 1
    }
}

/// An inclusive date window, used for dates of service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting an end before the start
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// A single-day range
    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Inclusive number of days covered
    pub fn days(&self) -> i64 {
        inclusive_days(self.start, self.end)
    }

    /// Returns the range with its end clamped to `limit` when `limit` falls inside it
    pub fn clamp_end(&self, limit: NaiveDate) -> Self {
        if limit >= self.start && limit < self.end {
            Self { start: self.start, end: limit }
        } else {
            *self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_add_months_clamps_day() {
        assert_eq!(add_months(d(2024, 1, 31), 1), d(2024, 2, 29));
        assert_eq!(add_months(d(2023, 1, 31), 1), d(2023, 2, 28));
        assert_eq!(add_months(d(2023, 11, 15), 3), d(2024, 2, 15));
    }

    #[test]
    fn test_month_boundaries() {
        assert_eq!(start_of_month(d(2024, 2, 17)), d(2024, 2, 1));
        assert_eq!(end_of_month(d(2024, 2, 17)), d(2024, 2, 29));
        assert_eq!(end_of_month(d(2023, 12, 1)), d(2023, 12, 31));
        assert_eq!(days_in_month(d(2023, 4, 30)), 30);
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::new(d(2024, 3, 1), d(2024, 3, 31)).unwrap();
        assert_eq!(range.days(), 31);
        assert!(range.contains(d(2024, 3, 15)));
        assert!(!range.contains(d(2024, 4, 1)));
        assert_eq!(range.clamp_end(d(2024, 3, 10)).end, d(2024, 3, 10));
        assert_eq!(range.clamp_end(d(2024, 5, 10)).end, d(2024, 3, 31));
        assert!(DateRange::new(d(2024, 3, 2), d(2024, 3, 1)).is_err());
    }
}
