//! Billing periods
//!
//! A period is one calendar month, keyed as `YYYY-MM`. Relative to a given
//! day exactly one period is current; every earlier period is closed and its
//! costs are final.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;

/// Where a period sits relative to today
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    /// Ended before today; immutable
    Closed,
    /// Contains today; still settling
    Current,
    /// Starts after today
    Future,
}

/// Calendar-month billing bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    /// First day of the month
    start: NaiveDate,
}

impl Period {
    /// Create a period from year and month (1-12)
    pub fn new(year: i32, month: u32) -> Result<Self, RecordError> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|start| Self { start })
            .ok_or_else(|| RecordError::InvalidPeriod(format!("{year:04}-{month:02}")))
    }

    /// The period containing `date`
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            start: date - Days::new(u64::from(date.day0())),
        }
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    pub fn month(&self) -> u32 {
        self.start.month()
    }

    /// First day of the period
    pub fn first_day(&self) -> NaiveDate {
        self.start
    }

    /// Last day of the period (inclusive)
    pub fn last_day(&self) -> NaiveDate {
        self.next().start - Days::new(1)
    }

    /// The following period
    pub fn next(&self) -> Self {
        Self {
            start: self.start + Months::new(1),
        }
    }

    /// The preceding period
    pub fn previous(&self) -> Self {
        Self {
            start: self.start - Months::new(1),
        }
    }

    /// Number of days in the period
    pub fn days(&self) -> u32 {
        self.last_day().day()
    }

    /// Classify this period relative to `today`
    pub fn status_on(&self, today: NaiveDate) -> PeriodStatus {
        if today < self.start {
            PeriodStatus::Future
        } else if today > self.last_day() {
            PeriodStatus::Closed
        } else {
            PeriodStatus::Current
        }
    }

    pub fn is_current_on(&self, today: NaiveDate) -> bool {
        self.status_on(today) == PeriodStatus::Current
    }

    pub fn is_closed_on(&self, today: NaiveDate) -> bool {
        self.status_on(today) == PeriodStatus::Closed
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

impl FromStr for Period {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RecordError::InvalidPeriod(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Period {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}
