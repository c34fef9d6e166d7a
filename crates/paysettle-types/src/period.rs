//! Settlement periods

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, SettlementError};

/// A contiguous, inclusive date range transactions are aggregated over
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SettlementPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SettlementPeriod {
    /// Create a period, rejecting ranges that end before they start
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(SettlementError::invalid_input(
                "period",
                format!("end {} is before start {}", end, start),
            ));
        }
        Ok(Self { start, end })
    }

    /// Number of days covered, both ends included
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for SettlementPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Add calendar months to a date, clamping to the end of the target month
pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| SettlementError::invalid_input("months", format!("{} + {} months overflows", date, months)))
}
