// Accounting Period (competência) Domain Model

use crate::domain::error::{DomainError, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Year-month accounting bucket a fiscal document belongs to.
///
/// Serialized as `"YYYY-MM"` in payloads and RPC messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::InvalidPeriod(format!(
                "month out of range: {}",
                month
            )));
        }
        if !(1900..=9999).contains(&year) {
            return Err(DomainError::InvalidPeriod(format!("year out of range: {}", year)));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self::from_date(at.date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
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

    /// Zero-padded month, as used in storage keys
    pub fn month_padded(&self) -> String {
        format!("{:02}", self.month)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| DomainError::InvalidPeriod(format!("expected YYYY-MM, got '{}'", s)))?;

        let year: i32 = year
            .parse()
            .map_err(|_| DomainError::InvalidPeriod(format!("invalid year in '{}'", s)))?;
        let month: u32 = month
            .parse()
            .map_err(|_| DomainError::InvalidPeriod(format!("invalid month in '{}'", s)))?;

        Self::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}
