use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Reporting date: a fiscal year and a quarter, where quarter 0 means the
/// whole year.
///
/// Ordering is lexicographic on `(year, quarter)`, so a sorted set of dates is
/// processed chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Date {
    pub year: i32,
    pub quarter: u8,
}

impl Date {
    pub fn new(year: i32, quarter: u8) -> Result<Self, ValidationError> {
        if quarter > 4 {
            return Err(ValidationError::InvalidQuarter { value: quarter });
        }
        Ok(Self { year, quarter })
    }

    pub const fn annual(year: i32) -> Self {
        Self { year, quarter: 0 }
    }

    pub const fn is_annual(self) -> bool {
        self.quarter == 0
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_annual() {
            write!(f, "{}", self.year)
        } else {
            write!(f, "{}Q{}", self.year, self.quarter)
        }
    }
}

impl FromStr for Date {
    type Err = ValidationError;

    /// Accepts `2020` (annual) or `2020Q3`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidDate {
            value: value.to_owned(),
        };
        let trimmed = value.trim().to_ascii_uppercase();
        let (year, quarter) = match trimmed.split_once('Q') {
            Some((year, quarter)) => (year, quarter.parse::<u8>().map_err(|_| invalid())?),
            None => (trimmed.as_str(), 0),
        };
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        Self::new(year, quarter)
    }
}

impl TryFrom<String> for Date {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Date> for String {
    fn from(value: Date) -> Self {
        value.to_string()
    }
}
