use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Reporting granularity consulted for an entity's statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Annual,
    Quarterly,
}

impl PeriodKind {
    pub const ALL: [Self; 2] = [Self::Annual, Self::Quarterly];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Annual => "annual",
            Self::Quarterly => "quarterly",
        }
    }

    /// Statement durations in months, most preferred first. `None` stands for
    /// statements whose duration the provider did not report.
    pub const fn preferred_months(self) -> &'static [Option<u32>] {
        match self {
            Self::Annual => &[Some(12), None],
            Self::Quarterly => &[Some(3), Some(6), Some(9), None],
        }
    }
}

impl Display for PeriodKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "annual" => Ok(Self::Annual),
            "quarterly" => Ok(Self::Quarterly),
            other => Err(ValidationError::InvalidPeriod {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_period() {
        let period = PeriodKind::from_str(" Quarterly").expect("must parse");
        assert_eq!(period, PeriodKind::Quarterly);
    }

    #[test]
    fn rejects_invalid_period() {
        let err = PeriodKind::from_str("monthly").expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidPeriod { .. }));
    }
}
