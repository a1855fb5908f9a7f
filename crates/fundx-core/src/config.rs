//! Report run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::{Date, PeriodKind, Symbol};

/// Environment variable consulted when no statements directory is configured.
pub const STATEMENTS_DIR_ENV: &str = "FUNDX_STATEMENTS_DIR";

/// What to evaluate and where the inputs live.
///
/// ```toml
/// symbols = ["AAPL", "MSFT"]
/// period = "quarterly"
/// dates = ["2020Q3", "2020Q4"]
/// rules = "rules/liquidity.yaml"
/// statements = "fixtures/statements"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub symbols: Vec<Symbol>,

    #[serde(default = "default_period")]
    pub period: PeriodKind,

    #[serde(default)]
    pub dates: Vec<Date>,

    /// Rule document (YAML or JSON)
    pub rules: Option<PathBuf>,

    /// Directory of `<SYMBOL>/<DATE>.json` filings
    pub statements: Option<PathBuf>,
}

fn default_period() -> PeriodKind {
    PeriodKind::Annual
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            period: default_period(),
            dates: Vec::new(),
            rules: None,
            statements: None,
        }
    }
}

impl ReportConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(content)?)
    }

    /// Configured statements directory, else the `FUNDX_STATEMENTS_DIR` value.
    pub fn statements_dir(&self) -> Option<PathBuf> {
        self.statements.clone().or_else(|| {
            std::env::var_os(STATEMENTS_DIR_ENV)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = ReportConfig::from_toml_str(
            r#"
symbols = ["aapl", "MSFT"]
period = "quarterly"
dates = ["2020Q4", "2020Q3"]
rules = "rules.yaml"
statements = "statements"
"#,
        )
        .expect("config should parse");

        assert_eq!(config.symbols[0].as_str(), "AAPL");
        assert_eq!(config.period, PeriodKind::Quarterly);
        assert_eq!(config.dates[1], Date::new(2020, 3).expect("date"));
        assert_eq!(config.rules, Some(PathBuf::from("rules.yaml")));
        assert_eq!(config.statements_dir(), Some(PathBuf::from("statements")));
    }

    #[test]
    fn applies_defaults() {
        let config = ReportConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config, ReportConfig::default());
    }

    #[test]
    fn rejects_invalid_values() {
        let err = ReportConfig::from_toml_str(r#"dates = ["2020Q9"]"#).expect_err("must fail");
        assert!(matches!(err, CoreError::Config(_)));
    }
}
