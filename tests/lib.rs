//! Shared fixtures for the behaviour suites.

pub use fundx_core::{Date, Filing, RawStatement, StatementLine, Symbol};

pub fn symbol(value: &str) -> Symbol {
    Symbol::parse(value).expect("valid symbol")
}

/// One-column statement line with a single label.
pub fn line(key: &str, label: &str, value: f64) -> StatementLine {
    StatementLine::new(key, [label], vec![value])
}

/// Filing whose three statements share `date` and `months`; only the
/// balance sheet carries lines.
pub fn balance_sheet_filing(date: &str, months: Option<u32>, lines: Vec<StatementLine>) -> Filing {
    Filing {
        balance_sheets: vec![RawStatement::new(date, months, lines)],
        cash_flows: vec![RawStatement::new(date, months, Vec::new())],
        income_statements: vec![RawStatement::new(date, months, Vec::new())],
    }
}
