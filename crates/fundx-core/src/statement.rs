//! Financial statement data and alias-tolerant lookups.
//!
//! Providers label the same line item differently (`us-gaap_AssetsCurrent`,
//! `Total Current Assets`, ...). A [`FinancialDataView`] answers "what is the
//! value of field X" for a list of candidate names, pooling exact key matches
//! and case-insensitive label matches, and rescales cumulative multi-month
//! figures to a quarterly run-rate when the run is quarterly.

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{LookupError, RuleError};
use crate::source::SourceError;
use crate::PeriodKind;

/// One named line item: its aliases and the figures of every source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub key: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl StatementLine {
    pub fn new(
        key: impl Into<String>,
        labels: impl IntoIterator<Item = impl Into<String>>,
        values: Vec<f64>,
    ) -> Self {
        Self {
            key: key.into(),
            labels: labels.into_iter().map(Into::into).collect(),
            values,
        }
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    fn has_label_in(&self, wanted: &HashSet<String>) -> bool {
        self.labels
            .iter()
            .any(|label| wanted.contains(&label.to_lowercase()))
    }
}

/// A single statement as a provider returns it, before period selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatement {
    /// Sortable period-end date text (e.g. `2020-09-30`).
    pub date: String,
    /// Months covered by the figures; `None` when the provider did not say.
    #[serde(default)]
    pub months: Option<u32>,
    pub lines: Vec<StatementLine>,
}

impl RawStatement {
    pub fn new(date: impl Into<String>, months: Option<u32>, lines: Vec<StatementLine>) -> Self {
        Self {
            date: date.into(),
            months,
            lines,
        }
    }

    /// Pick the most recent statement with the most preferred duration for
    /// `period` (annual: 12 months, then unknown; quarterly: 3, 6, 9, then
    /// unknown).
    pub fn select_recent(statements: &[RawStatement], period: PeriodKind) -> Option<&RawStatement> {
        period.preferred_months().iter().find_map(|months| {
            statements
                .iter()
                .enumerate()
                .filter(|(_, statement)| statement.months == *months)
                .max_by(|(lhs_idx, lhs), (rhs_idx, rhs)| {
                    (lhs.date.as_str(), lhs_idx).cmp(&(rhs.date.as_str(), rhs_idx))
                })
                .map(|(_, statement)| statement)
        })
    }
}

/// Alias-tolerant, period-normalized view over one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct FinancialDataView {
    lines: Vec<StatementLine>,
    index: HashMap<String, usize>,
    months: Option<u32>,
    factor: f64,
}

impl FinancialDataView {
    pub fn new(statement: RawStatement, period: PeriodKind) -> Self {
        let factor = match (period, statement.months) {
            (PeriodKind::Quarterly, Some(months)) if months > 0 => f64::from(months) / 3.0,
            _ => 1.0,
        };
        let index = statement
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (line.key.clone(), idx))
            .collect();

        Self {
            lines: statement.lines,
            index,
            months: statement.months,
            factor,
        }
    }

    pub const fn months(&self) -> Option<u32> {
        self.months
    }

    /// Divisor applied to every returned figure.
    pub const fn factor(&self) -> f64 {
        self.factor
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(|line| line.key.as_str())
    }

    /// Resolve one logical field through its candidate names.
    ///
    /// Exact key matches are pooled first, then lines whose labels intersect
    /// the candidates case-insensitively. The first non-zero pooled value
    /// wins; when every match is zero the last one is returned.
    pub fn get<S: AsRef<str>>(&self, candidates: &[S]) -> Result<f64, LookupError> {
        let by_key = candidates
            .iter()
            .filter_map(|candidate| self.index.get(candidate.as_ref()))
            .map(|idx| self.lines[*idx].total() / self.factor);

        let wanted = lowercase_set(candidates);
        let by_label = self
            .lines
            .iter()
            .filter(|line| line.has_label_in(&wanted))
            .map(|line| line.total() / self.factor);

        let pooled: Vec<f64> = by_key.chain(by_label).collect();

        match pooled.iter().find(|value| **value != 0.0) {
            Some(value) => Ok(*value),
            None => pooled.last().copied().ok_or_else(|| LookupError::NoSuchField {
                candidates: candidates.iter().map(|c| c.as_ref().to_owned()).collect(),
            }),
        }
    }

    pub fn contains<S: AsRef<str>>(&self, candidates: &[S]) -> bool {
        if candidates
            .iter()
            .any(|candidate| self.index.contains_key(candidate.as_ref()))
        {
            return true;
        }

        let wanted = lowercase_set(candidates);
        self.lines.iter().any(|line| line.has_label_in(&wanted))
    }

    pub fn get_optional<S: AsRef<str>>(&self, candidates: &[S]) -> Option<f64> {
        self.get(candidates).ok()
    }

    /// Resolve each candidate on its own, skipping the ones that miss.
    pub fn get_all<S: AsRef<str>>(&self, candidates: &[S]) -> Vec<f64> {
        candidates
            .iter()
            .filter_map(|candidate| self.get(std::slice::from_ref(candidate)).ok())
            .collect()
    }

    /// Value of every line whose key or one of whose labels matches any of
    /// `patterns`, in statement order.
    ///
    /// Patterns are case-insensitive regular expressions anchored at the
    /// start of the label/key. A line contributes once however many of its
    /// names or patterns match, so summing the result never double counts.
    pub fn search<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<f64>, LookupError> {
        let regexes = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                RegexBuilder::new(&format!("^(?:{pattern})"))
                    .case_insensitive(true)
                    .build()
                    .map_err(|error| LookupError::InvalidPattern {
                        pattern: pattern.to_owned(),
                        message: error.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let matches = |line: &StatementLine| {
            regexes.iter().any(|regex| {
                regex.is_match(&line.key) || line.labels.iter().any(|label| regex.is_match(label))
            })
        };

        Ok(self
            .lines
            .iter()
            .filter(|line| matches(line))
            .map(|line| line.total() / self.factor)
            .collect())
    }
}

fn lowercase_set<S: AsRef<str>>(candidates: &[S]) -> HashSet<String> {
    candidates
        .iter()
        .map(|candidate| candidate.as_ref().to_lowercase())
        .collect()
}

/// Named statement of a [`Report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    BalanceSheet,
    CashFlow,
    IncomeStatements,
}

impl StatementKind {
    pub const ALL: [Self; 3] = [Self::BalanceSheet, Self::CashFlow, Self::IncomeStatements];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::IncomeStatements => "income_statements",
        }
    }
}

impl Display for StatementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "balance_sheet" => Ok(Self::BalanceSheet),
            "cash_flow" => Ok(Self::CashFlow),
            "income_statements" => Ok(Self::IncomeStatements),
            other => Err(RuleError::UnknownSource {
                value: other.to_owned(),
            }),
        }
    }
}

/// Raw statements of one filing, as many columns as the provider returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filing {
    #[serde(default)]
    pub balance_sheets: Vec<RawStatement>,
    #[serde(default)]
    pub cash_flows: Vec<RawStatement>,
    #[serde(default)]
    pub income_statements: Vec<RawStatement>,
}

/// The three statement views for one symbol at one date.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub balance_sheet: FinancialDataView,
    pub cash_flow: FinancialDataView,
    pub income_statements: FinancialDataView,
}

impl Report {
    pub fn new(
        balance_sheet: RawStatement,
        cash_flow: RawStatement,
        income_statements: RawStatement,
        period: PeriodKind,
    ) -> Self {
        Self {
            balance_sheet: FinancialDataView::new(balance_sheet, period),
            cash_flow: FinancialDataView::new(cash_flow, period),
            income_statements: FinancialDataView::new(income_statements, period),
        }
    }

    /// Build a report from the statements of a filing that best match `period`.
    pub fn from_filing(filing: &Filing, period: PeriodKind) -> Result<Self, SourceError> {
        let pick = |kind: StatementKind, statements: &[RawStatement]| {
            RawStatement::select_recent(statements, period)
                .cloned()
                .ok_or_else(|| {
                    SourceError::no_data(format!("no {period} {kind} statement in filing"))
                })
        };

        Ok(Self::new(
            pick(StatementKind::BalanceSheet, &filing.balance_sheets)?,
            pick(StatementKind::CashFlow, &filing.cash_flows)?,
            pick(StatementKind::IncomeStatements, &filing.income_statements)?,
            period,
        ))
    }

    pub fn view(&self, kind: StatementKind) -> &FinancialDataView {
        match kind {
            StatementKind::BalanceSheet => &self.balance_sheet,
            StatementKind::CashFlow => &self.cash_flow,
            StatementKind::IncomeStatements => &self.income_statements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(months: Option<u32>, period: PeriodKind, lines: Vec<StatementLine>) -> FinancialDataView {
        FinancialDataView::new(RawStatement::new("2020-09-30", months, lines), period)
    }

    #[test]
    fn nine_month_figures_are_rescaled_for_quarterly_runs() {
        let lines = vec![StatementLine::new("us-gaap_Revenues", ["Revenue"], vec![300.0])];

        let quarterly = view(Some(9), PeriodKind::Quarterly, lines.clone());
        assert_eq!(quarterly.factor(), 3.0);
        assert_eq!(quarterly.get(&["us-gaap_Revenues"]).expect("found"), 100.0);

        let annual = view(Some(9), PeriodKind::Annual, lines.clone());
        assert_eq!(annual.get(&["us-gaap_Revenues"]).expect("found"), 300.0);

        let unknown = view(None, PeriodKind::Quarterly, lines);
        assert_eq!(unknown.factor(), 1.0);
    }

    #[test]
    fn sums_multi_column_values() {
        let data = view(
            Some(3),
            PeriodKind::Quarterly,
            vec![StatementLine::new("us-gaap_Cash", ["Cash"], vec![10.0, 5.0])],
        );
        assert_eq!(data.get(&["us-gaap_Cash"]).expect("found"), 15.0);
    }

    #[test]
    fn resolves_labels_case_insensitively() {
        let data = view(
            None,
            PeriodKind::Annual,
            vec![StatementLine::new("us-gaap_Assets", ["Total Assets"], vec![1_000.0])],
        );
        assert_eq!(data.get(&["total assets"]).expect("found"), 1_000.0);
        assert!(data.contains(&["TOTAL ASSETS"]));
        assert!(!data.contains(&["total liabilities"]));
    }

    #[test]
    fn prefers_first_non_zero_and_falls_back_to_zero() {
        let data = view(
            None,
            PeriodKind::Annual,
            vec![
                StatementLine::new("us-gaap_InterestExpense", ["Interest Expense"], vec![0.0]),
                StatementLine::new("us-gaap_InterestExpenseDebt", ["Interest expense, net"], vec![42.0]),
                StatementLine::new("us-gaap_Goodwill", ["Goodwill"], vec![0.0]),
            ],
        );

        let value = data
            .get(&["us-gaap_InterestExpense", "Interest expense, net"])
            .expect("found");
        assert_eq!(value, 42.0);

        assert_eq!(data.get(&["us-gaap_Goodwill"]).expect("zero is found"), 0.0);
    }

    #[test]
    fn missing_field_is_an_error_but_get_all_skips_it() {
        let data = view(
            None,
            PeriodKind::Annual,
            vec![StatementLine::new("us-gaap_LiabilitiesNoncurrent", Vec::<String>::new(), vec![7.0])],
        );

        let err = data.get(&["us-gaap_Liabilities"]).expect_err("must fail");
        assert!(matches!(err, LookupError::NoSuchField { .. }));
        assert_eq!(data.get_optional(&["us-gaap_Liabilities"]), None);

        let values = data.get_all(&["us-gaap_Liabilities", "us-gaap_LiabilitiesNoncurrent"]);
        assert_eq!(values, vec![7.0]);
    }

    #[test]
    fn search_matches_keys_and_labels_from_the_start() {
        let data = view(
            None,
            PeriodKind::Annual,
            vec![
                StatementLine::new("us-gaap_LongTermDebtNoncurrent", ["Long-term debt"], vec![30.0]),
                StatementLine::new("us-gaap_OperatingLeaseLiabilityNoncurrent", ["Lease liabilities"], vec![12.0]),
                StatementLine::new("us-gaap_AccountsPayableCurrent", ["Accounts payable"], vec![5.0]),
            ],
        );

        let mut values = data.search(&[".*Noncurrent"]).expect("valid pattern");
        values.sort_by(f64::total_cmp);
        assert_eq!(values, vec![12.0, 30.0]);

        let values = data.search(&["lease"]).expect("valid pattern");
        assert_eq!(values, vec![12.0]);

        let err = data.search(&["("]).expect_err("must fail");
        assert!(matches!(err, LookupError::InvalidPattern { .. }));
    }

    #[test]
    fn selects_most_recent_statement_with_preferred_duration() {
        let statements = vec![
            RawStatement::new("2020-06-30", Some(6), Vec::new()),
            RawStatement::new("2020-09-30", Some(9), Vec::new()),
            RawStatement::new("2019-12-31", Some(12), Vec::new()),
            RawStatement::new("2020-03-31", Some(3), Vec::new()),
            RawStatement::new("2019-03-31", Some(3), Vec::new()),
        ];

        let quarterly = RawStatement::select_recent(&statements, PeriodKind::Quarterly)
            .expect("statement");
        assert_eq!(quarterly.date, "2020-03-31");

        let annual = RawStatement::select_recent(&statements, PeriodKind::Annual).expect("statement");
        assert_eq!(annual.date, "2019-12-31");

        let none = RawStatement::select_recent(&statements[..2], PeriodKind::Annual);
        assert!(none.is_none());
    }

    #[test]
    fn report_from_filing_requires_every_statement() {
        let statement = RawStatement::new("2020-12-31", Some(12), Vec::new());
        let filing = Filing {
            balance_sheets: vec![statement.clone()],
            cash_flows: vec![statement],
            income_statements: Vec::new(),
        };

        let err = Report::from_filing(&filing, PeriodKind::Annual).expect_err("must fail");
        assert!(err.message().contains("income_statements"));
    }

    #[test]
    fn parses_statement_kind() {
        assert_eq!(
            "cash_flow".parse::<StatementKind>().expect("kind"),
            StatementKind::CashFlow
        );
        assert!(matches!(
            "notes".parse::<StatementKind>(),
            Err(RuleError::UnknownSource { .. })
        ));
    }
}
