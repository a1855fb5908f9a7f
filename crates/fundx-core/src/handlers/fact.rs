use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::QueryError;
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::rules::{FactSpec, PostAggregation, QueryMode, QuerySpec};
use crate::statement::Report;

use super::default_label;

/// One fact of the rule document, resolved per symbol and date.
#[derive(Debug, Clone)]
pub struct Fact {
    spec: FactSpec,
    label: String,
    evaluator: Arc<ExpressionEvaluator>,
}

impl Fact {
    pub fn new(spec: FactSpec, evaluator: Arc<ExpressionEvaluator>) -> Self {
        let label = spec
            .label
            .clone()
            .unwrap_or_else(|| default_label(&spec.id));
        Self {
            spec,
            label,
            evaluator,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn group(&self) -> Option<&str> {
        self.spec.group.as_deref()
    }

    pub fn eval(&self) -> Option<&str> {
        self.spec.eval.as_deref()
    }

    pub fn queries(&self) -> &[QuerySpec] {
        &self.spec.queries
    }

    pub fn spec(&self) -> &FactSpec {
        &self.spec
    }

    /// Run one query against `report`.
    ///
    /// Lines that resolve to nothing are not an error: the query yields
    /// `None` and the fact may still be resolved by another query or left
    /// for a formula.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when a regexp query carries an invalid pattern.
    pub fn execute_query(
        &self,
        query: &QuerySpec,
        report: &Report,
    ) -> Result<Option<f64>, QueryError> {
        let view = report.view(query.source);
        let values = match query.mode {
            QueryMode::Select => view.get_all(query.lines.as_slice()),
            QueryMode::Regexp => view.search(query.lines.as_slice())?,
        };

        let Some(first) = values.first().copied() else {
            return Ok(None);
        };

        Ok(Some(match query.post {
            PostAggregation::First => first,
            PostAggregation::Sum => values.iter().sum(),
            PostAggregation::Static(value) => value,
        }))
    }

    /// Whether every variable of `formula` already has a value in `facts`.
    pub fn eval_has_prerequisites(
        &self,
        formula: &str,
        facts: &BTreeMap<String, f64>,
    ) -> Result<bool, ExpressionError> {
        Ok(self
            .evaluator
            .variables(formula)?
            .iter()
            .all(|name| facts.contains_key(name)))
    }

    pub fn execute_eval(
        &self,
        formula: &str,
        facts: &BTreeMap<String, f64>,
    ) -> Result<f64, ExpressionError> {
        self.evaluator.evaluate(formula, facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::statement::{RawStatement, StatementKind, StatementLine};
    use crate::PeriodKind;

    fn report() -> Report {
        let balance_sheet = RawStatement::new(
            "2020-12-31",
            Some(12),
            vec![
                StatementLine::new("us-gaap_AssetsCurrent", ["Total Current Assets"], vec![500.0]),
                StatementLine::new("us-gaap_LongTermDebtNoncurrent", ["Long-term debt"], vec![120.0]),
                StatementLine::new("us-gaap_OperatingLeaseLiabilityNoncurrent", ["Lease liabilities"], vec![30.0]),
            ],
        );
        let empty = |date: &str| RawStatement::new(date, Some(12), Vec::new());
        Report::new(
            balance_sheet,
            empty("2020-12-31"),
            empty("2020-12-31"),
            PeriodKind::Annual,
        )
    }

    fn fact(spec: FactSpec) -> Fact {
        Fact::new(spec, Arc::new(ExpressionEvaluator::new()))
    }

    #[test]
    fn select_query_takes_first_resolved_line() {
        let query = QuerySpec::select(
            StatementKind::BalanceSheet,
            ["us-gaap_Missing", "total current assets"],
        );
        let fact = fact(FactSpec::new("current_assets").with_query(query.clone()));

        assert_eq!(fact.execute_query(&query, &report()), Ok(Some(500.0)));
        assert_eq!(fact.label(), "Current Assets");
    }

    #[test]
    fn regexp_query_sums_every_match() {
        let query = QuerySpec::regexp(StatementKind::BalanceSheet, [".*noncurrent"])
            .with_post(PostAggregation::Sum);
        let fact = fact(FactSpec::new("noncurrent_liabilities").with_query(query.clone()));

        assert_eq!(fact.execute_query(&query, &report()), Ok(Some(150.0)));

        let overlapping = QuerySpec::regexp(StatementKind::BalanceSheet, [".*noncurrent", "lease"])
            .with_post(PostAggregation::Sum);
        assert_eq!(fact.execute_query(&overlapping, &report()), Ok(Some(150.0)));
    }

    #[test]
    fn static_post_applies_only_when_something_matched() {
        let hit = QuerySpec::select(StatementKind::BalanceSheet, ["us-gaap_AssetsCurrent"])
            .with_post(PostAggregation::Static(0.0));
        let miss = QuerySpec::select(StatementKind::CashFlow, ["us-gaap_AssetsCurrent"])
            .with_post(PostAggregation::Static(0.0));
        let fact = fact(FactSpec::new("flag").with_query(hit.clone()));

        assert_eq!(fact.execute_query(&hit, &report()), Ok(Some(0.0)));
        assert_eq!(fact.execute_query(&miss, &report()), Ok(None));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let query = QuerySpec::regexp(StatementKind::BalanceSheet, ["(unclosed"]);
        let fact = fact(FactSpec::new("broken").with_query(query.clone()));

        assert!(matches!(
            fact.execute_query(&query, &report()),
            Err(QueryError::Lookup(LookupError::InvalidPattern { .. }))
        ));
    }

    #[test]
    fn formula_prerequisites_follow_known_facts() {
        let fact = fact(FactSpec::new("working_capital").with_eval("current_assets - current_liabilities"));
        let formula = "current_assets - current_liabilities";
        let mut facts = BTreeMap::from([("current_assets".to_owned(), 500.0)]);

        assert_eq!(fact.eval_has_prerequisites(formula, &facts), Ok(false));

        facts.insert("current_liabilities".to_owned(), 200.0);
        assert_eq!(fact.eval_has_prerequisites(formula, &facts), Ok(true));
        assert_eq!(fact.execute_eval(formula, &facts), Ok(300.0));
    }
}
