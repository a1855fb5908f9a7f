//! Behavior-driven tests for alias-tolerant statement lookups.

use fundx_core::{
    FinancialDataView, LookupError, PeriodKind, RawStatement, StatementLine,
};

fn view(months: Option<u32>, period: PeriodKind, lines: Vec<StatementLine>) -> FinancialDataView {
    FinancialDataView::new(RawStatement::new("2020-09-30", months, lines), period)
}

// =============================================================================
// Period Normalization
// =============================================================================

#[test]
fn nine_month_figures_become_a_quarterly_run_rate() {
    // Given: A nine-month statement reporting 300
    let view = view(
        Some(9),
        PeriodKind::Quarterly,
        vec![StatementLine::new("us-gaap_Revenues", ["Revenue"], vec![300.0])],
    );

    // When: The line is read in a quarterly run
    let value = view.get(&["us-gaap_Revenues"]).expect("line exists");

    // Then: The value is divided by three
    assert_eq!(view.factor(), 3.0);
    assert_eq!(value, 100.0);
}

#[test]
fn annual_runs_and_unknown_durations_are_not_rescaled() {
    let lines = || vec![StatementLine::new("us-gaap_Revenues", ["Revenue"], vec![300.0])];

    let annual = view(Some(9), PeriodKind::Annual, lines());
    let unknown = view(None, PeriodKind::Quarterly, lines());

    assert_eq!(annual.get(&["us-gaap_Revenues"]), Ok(300.0));
    assert_eq!(unknown.get(&["us-gaap_Revenues"]), Ok(300.0));
}

#[test]
fn multi_column_lines_are_summed_before_rescaling() {
    let view = view(
        Some(6),
        PeriodKind::Quarterly,
        vec![StatementLine::new("us-gaap_Revenues", ["Revenue"], vec![100.0, 60.0])],
    );

    assert_eq!(view.get(&["Revenue"]), Ok(80.0));
}

// =============================================================================
// Alias Resolution
// =============================================================================

#[test]
fn labels_match_case_insensitively_without_a_key_match() {
    // Given: A line keyed by its taxonomy name and labelled for humans
    let view = view(
        Some(12),
        PeriodKind::Annual,
        vec![StatementLine::new("us-gaap_Assets", ["Total Assets"], vec![1_000.0])],
    );

    // When: It is looked up by a lowercase label
    let value = view.get(&["total assets"]);

    // Then: The label match resolves it
    assert_eq!(value, Ok(1_000.0));
}

#[test]
fn all_zero_matches_resolve_to_zero() {
    // Given: Two aliases of a field, both reporting zero
    let view = view(
        Some(12),
        PeriodKind::Annual,
        vec![
            StatementLine::new("us-gaap_Goodwill", ["Goodwill"], vec![0.0]),
            StatementLine::new("ifrs_Goodwill", ["Goodwill, net"], vec![0.0]),
        ],
    );

    // When: The field is resolved through both aliases
    let value = view.get(&["us-gaap_Goodwill", "Goodwill, net"]);

    // Then: Zero is a found value, not a miss
    assert_eq!(value, Ok(0.0));
}

#[test]
fn first_non_zero_pooled_value_wins() {
    let view = view(
        Some(12),
        PeriodKind::Annual,
        vec![
            StatementLine::new("us-gaap_Cash", ["Cash"], vec![0.0]),
            StatementLine::new("us-gaap_CashAndEquivalents", ["Cash and equivalents"], vec![42.0]),
        ],
    );

    assert_eq!(view.get(&["us-gaap_Cash", "cash and equivalents"]), Ok(42.0));
}

#[test]
fn unknown_field_is_a_lookup_error() {
    let view = view(Some(12), PeriodKind::Annual, Vec::new());

    let err = view.get(&["us-gaap_Missing"]).expect_err("must fail");

    assert_eq!(
        err,
        LookupError::NoSuchField {
            candidates: vec!["us-gaap_Missing".to_owned()]
        }
    );
    assert!(!view.contains(&["us-gaap_Missing"]));
    assert_eq!(view.get_optional(&["us-gaap_Missing"]), None);
}

// =============================================================================
// Aggregating Lookups
// =============================================================================

#[test]
fn get_all_skips_unresolved_components() {
    // Given: Some but not all noncurrent liability components
    let view = view(
        Some(12),
        PeriodKind::Annual,
        vec![
            StatementLine::new("us-gaap_LongTermDebtNoncurrent", ["Long-term debt"], vec![120.0]),
            StatementLine::new("us-gaap_DeferredTaxLiabilities", ["Deferred taxes"], vec![15.0]),
        ],
    );

    // When: Every component is requested
    let values = view.get_all(&[
        "us-gaap_LongTermDebtNoncurrent",
        "us-gaap_OperatingLeaseLiabilityNoncurrent",
        "deferred taxes",
    ]);

    // Then: Only the resolved components are returned, in candidate order
    assert_eq!(values, vec![120.0, 15.0]);
}

#[test]
fn search_matches_labels_and_keys_by_pattern() {
    let view = view(
        Some(12),
        PeriodKind::Annual,
        vec![
            StatementLine::new("us-gaap_OtherLiabilitiesNoncurrent", ["Other liabilities"], vec![7.0]),
            StatementLine::new("us-gaap_LiabilitiesCurrent", ["Total current liabilities"], vec![50.0]),
        ],
    );

    let by_label = view.search(&["other liab"]).expect("valid pattern");
    assert_eq!(by_label, vec![7.0]);

    let by_key = view.search(&[".*Noncurrent"]).expect("valid pattern");
    assert_eq!(by_key, vec![7.0]);

    let err = view.search(&["[unclosed"]).expect_err("invalid pattern");
    assert!(matches!(err, LookupError::InvalidPattern { .. }));
}

#[test]
fn search_counts_each_line_once() {
    // Given: A line whose key and label both start with "deferred"
    let view = view(
        Some(12),
        PeriodKind::Annual,
        vec![
            StatementLine::new("DeferredTaxLiabilities", ["Deferred taxes"], vec![15.0]),
            StatementLine::new("us-gaap_DeferredRevenue", ["Deferred revenue"], vec![4.0]),
        ],
    );

    // When: Overlapping patterns are searched
    let values = view
        .search(&["deferred", "deferred tax", ".*revenue"])
        .expect("valid patterns");

    // Then: Every matching line appears exactly once, in statement order
    assert_eq!(values, vec![15.0, 4.0]);
    assert_eq!(values.iter().sum::<f64>(), 19.0);
}
