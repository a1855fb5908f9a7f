use serde::Serialize;

use fundx_core::{FinancialDataView, PeriodKind, RawStatement};

use crate::cli::LookupArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct LookupResponseData {
    candidates: Vec<String>,
    period: PeriodKind,
    factor: f64,
    /// Resolved field value (`get` semantics).
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
    /// Every matching value (`search` semantics).
    #[serde(skip_serializing_if = "Option::is_none")]
    matches: Option<Vec<f64>>,
}

pub fn run(args: &LookupArgs) -> Result<CommandResult, CliError> {
    let content = std::fs::read_to_string(&args.statement)?;
    let statement: RawStatement = serde_json::from_str(&content)?;
    let period = PeriodKind::from(args.period);
    let view = FinancialDataView::new(statement, period);
    let candidates = args.candidates.as_slice();

    let (value, matches) = if args.search {
        (None, Some(view.search(candidates)?))
    } else {
        (Some(view.get(candidates)?), None)
    };

    let data = serde_json::to_value(LookupResponseData {
        candidates: args.candidates.clone(),
        period,
        factor: view.factor(),
        value,
        matches,
    })?;

    Ok(CommandResult::ok(data))
}
