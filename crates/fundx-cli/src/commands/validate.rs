use serde::Serialize;

use fundx_core::RuleDocument;

use crate::cli::ValidateArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ValidateResponseData {
    fact_groups: Vec<String>,
    ratio_groups: Vec<String>,
    facts: usize,
    ratios: usize,
    formula_facts: usize,
}

pub fn run(args: &ValidateArgs) -> Result<CommandResult, CliError> {
    let document = RuleDocument::from_file(&args.rules)?;

    let ungrouped = document
        .facts
        .facts
        .iter()
        .filter(|fact| fact.group.is_none())
        .count();

    let data = serde_json::to_value(ValidateResponseData {
        fact_groups: document.facts.groups.iter().map(|g| g.id.clone()).collect(),
        ratio_groups: document.ratios.groups.iter().map(|g| g.id.clone()).collect(),
        facts: document.facts.facts.len(),
        ratios: document.ratios.ratios.len(),
        formula_facts: document
            .facts
            .facts
            .iter()
            .filter(|fact| fact.eval.is_some())
            .count(),
    })?;

    let mut result = CommandResult::ok(data);
    if ungrouped > 0 {
        result = result.with_warning(format!(
            "{ungrouped} fact(s) belong to no group and will not appear in grouped reports"
        ));
    }
    Ok(result)
}
