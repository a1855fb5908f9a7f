use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use fundx_core::{
    Date, Engine, EngineError, EnvelopeError, FilingStore, PeriodKind, ProviderId, ReportConfig,
    RuleDocument, StatementSource, Symbol,
};
use serde_json::Value;

use crate::cli::RunArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &RunArgs) -> Result<CommandResult, CliError> {
    let config = match &args.config {
        Some(path) => ReportConfig::from_file(path)?,
        None => ReportConfig::default(),
    };

    let rules_path = args
        .rules
        .clone()
        .or_else(|| config.rules.clone())
        .ok_or_else(|| CliError::Usage("missing --rules (or `rules` in --config)".to_owned()))?;
    let statements_dir: PathBuf = args
        .statements
        .clone()
        .or_else(|| config.statements_dir())
        .ok_or_else(|| {
            CliError::Usage(
                "missing --statements (or `statements` in --config, or FUNDX_STATEMENTS_DIR)"
                    .to_owned(),
            )
        })?;

    let symbols = if args.symbols.is_empty() {
        config.symbols.clone()
    } else {
        args.symbols
            .iter()
            .map(|raw| Symbol::parse(raw))
            .collect::<Result<Vec<_>, _>>()?
    };
    let dates = if args.dates.is_empty() {
        config.dates.clone()
    } else {
        args.dates
            .iter()
            .map(|raw| raw.parse::<Date>())
            .collect::<Result<Vec<_>, _>>()?
    };
    let period = args.period.map(PeriodKind::from).unwrap_or(config.period);

    let rules = RuleDocument::from_file(&rules_path)?;
    let store = FilingStore::load_dir(ProviderId::Fixture, &statements_dir)?;
    info!(
        rules = %rules_path.display(),
        statements = %statements_dir.display(),
        filings = store.len(),
        "inputs loaded"
    );

    let mut source_chain: Vec<ProviderId> = Vec::new();
    for symbol in &symbols {
        let provider = store.provider_for(symbol);
        if !source_chain.contains(&provider) {
            source_chain.push(provider);
        }
    }

    let mut engine = Engine::new(rules, Arc::new(store), symbols.clone());
    let outcome = engine.execute(&dates, period).map(|_| ());
    let result = match outcome {
        Ok(_) => CommandResult::ok(serde_json::to_value(engine.export())?),
        Err(EngineError::Validation(error)) => return Err(error.into()),
        Err(error) => {
            let envelope_error =
                EnvelopeError::new(error.code(), error.to_string())?.with_retryable(error.retryable());
            CommandResult::ok(Value::Null).with_errors(vec![envelope_error])
        }
    };

    Ok(result
        .with_run(period, symbols)
        .with_source_chain(source_chain))
}
