mod lookup;
mod run;
mod validate;

use fundx_core::{
    Envelope, EnvelopeError, EnvelopeMeta, PeriodKind, ProviderId, Symbol, SCHEMA_VERSION,
};
use serde_json::Value;
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub source_chain: Vec<ProviderId>,
    pub run: Option<(PeriodKind, Vec<Symbol>)>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            source_chain: Vec::new(),
            run: None,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_errors(mut self, errors: Vec<EnvelopeError>) -> Self {
        self.errors.extend(errors);
        self
    }

    pub fn with_source_chain(mut self, source_chain: Vec<ProviderId>) -> Self {
        self.source_chain = source_chain;
        self
    }

    pub fn with_run(mut self, period: PeriodKind, symbols: Vec<Symbol>) -> Self {
        self.run = Some((period, symbols));
        self
    }
}

pub fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let command_result = match &cli.command {
        Command::Run(args) => run::run(args)?,
        Command::Validate(args) => validate::run(args)?,
        Command::Lookup(args) => lookup::run(args)?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        source_chain,
        run,
    } = command_result;

    let mut meta = EnvelopeMeta::new(Uuid::new_v4().to_string(), SCHEMA_VERSION)?
        .with_source_chain(source_chain);
    if let Some((period, symbols)) = run {
        meta = meta.with_run(period, symbols);
    }
    for warning in warnings {
        meta.push_warning(warning);
    }

    Envelope::with_errors(meta, data, errors).map_err(CliError::from)
}
