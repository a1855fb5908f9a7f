use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use thiserror::Error;

use crate::engine::Stage;
use crate::expression::ExpressionError;
use crate::source::SourceError;
use crate::{Date, PeriodKind, Symbol};

/// Validation and contract errors exposed by `fundx-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("quarter must be between 0 (annual) and 4: {value}")]
    InvalidQuarter { value: u8 },
    #[error("invalid date '{value}', expected YYYY or YYYYQn")]
    InvalidDate { value: String },
    #[error("invalid period '{value}', expected one of annual, quarterly")]
    InvalidPeriod { value: String },
    #[error("invalid provider '{value}', expected one of edgar, market_watch, fixture")]
    InvalidProvider { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,

    #[error("at least one symbol is required")]
    NoSymbols,
    #[error("at least one date is required")]
    NoDates,
}

/// Failures of a single alias lookup against a financial data view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("no such field: {candidates:?}")]
    NoSuchField { candidates: Vec<String> },
    #[error("invalid search pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Failures while running one fact query against a report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Failures while computing one ratio.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RatioError {
    #[error("cannot resolve ratio source '{expression}': {source}")]
    Evaluation {
        expression: String,
        source: ExpressionError,
    },
    #[error("ratio denominator is zero (numerator {numerator})")]
    DivisionByZero { numerator: f64 },
}

/// Rule document parsing and validation errors.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("unknown statement source '{value}', expected one of balance_sheet, cash_flow, income_statements")]
    UnknownSource { value: String },
    #[error("unsupported query mode '{value}', expected one of select, regexp")]
    UnsupportedMode { value: String },
    #[error("unsupported query post-aggregation '{value}', expected one of sum, static")]
    UnsupportedPost { value: String },
    #[error("query post 'static' requires a numeric 'value'")]
    MissingStaticValue,
    #[error("query must list at least one candidate line")]
    EmptyLines,

    #[error("duplicate fact id '{id}'")]
    DuplicateFact { id: String },
    #[error("duplicate ratio id '{id}'")]
    DuplicateRatio { id: String },
    #[error("fact '{id}' declares neither an eval nor a query")]
    EmptyFact { id: String },
    #[error("'{id}' references undeclared group '{group}'")]
    UndeclaredGroup { id: String, group: String },

    #[error("rule document yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("rule document json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Where the engine was when a fatal condition was raised.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureContext {
    pub period: PeriodKind,
    pub symbol: Option<Symbol>,
    pub date: Option<Date>,
    pub facts: BTreeMap<String, f64>,
}

impl Display for FailureContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{symbol} ")?,
            None => f.write_str("<no symbol> ")?,
        }
        write!(f, "{} ", self.period)?;
        match self.date {
            Some(date) => write!(f, "{date}")?,
            None => f.write_str("<no date>")?,
        }
        write!(f, " (facts so far: {:?})", self.facts)
    }
}

/// Fatal conditions that abort an engine run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no report for {symbol} {period} {date}: {source}")]
    Source {
        symbol: Symbol,
        period: PeriodKind,
        date: Date,
        source: SourceError,
    },

    #[error("fact '{fact}' failed to evaluate '{expression}' at {context}: {source}")]
    Evaluation {
        fact: String,
        expression: String,
        context: Box<FailureContext>,
        source: ExpressionError,
    },

    #[error("fact '{fact}' query failed at {context}: {source}")]
    Query {
        fact: String,
        context: Box<FailureContext>,
        source: QueryError,
    },

    #[error("ratio '{ratio}' failed at {context}: {source}")]
    Ratio {
        ratio: String,
        context: Box<FailureContext>,
        source: RatioError,
    },

    #[error("unresolved deferred evals {pending:?} at {context}")]
    UnresolvedDependency {
        pending: Vec<String>,
        context: Box<FailureContext>,
    },

    #[error("incomplete results at {context}: missing facts {missing_facts:?}, missing ratios {missing_ratios:?}")]
    IncompleteResult {
        missing_facts: Vec<String>,
        missing_ratios: Vec<String>,
        context: Box<FailureContext>,
    },

    #[error("illegal stage transition {from:?} -> {to:?}")]
    IllegalTransition { from: Stage, to: Stage },

    #[error("engine state is missing {what}")]
    InvalidState { what: &'static str },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl EngineError {
    /// Stable machine-readable code for envelopes.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Source { source, .. } => source.code(),
            Self::Evaluation { .. } => "engine.evaluation",
            Self::Query { .. } => "engine.query",
            Self::Ratio { .. } => "engine.ratio",
            Self::UnresolvedDependency { .. } => "engine.unresolved_dependency",
            Self::IncompleteResult { .. } => "engine.incomplete_result",
            Self::IllegalTransition { .. } | Self::InvalidState { .. } => "engine.internal",
            Self::Validation(_) => "engine.validation",
        }
    }

    pub const fn retryable(&self) -> bool {
        match self {
            Self::Source { source, .. } => source.retryable(),
            _ => false,
        }
    }
}

/// Top-level error type for core operations outside the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
