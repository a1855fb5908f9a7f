//! Core contracts for fundx.
//!
//! This crate contains:
//! - Canonical domain models and validation
//! - Formula parsing and evaluation
//! - Alias-tolerant financial statement views
//! - The typed rule document and its fact/ratio handlers
//! - The staged evaluation engine and its state
//! - The statement-source contract, export model and envelope

pub mod config;
pub mod domain;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod export;
pub mod expression;
pub mod handlers;
pub mod rules;
pub mod source;
pub mod state;
pub mod statement;

pub use config::{ReportConfig, STATEMENTS_DIR_ENV};
pub use domain::{Date, Listing, PeriodKind, Symbol};
pub use engine::{Engine, Stage};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta, SCHEMA_VERSION};
pub use error::{
    CoreError, EngineError, FailureContext, LookupError, QueryError, RatioError, RuleError,
    ValidationError,
};
pub use export::{ExportMetadata, MetricInfo, ReportExport, ResultEntry};
pub use expression::{Expr, ExpressionError, ExpressionEvaluator, Variables};
pub use handlers::{Fact, Ratio, RatioMetric};
pub use rules::{
    ComputeSpec, FactSpec, Group, PostAggregation, QueryMode, QuerySpec, RatioSpec, RuleDocument,
    ZeroDivisionPolicy,
};
pub use source::{FilingStore, ProviderId, SourceError, SourceErrorKind, StatementSource, SymbolRouter};
pub use state::{DeferredEval, EvaluationState, Metadata, ResultKey, ResultValue};
pub use statement::{FinancialDataView, Filing, RawStatement, Report, StatementKind, StatementLine};
