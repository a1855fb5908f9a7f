//! Evaluation state owned by one engine run.
//!
//! The state is reset at the start of every run, filled with metadata
//! (symbols, sorted dates, grouped handlers), mutated while symbols, dates
//! and facts are visited, and finally read in full to build the export.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, FailureContext};
use crate::handlers::{Fact, Ratio, RatioMetric};
use crate::statement::Report;
use crate::{Date, PeriodKind, Symbol};

/// Identity of one computed result set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResultKey {
    pub period: PeriodKind,
    pub symbol: Symbol,
    pub year: i32,
    pub quarter: u8,
}

impl ResultKey {
    pub fn new(period: PeriodKind, symbol: Symbol, date: Date) -> Self {
        Self {
            period,
            symbol,
            year: date.year,
            quarter: date.quarter,
        }
    }

    pub fn date(&self) -> Date {
        Date {
            year: self.year,
            quarter: self.quarter,
        }
    }
}

/// Fact and ratio values of one symbol at one date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultValue {
    pub facts: BTreeMap<String, f64>,
    pub ratios: BTreeMap<String, RatioMetric>,
}

/// A formula postponed until the facts it reads are available.
#[derive(Debug, Clone)]
pub struct DeferredEval {
    pub fact: Arc<Fact>,
    pub eval: String,
}

/// Run-wide bookkeeping used to build reports by category.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Fact handlers by group id.
    pub facts: BTreeMap<String, Vec<Arc<Fact>>>,
    /// Ratio handlers by group id.
    pub ratios: BTreeMap<String, Vec<Arc<Ratio>>>,
    pub symbols: Vec<Symbol>,
    /// Ascending.
    pub dates: Vec<Date>,
}

#[derive(Debug, Clone)]
pub struct EvaluationState {
    period: PeriodKind,
    symbol: Option<Symbol>,
    date: Option<Date>,
    report: Option<Report>,
    fact: Option<Arc<Fact>>,
    deferred: Vec<DeferredEval>,
    results: BTreeMap<ResultKey, ResultValue>,
    metadata: Metadata,
}

impl EvaluationState {
    pub fn new(period: PeriodKind) -> Self {
        Self {
            period,
            symbol: None,
            date: None,
            report: None,
            fact: None,
            deferred: Vec::new(),
            results: BTreeMap::new(),
            metadata: Metadata::default(),
        }
    }

    pub const fn period(&self) -> PeriodKind {
        self.period
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    pub const fn date(&self) -> Option<Date> {
        self.date
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn fact(&self) -> Option<&Arc<Fact>> {
        self.fact.as_ref()
    }

    pub fn deferred(&self) -> &[DeferredEval] {
        &self.deferred
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn results(&self) -> &BTreeMap<ResultKey, ResultValue> {
        &self.results
    }

    pub fn result(&self, key: &ResultKey) -> Option<&ResultValue> {
        self.results.get(key)
    }

    /// Key of the symbol and date being processed.
    pub fn key(&self) -> Result<ResultKey, EngineError> {
        let symbol = self
            .symbol
            .clone()
            .ok_or(EngineError::InvalidState { what: "symbol" })?;
        let date = self.date.ok_or(EngineError::InvalidState { what: "date" })?;
        Ok(ResultKey::new(self.period, symbol, date))
    }

    /// Facts recorded so far for the current symbol and date.
    pub fn current_facts(&self) -> BTreeMap<String, f64> {
        self.key()
            .ok()
            .and_then(|key| self.results.get(&key))
            .map(|value| value.facts.clone())
            .unwrap_or_default()
    }

    pub fn current_result(&self) -> Result<&ResultValue, EngineError> {
        let key = self.key()?;
        self.results
            .get(&key)
            .ok_or(EngineError::InvalidState { what: "current result" })
    }

    pub(crate) fn current_result_mut(&mut self) -> Result<&mut ResultValue, EngineError> {
        let key = self.key()?;
        Ok(self.results.entry(key).or_default())
    }

    pub(crate) fn failure_context(&self) -> Box<FailureContext> {
        Box::new(FailureContext {
            period: self.period,
            symbol: self.symbol.clone(),
            date: self.date,
            facts: self.current_facts(),
        })
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub(crate) fn set_symbol(&mut self, symbol: Symbol) {
        self.symbol = Some(symbol);
    }

    pub(crate) fn set_date(&mut self, date: Date) {
        self.date = Some(date);
    }

    pub(crate) fn set_report(&mut self, report: Report) {
        self.report = Some(report);
    }

    pub(crate) fn clear_report(&mut self) {
        self.report = None;
    }

    pub(crate) fn set_fact(&mut self, fact: Arc<Fact>) {
        self.fact = Some(fact);
    }

    pub(crate) fn defer(&mut self, deferred: DeferredEval) {
        self.deferred.push(deferred);
    }

    /// Empty the deferred queue, handing back its entries.
    pub(crate) fn take_deferred(&mut self) -> Vec<DeferredEval> {
        std::mem::take(&mut self.deferred)
    }
}
