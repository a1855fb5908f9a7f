//! Staged rule-evaluation engine.
//!
//! One [`Engine::execute`] call walks the rule document through a fixed set
//! of [`Stage`]s:
//!
//! ```text
//! Starting -> FactGroupPrep* -> RatioGroupPrep* -> ProcessingSymbol
//!   -> Date -> (Fact -> Eval | DeferredEval | Query)* -> Ratio* -> ...
//!   -> Ending
//! ```
//!
//! Formulas whose inputs are not yet known are deferred and the whole
//! deferred queue is replayed every time a fact completes. A cycle leaves
//! the queue non-empty when the date is exited and aborts the run.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::export::ReportExport;
use crate::expression::{ExpressionError, ExpressionEvaluator};
use crate::handlers::{Fact, Ratio};
use crate::rules::{QuerySpec, RuleDocument};
use crate::source::StatementSource;
use crate::state::{DeferredEval, EvaluationState};
use crate::{Date, PeriodKind, Symbol, ValidationError};

/// Named engine stages, in nesting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Starting,
    FactGroupPrep,
    RatioGroupPrep,
    ProcessingSymbol,
    Date,
    Fact,
    Eval,
    DeferredEval,
    Query,
    Ratio,
    Ending,
}

impl Stage {
    /// Stages that may be entered directly from `self`.
    pub const fn successors(self) -> &'static [Stage] {
        match self {
            Self::Starting => &[
                Self::FactGroupPrep,
                Self::RatioGroupPrep,
                Self::ProcessingSymbol,
                Self::Ending,
            ],
            Self::FactGroupPrep => &[
                Self::FactGroupPrep,
                Self::RatioGroupPrep,
                Self::ProcessingSymbol,
                Self::Ending,
            ],
            Self::RatioGroupPrep => &[Self::RatioGroupPrep, Self::ProcessingSymbol, Self::Ending],
            Self::ProcessingSymbol => &[Self::Date, Self::ProcessingSymbol, Self::Ending],
            Self::Date => &[
                Self::Fact,
                Self::Ratio,
                Self::Date,
                Self::ProcessingSymbol,
                Self::Ending,
            ],
            Self::Fact | Self::Eval | Self::DeferredEval | Self::Query => &[
                Self::Fact,
                Self::Eval,
                Self::DeferredEval,
                Self::Query,
                Self::Ratio,
                Self::Date,
                Self::ProcessingSymbol,
                Self::Ending,
            ],
            Self::Ratio => &[Self::Ratio, Self::Date, Self::ProcessingSymbol, Self::Ending],
            Self::Ending => &[],
        }
    }

    pub fn can_follow(self, previous: Stage) -> bool {
        previous.successors().contains(&self)
    }
}

/// Evaluates a rule document for a set of symbols.
pub struct Engine {
    symbols: Vec<Symbol>,
    source: Arc<dyn StatementSource>,
    evaluator: Arc<ExpressionEvaluator>,
    rules: RuleDocument,
    facts: Vec<Arc<Fact>>,
    ratios: Vec<Arc<Ratio>>,
    stage: Stage,
    state: EvaluationState,
}

impl Engine {
    pub fn new(rules: RuleDocument, source: Arc<dyn StatementSource>, symbols: Vec<Symbol>) -> Self {
        Self::with_evaluator(rules, source, symbols, Arc::new(ExpressionEvaluator::new()))
    }

    /// Build an engine sharing an existing parse memo.
    pub fn with_evaluator(
        rules: RuleDocument,
        source: Arc<dyn StatementSource>,
        symbols: Vec<Symbol>,
        evaluator: Arc<ExpressionEvaluator>,
    ) -> Self {
        let facts = rules
            .facts
            .facts
            .iter()
            .map(|spec| Arc::new(Fact::new(spec.clone(), Arc::clone(&evaluator))))
            .collect();
        let ratios = rules
            .ratios
            .ratios
            .iter()
            .map(|spec| Arc::new(Ratio::new(spec.clone(), Arc::clone(&evaluator))))
            .collect();

        Self {
            symbols,
            source,
            evaluator,
            rules,
            facts,
            ratios,
            stage: Stage::Starting,
            state: EvaluationState::new(PeriodKind::Annual),
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn rules(&self) -> &RuleDocument {
        &self.rules
    }

    pub const fn stage(&self) -> Stage {
        self.stage
    }

    pub fn state(&self) -> &EvaluationState {
        &self.state
    }

    pub fn evaluator(&self) -> &Arc<ExpressionEvaluator> {
        &self.evaluator
    }

    pub fn source(&self) -> &dyn StatementSource {
        self.source.as_ref()
    }

    /// Serializable snapshot of the last run.
    pub fn export(&self) -> ReportExport {
        ReportExport::from_state(&self.state)
    }

    /// Evaluate every fact and ratio for every symbol at every date.
    ///
    /// Dates are processed in ascending order whatever order they are given
    /// in, and repeated dates or symbols are evaluated once. The state of any
    /// earlier run is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on the first fatal condition: a report that
    /// cannot be fetched, a failing formula, query or ratio, a dependency
    /// cycle, or a fact or ratio left without a value.
    pub fn execute(&mut self, dates: &[Date], period: PeriodKind) -> Result<&EvaluationState, EngineError> {
        if self.symbols.is_empty() {
            return Err(ValidationError::NoSymbols.into());
        }
        if dates.is_empty() {
            return Err(ValidationError::NoDates.into());
        }

        let mut dates = dates.to_vec();
        dates.sort();
        dates.dedup();

        // Each (symbol, date) key is evaluated once; later repeats are dropped.
        let mut symbols: Vec<Symbol> = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            if !symbols.contains(symbol) {
                symbols.push(symbol.clone());
            }
        }

        self.start(period, &symbols, &dates);

        let fact_groups = self.rules.facts.groups.clone();
        let ratio_groups = self.rules.ratios.groups.clone();

        for group in &fact_groups {
            self.transition(Stage::FactGroupPrep)?;
            let members = self
                .facts
                .iter()
                .filter(|fact| fact.group() == Some(group.id.as_str()))
                .cloned()
                .collect();
            self.state.metadata_mut().facts.insert(group.id.clone(), members);
        }
        for group in &ratio_groups {
            self.transition(Stage::RatioGroupPrep)?;
            let members = self
                .ratios
                .iter()
                .filter(|ratio| ratio.group() == Some(group.id.as_str()))
                .cloned()
                .collect();
            self.state.metadata_mut().ratios.insert(group.id.clone(), members);
        }

        let facts = self.facts.clone();
        let ratios = self.ratios.clone();

        for symbol in symbols {
            self.transition(Stage::ProcessingSymbol)?;
            debug!(%symbol, "processing symbol");
            self.state.set_symbol(symbol);

            for date in &dates {
                self.enter_date(*date)?;

                for fact in &facts {
                    self.enter_fact(Arc::clone(fact))?;
                    if let Some(eval) = fact.eval() {
                        self.eval(Arc::clone(fact), eval)?;
                    }
                    for query in fact.queries() {
                        self.query(query)?;
                    }
                    self.exit_fact()?;
                }

                for ratio in &ratios {
                    self.ratio(ratio)?;
                }

                self.exit_date()?;
            }
        }

        self.transition(Stage::Ending)?;
        info!(results = self.state.results().len(), "evaluation complete");
        Ok(&self.state)
    }

    fn transition(&mut self, to: Stage) -> Result<(), EngineError> {
        if !to.can_follow(self.stage) {
            return Err(EngineError::IllegalTransition {
                from: self.stage,
                to,
            });
        }
        debug!(from = ?self.stage, ?to, "stage transition");
        self.stage = to;
        Ok(())
    }

    fn start(&mut self, period: PeriodKind, symbols: &[Symbol], dates: &[Date]) {
        self.stage = Stage::Starting;
        self.state = EvaluationState::new(period);
        let metadata = self.state.metadata_mut();
        metadata.symbols = symbols.to_vec();
        metadata.dates = dates.to_vec();
        debug!(%period, symbols = symbols.len(), dates = dates.len(), "starting evaluation");
    }

    fn enter_date(&mut self, date: Date) -> Result<(), EngineError> {
        self.transition(Stage::Date)?;
        self.state.set_date(date);

        let symbol = self.state.key()?.symbol;
        let period = self.state.period();
        let report = self
            .source
            .fetch_report(&symbol, period, date)
            .map_err(|source| {
                warn!(%symbol, %period, %date, error = %source, "report unavailable");
                EngineError::Source {
                    symbol: symbol.clone(),
                    period,
                    date,
                    source,
                }
            })?;

        self.state.set_report(report);
        self.state.current_result_mut()?;
        Ok(())
    }

    fn exit_date(&mut self) -> Result<(), EngineError> {
        self.state.clear_report();

        if !self.state.deferred().is_empty() {
            let pending = self
                .state
                .deferred()
                .iter()
                .map(|deferred| deferred.fact.id().to_owned())
                .collect::<Vec<_>>();
            warn!(?pending, "deferred evals left unresolved");
            return Err(EngineError::UnresolvedDependency {
                pending,
                context: self.state.failure_context(),
            });
        }

        let result = self.state.current_result()?;
        let missing_facts: Vec<String> = self
            .rules
            .fact_ids()
            .filter(|id| !result.facts.contains_key(*id))
            .map(str::to_owned)
            .collect();
        let missing_ratios: Vec<String> = self
            .rules
            .ratio_ids()
            .filter(|id| !result.ratios.contains_key(*id))
            .map(str::to_owned)
            .collect();

        if !missing_facts.is_empty() || !missing_ratios.is_empty() {
            warn!(?missing_facts, ?missing_ratios, "incomplete results");
            return Err(EngineError::IncompleteResult {
                missing_facts,
                missing_ratios,
                context: self.state.failure_context(),
            });
        }

        info!(
            symbol = ?self.state.symbol(),
            date = ?self.state.date(),
            facts = result.facts.len(),
            ratios = result.ratios.len(),
            "date complete"
        );
        Ok(())
    }

    fn enter_fact(&mut self, fact: Arc<Fact>) -> Result<(), EngineError> {
        self.transition(Stage::Fact)?;
        self.state.set_fact(fact);
        Ok(())
    }

    /// Replay the whole deferred queue once, then require the active fact
    /// to have a value or a pending deferral.
    fn exit_fact(&mut self) -> Result<(), EngineError> {
        for deferred in self.state.take_deferred() {
            self.eval(deferred.fact, &deferred.eval)?;
        }

        let fact = self
            .state
            .fact()
            .cloned()
            .ok_or(EngineError::InvalidState { what: "active fact" })?;
        let resolved = self.state.current_result()?.facts.contains_key(fact.id());
        let deferred = self
            .state
            .deferred()
            .iter()
            .any(|pending| pending.fact.id() == fact.id());

        if !resolved && !deferred {
            warn!(fact = fact.id(), "no value computed for fact");
            return Err(EngineError::IncompleteResult {
                missing_facts: vec![fact.id().to_owned()],
                missing_ratios: Vec::new(),
                context: self.state.failure_context(),
            });
        }
        Ok(())
    }

    /// Evaluate `formula` for `fact` now, or defer it when an input is missing.
    fn eval(&mut self, fact: Arc<Fact>, formula: &str) -> Result<(), EngineError> {
        let facts = &self.state.current_result()?.facts;
        let ready = fact
            .eval_has_prerequisites(formula, facts)
            .map_err(|source| self.evaluation_error(&fact, formula, source))?;

        if !ready {
            self.transition(Stage::DeferredEval)?;
            debug!(fact = fact.id(), formula, "deferring eval");
            self.state.defer(DeferredEval {
                fact,
                eval: formula.to_owned(),
            });
            return Ok(());
        }

        self.transition(Stage::Eval)?;
        let value = fact
            .execute_eval(formula, &self.state.current_result()?.facts)
            .map_err(|source| self.evaluation_error(&fact, formula, source))?;
        self.state
            .current_result_mut()?
            .facts
            .insert(fact.id().to_owned(), value);
        Ok(())
    }

    fn evaluation_error(
        &self,
        fact: &Fact,
        formula: &str,
        source: ExpressionError,
    ) -> EngineError {
        warn!(fact = fact.id(), formula, error = %source, "eval failed");
        EngineError::Evaluation {
            fact: fact.id().to_owned(),
            expression: formula.to_owned(),
            context: self.state.failure_context(),
            source,
        }
    }

    /// Run `query` for the active fact unless it already has a value.
    fn query(&mut self, query: &QuerySpec) -> Result<(), EngineError> {
        self.transition(Stage::Query)?;

        let fact = self
            .state
            .fact()
            .cloned()
            .ok_or(EngineError::InvalidState { what: "active fact" })?;
        if self.state.current_result()?.facts.contains_key(fact.id()) {
            return Ok(());
        }

        let report = self
            .state
            .report()
            .ok_or(EngineError::InvalidState { what: "active report" })?;
        let value = fact.execute_query(query, report).map_err(|source| {
            warn!(fact = fact.id(), error = %source, "query failed");
            EngineError::Query {
                fact: fact.id().to_owned(),
                context: self.state.failure_context(),
                source,
            }
        })?;

        if let Some(value) = value {
            self.state
                .current_result_mut()?
                .facts
                .insert(fact.id().to_owned(), value);
        }
        Ok(())
    }

    fn ratio(&mut self, ratio: &Ratio) -> Result<(), EngineError> {
        self.transition(Stage::Ratio)?;

        let metric = ratio
            .calculate(&self.state.current_result()?.facts)
            .map_err(|source| {
                warn!(ratio = ratio.id(), error = %source, "ratio failed");
                EngineError::Ratio {
                    ratio: ratio.id().to_owned(),
                    context: self.state.failure_context(),
                    source,
                }
            })?;
        self.state
            .current_result_mut()?
            .ratios
            .insert(ratio.id().to_owned(), metric);
        Ok(())
    }
}
