//! Serializable snapshot of a finished run, consumed by report renderers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::handlers::RatioMetric;
use crate::state::EvaluationState;
use crate::{Date, PeriodKind, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInfo {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub symbols: Vec<Symbol>,
    pub dates: Vec<Date>,
    /// Facts by group id, in document order.
    pub fact_groups: BTreeMap<String, Vec<MetricInfo>>,
    /// Ratios by group id, in document order.
    pub ratio_groups: BTreeMap<String, Vec<MetricInfo>>,
}

/// Values of one symbol at one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub symbol: Symbol,
    pub period: PeriodKind,
    pub date: Date,
    pub facts: BTreeMap<String, f64>,
    pub ratios: BTreeMap<String, RatioMetric>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportExport {
    pub period: PeriodKind,
    pub metadata: ExportMetadata,
    /// Ordered by symbol, then date.
    pub results: Vec<ResultEntry>,
}

impl ReportExport {
    pub fn from_state(state: &EvaluationState) -> Self {
        let metadata = state.metadata();

        let fact_groups = metadata
            .facts
            .iter()
            .map(|(group, facts)| {
                let infos = facts
                    .iter()
                    .map(|fact| MetricInfo {
                        id: fact.id().to_owned(),
                        label: fact.label().to_owned(),
                        description: String::new(),
                    })
                    .collect();
                (group.clone(), infos)
            })
            .collect();

        let ratio_groups = metadata
            .ratios
            .iter()
            .map(|(group, ratios)| {
                let infos = ratios
                    .iter()
                    .map(|ratio| MetricInfo {
                        id: ratio.id().to_owned(),
                        label: ratio.label().to_owned(),
                        description: ratio.description().to_owned(),
                    })
                    .collect();
                (group.clone(), infos)
            })
            .collect();

        let results = state
            .results()
            .iter()
            .map(|(key, value)| ResultEntry {
                symbol: key.symbol.clone(),
                period: key.period,
                date: key.date(),
                facts: value.facts.clone(),
                ratios: value.ratios.clone(),
            })
            .collect();

        Self {
            period: state.period(),
            metadata: ExportMetadata {
                symbols: metadata.symbols.clone(),
                dates: metadata.dates.clone(),
                fact_groups,
                ratio_groups,
            },
            results,
        }
    }

    pub fn result(&self, symbol: &Symbol, date: Date) -> Option<&ResultEntry> {
        self.results
            .iter()
            .find(|entry| &entry.symbol == symbol && entry.date == date)
    }
}
