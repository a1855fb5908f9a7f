//! Typed rule document: fact and ratio definitions.
//!
//! The document is parsed once into these types before any evaluation; the
//! engine never looks at raw markup. YAML and JSON carry the same shape:
//!
//! ```yaml
//! facts:
//!   groups:
//!     - id: balance
//!   fact:
//!     - id: current_assets
//!       group: balance
//!       query:
//!         - source: balance_sheet
//!           mode: select
//!           lines: |
//!             us-gaap_AssetsCurrent
//!             Total Current Assets
//!     - id: non_current_assets
//!       group: balance
//!       eval: total_assets - current_assets
//! ratios:
//!   groups:
//!     - id: liquidity
//!   ratio:
//!     - id: current_ratio
//!       group: liquidity
//!       description: Ability to pay short-term obligations.
//!       compute:
//!         source.a: current_assets
//!         source.b: current_liabilities
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::statement::StatementKind;

/// Named bucket facts or ratios can declare membership in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
}

/// How a query interprets its candidate lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Literal keys/labels, resolved one by one.
    Select,
    /// Case-insensitive patterns matched against every key and label.
    Regexp,
}

impl QueryMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Regexp => "regexp",
        }
    }
}

impl FromStr for QueryMode {
    type Err = RuleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "select" => Ok(Self::Select),
            "regexp" => Ok(Self::Regexp),
            other => Err(RuleError::UnsupportedMode {
                value: other.to_owned(),
            }),
        }
    }
}

/// What a query does with the values it found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostAggregation {
    First,
    Sum,
    /// Fixed value, used once the query found anything at all.
    Static(f64),
}

/// One data query of a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawQuery", into = "RawQuery")]
pub struct QuerySpec {
    pub source: StatementKind,
    pub mode: QueryMode,
    pub lines: Vec<String>,
    pub post: PostAggregation,
}

impl QuerySpec {
    pub fn select<S: Into<String>>(
        source: StatementKind,
        lines: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            source,
            mode: QueryMode::Select,
            lines: lines.into_iter().map(Into::into).collect(),
            post: PostAggregation::First,
        }
    }

    pub fn regexp<S: Into<String>>(
        source: StatementKind,
        patterns: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            mode: QueryMode::Regexp,
            ..Self::select(source, patterns)
        }
    }

    pub fn with_post(mut self, post: PostAggregation) -> Self {
        self.post = post;
        self
    }
}

/// Candidate lines, either one newline-delimited block or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
enum RawLines {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RawQuery {
    source: String,
    mode: String,
    lines: RawLines,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    post: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<f64>,
}

impl TryFrom<RawQuery> for QuerySpec {
    type Error = RuleError;

    fn try_from(raw: RawQuery) -> Result<Self, Self::Error> {
        let lines: Vec<String> = match raw.lines {
            RawLines::Text(text) => text.lines().map(str::to_owned).collect(),
            RawLines::List(list) => list,
        }
        .into_iter()
        .map(|line| line.trim().to_owned())
        .filter(|line| !line.is_empty())
        .collect();

        if lines.is_empty() {
            return Err(RuleError::EmptyLines);
        }

        let post = match raw.post.as_deref().map(str::trim) {
            None | Some("") => PostAggregation::First,
            Some("sum") => PostAggregation::Sum,
            Some("static") => PostAggregation::Static(raw.value.ok_or(RuleError::MissingStaticValue)?),
            Some(other) => {
                return Err(RuleError::UnsupportedPost {
                    value: other.to_owned(),
                })
            }
        };

        Ok(Self {
            source: raw.source.parse()?,
            mode: raw.mode.parse()?,
            lines,
            post,
        })
    }
}

impl From<QuerySpec> for RawQuery {
    fn from(query: QuerySpec) -> Self {
        let (post, value) = match query.post {
            PostAggregation::First => (None, None),
            PostAggregation::Sum => (Some("sum".to_owned()), None),
            PostAggregation::Static(value) => (Some("static".to_owned()), Some(value)),
        };

        Self {
            source: query.source.as_str().to_owned(),
            mode: query.mode.as_str().to_owned(),
            lines: RawLines::List(query.lines),
            post,
            value,
        }
    }
}

/// One fact definition: a formula, data queries, or both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval: Option<String>,
    #[serde(default, rename = "query", skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<QuerySpec>,
}

impl FactSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            group: None,
            eval: None,
            queries: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_eval(mut self, eval: impl Into<String>) -> Self {
        self.eval = Some(eval.into());
        self
    }

    pub fn with_query(mut self, query: QuerySpec) -> Self {
        self.queries.push(query);
        self
    }
}

/// What a ratio records when its denominator is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDivisionPolicy {
    /// Abort the run.
    #[default]
    Fail,
    /// Record the IEEE quotient (±infinity, NaN for 0/0).
    Infinite,
}

/// The two operands of a ratio: fact ids or formulas over facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeSpec {
    #[serde(rename = "source.a")]
    pub source_a: String,
    #[serde(rename = "source.b")]
    pub source_b: String,
}

/// One ratio definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub description: String,
    pub compute: ComputeSpec,
    #[serde(default)]
    pub on_zero_division: ZeroDivisionPolicy,
}

impl RatioSpec {
    pub fn new(
        id: impl Into<String>,
        source_a: impl Into<String>,
        source_b: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            label: None,
            group: None,
            description: String::new(),
            compute: ComputeSpec {
                source_a: source_a.into(),
                source_b: source_b.into(),
            },
            on_zero_division: ZeroDivisionPolicy::Fail,
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_zero_division(mut self, policy: ZeroDivisionPolicy) -> Self {
        self.on_zero_division = policy;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSection {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default, rename = "fact", alias = "facts")]
    pub facts: Vec<FactSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioSection {
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default, rename = "ratio", alias = "ratios")]
    pub ratios: Vec<RatioSpec>,
}

/// The whole rule document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDocument {
    #[serde(default)]
    pub facts: FactSection,
    #[serde(default)]
    pub ratios: RatioSection,
}

impl RuleDocument {
    pub fn new(facts: Vec<FactSpec>, ratios: Vec<RatioSpec>) -> Self {
        Self {
            facts: FactSection {
                groups: Vec::new(),
                facts,
            },
            ratios: RatioSection {
                groups: Vec::new(),
                ratios,
            },
        }
    }

    pub fn with_fact_groups<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.facts.groups = ids.into_iter().map(|id| Group { id: id.into() }).collect();
        self
    }

    pub fn with_ratio_groups<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.ratios.groups = ids.into_iter().map(|id| Group { id: id.into() }).collect();
        self
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, RuleError> {
        let document: Self = serde_yaml::from_str(input)?;
        document.validate()?;
        Ok(document)
    }

    pub fn from_json_str(input: &str) -> Result<Self, RuleError> {
        let document: Self = serde_json::from_str(input)?;
        document.validate()?;
        Ok(document)
    }

    /// Load a `.json` document, or YAML for any other extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Reject duplicate ids, empty facts and memberships in undeclared groups.
    pub fn validate(&self) -> Result<(), RuleError> {
        let fact_groups: HashSet<&str> = self.facts.groups.iter().map(|g| g.id.as_str()).collect();
        let mut seen = HashSet::new();
        for fact in &self.facts.facts {
            if !seen.insert(fact.id.as_str()) {
                return Err(RuleError::DuplicateFact {
                    id: fact.id.clone(),
                });
            }
            if fact.eval.is_none() && fact.queries.is_empty() {
                return Err(RuleError::EmptyFact {
                    id: fact.id.clone(),
                });
            }
            check_group(&fact.id, fact.group.as_deref(), &fact_groups)?;
        }

        let ratio_groups: HashSet<&str> = self.ratios.groups.iter().map(|g| g.id.as_str()).collect();
        let mut seen = HashSet::new();
        for ratio in &self.ratios.ratios {
            if !seen.insert(ratio.id.as_str()) {
                return Err(RuleError::DuplicateRatio {
                    id: ratio.id.clone(),
                });
            }
            check_group(&ratio.id, ratio.group.as_deref(), &ratio_groups)?;
        }

        Ok(())
    }

    pub fn fact_ids(&self) -> impl Iterator<Item = &str> {
        self.facts.facts.iter().map(|fact| fact.id.as_str())
    }

    pub fn ratio_ids(&self) -> impl Iterator<Item = &str> {
        self.ratios.ratios.iter().map(|ratio| ratio.id.as_str())
    }
}

fn check_group(id: &str, group: Option<&str>, declared: &HashSet<&str>) -> Result<(), RuleError> {
    match group {
        Some(group) if !declared.contains(group) => Err(RuleError::UndeclaredGroup {
            id: id.to_owned(),
            group: group.to_owned(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
facts:
  groups:
    - id: balance
  fact:
    - id: current_assets
      group: balance
      query:
        - source: balance_sheet
          mode: select
          lines: |
            us-gaap_AssetsCurrent
            Total Current Assets
    - id: noncurrent_liabilities
      query:
        - source: balance_sheet
          mode: regexp
          lines: [".*LiabilitiesNoncurrent", ".*DebtNoncurrent"]
          post: sum
    - id: preferred_equity
      query:
        - source: balance_sheet
          mode: select
          lines: us-gaap_PreferredStockValue
          post: static
          value: 0
    - id: current_equity
      eval: current_assets + current_liabilities
ratios:
  groups:
    - id: liquidity
  ratio:
    - id: current_ratio
      group: liquidity
      description: Ability to pay short-term obligations.
      compute:
        source.a: current_assets
        source.b: current_liabilities
      on_zero_division: infinite
"#;

    #[test]
    fn parses_yaml_document() {
        let document = RuleDocument::from_yaml_str(DOCUMENT).expect("valid document");

        assert_eq!(document.facts.groups, vec![Group { id: "balance".into() }]);
        assert_eq!(
            document.fact_ids().collect::<Vec<_>>(),
            vec!["current_assets", "noncurrent_liabilities", "preferred_equity", "current_equity"]
        );

        let query = &document.facts.facts[0].queries[0];
        assert_eq!(query.source, StatementKind::BalanceSheet);
        assert_eq!(query.mode, QueryMode::Select);
        assert_eq!(query.lines, vec!["us-gaap_AssetsCurrent", "Total Current Assets"]);
        assert_eq!(query.post, PostAggregation::First);

        assert_eq!(document.facts.facts[1].queries[0].post, PostAggregation::Sum);
        assert_eq!(document.facts.facts[2].queries[0].post, PostAggregation::Static(0.0));
        assert_eq!(
            document.facts.facts[3].eval.as_deref(),
            Some("current_assets + current_liabilities")
        );

        let ratio = &document.ratios.ratios[0];
        assert_eq!(ratio.compute.source_a, "current_assets");
        assert_eq!(ratio.compute.source_b, "current_liabilities");
        assert_eq!(ratio.on_zero_division, ZeroDivisionPolicy::Infinite);
    }

    #[test]
    fn round_trips_through_json() {
        let document = RuleDocument::from_yaml_str(DOCUMENT).expect("valid document");
        let json = serde_json::to_string(&document).expect("serialize");
        let parsed = RuleDocument::from_json_str(&json).expect("parse");
        assert_eq!(parsed, document);
    }

    #[test]
    fn rejects_unknown_source_and_mode() {
        let unknown_source = r#"
facts:
  fact:
    - id: x
      query:
        - source: notes
          mode: select
          lines: a
"#;
        let err = RuleDocument::from_yaml_str(unknown_source).expect_err("must fail");
        assert!(err.to_string().contains("unknown statement source 'notes'"), "{err}");

        let unsupported_mode = unknown_source
            .replace("notes", "balance_sheet")
            .replace("mode: select", "mode: xpath");
        let err = RuleDocument::from_yaml_str(&unsupported_mode).expect_err("must fail");
        assert!(err.to_string().contains("unsupported query mode 'xpath'"), "{err}");
    }

    #[test]
    fn rejects_static_without_value() {
        let query = RawQuery {
            source: "cash_flow".into(),
            mode: "select".into(),
            lines: RawLines::Text("a".into()),
            post: Some("static".into()),
            value: None,
        };
        assert!(matches!(
            QuerySpec::try_from(query),
            Err(RuleError::MissingStaticValue)
        ));
    }

    #[test]
    fn validation_catches_structural_mistakes() {
        let query = QuerySpec::select(StatementKind::BalanceSheet, ["a"]);

        let duplicate = RuleDocument::new(
            vec![
                FactSpec::new("a").with_query(query.clone()),
                FactSpec::new("a").with_eval("1"),
            ],
            Vec::new(),
        );
        assert!(matches!(duplicate.validate(), Err(RuleError::DuplicateFact { .. })));

        let empty = RuleDocument::new(vec![FactSpec::new("a")], Vec::new());
        assert!(matches!(empty.validate(), Err(RuleError::EmptyFact { .. })));

        let undeclared = RuleDocument::new(
            vec![FactSpec::new("a").with_query(query).with_group("balance")],
            Vec::new(),
        );
        assert!(matches!(
            undeclared.validate(),
            Err(RuleError::UndeclaredGroup { group, .. }) if group == "balance"
        ));

        let duplicate_ratio = RuleDocument::new(
            Vec::new(),
            vec![RatioSpec::new("r", "a", "b"), RatioSpec::new("r", "b", "a")],
        );
        assert!(matches!(
            duplicate_ratio.validate(),
            Err(RuleError::DuplicateRatio { .. })
        ));
    }
}
