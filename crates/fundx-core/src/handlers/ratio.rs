use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RatioError;
use crate::expression::ExpressionEvaluator;
use crate::rules::{RatioSpec, ZeroDivisionPolicy};

use super::default_label;

/// Both operands of a ratio alongside their quotient.
///
/// Non-finite values (recorded under [`ZeroDivisionPolicy::Infinite`])
/// serialize as the strings `"inf"`, `"-inf"` and `"nan"`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioMetric {
    #[serde(serialize_with = "serialize_quotient", deserialize_with = "deserialize_quotient")]
    pub a: f64,
    #[serde(serialize_with = "serialize_quotient", deserialize_with = "deserialize_quotient")]
    pub b: f64,
    #[serde(serialize_with = "serialize_quotient", deserialize_with = "deserialize_quotient")]
    pub ratio: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireQuotient {
    Number(f64),
    Text(String),
}

fn serialize_quotient<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if value.is_nan() {
        serializer.serialize_str("nan")
    } else if value.is_infinite() {
        serializer.serialize_str(if value.is_sign_positive() { "inf" } else { "-inf" })
    } else {
        serializer.serialize_f64(*value)
    }
}

fn deserialize_quotient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match WireQuotient::deserialize(deserializer)? {
        WireQuotient::Number(value) => Ok(value),
        WireQuotient::Text(text) => match text.as_str() {
            "inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            other => Err(serde::de::Error::custom(format!(
                "expected a number, \"inf\", \"-inf\" or \"nan\", got \"{other}\""
            ))),
        },
    }
}

/// One ratio of the rule document.
#[derive(Debug, Clone)]
pub struct Ratio {
    spec: RatioSpec,
    label: String,
    evaluator: Arc<ExpressionEvaluator>,
}

impl Ratio {
    pub fn new(spec: RatioSpec, evaluator: Arc<ExpressionEvaluator>) -> Self {
        let label = spec
            .label
            .clone()
            .unwrap_or_else(|| default_label(&spec.id));
        Self {
            spec,
            label,
            evaluator,
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn group(&self) -> Option<&str> {
        self.spec.group.as_deref()
    }

    pub fn description(&self) -> &str {
        &self.spec.description
    }

    pub fn spec(&self) -> &RatioSpec {
        &self.spec
    }

    /// Value of one operand: a fact id when `facts` has it, else a formula.
    pub fn resolve(&self, source: &str, facts: &BTreeMap<String, f64>) -> Result<f64, RatioError> {
        let source = source.trim();
        if let Some(value) = facts.get(source) {
            return Ok(*value);
        }

        self.evaluator
            .evaluate(source, facts)
            .map_err(|source_error| RatioError::Evaluation {
                expression: source.to_owned(),
                source: source_error,
            })
    }

    /// Compute `a / b` over the facts resolved so far.
    ///
    /// # Errors
    ///
    /// Returns [`RatioError::Evaluation`] when an operand cannot be resolved,
    /// and [`RatioError::DivisionByZero`] when `b` is zero and the ratio's
    /// policy is [`ZeroDivisionPolicy::Fail`].
    pub fn calculate(&self, facts: &BTreeMap<String, f64>) -> Result<RatioMetric, RatioError> {
        let a = self.resolve(&self.spec.compute.source_a, facts)?;
        let b = self.resolve(&self.spec.compute.source_b, facts)?;

        if b == 0.0 && self.spec.on_zero_division == ZeroDivisionPolicy::Fail {
            return Err(RatioError::DivisionByZero { numerator: a });
        }

        Ok(RatioMetric { a, b, ratio: a / b })
    }
}
