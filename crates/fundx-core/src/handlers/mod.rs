//! # Metric Handlers
//!
//! Runtime wrappers around the rule document entries. Every handler shares
//! the engine's [`ExpressionEvaluator`](crate::expression::ExpressionEvaluator)
//! so a formula is parsed once per run regardless of how many symbols and
//! dates evaluate it.
//!
//! | Handler | Description |
//! |---------|-------------|
//! | [`Fact`] | Resolves one fact from statement queries or a formula |
//! | [`Ratio`] | Computes `a / b` over already-resolved facts |

mod fact;
mod ratio;

pub use fact::Fact;
pub use ratio::{Ratio, RatioMetric};

/// Human label for an id without one: `current_assets` -> `Current Assets`.
pub(crate) fn default_label(id: &str) -> String {
    id.split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
