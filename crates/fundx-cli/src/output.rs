use fundx_core::Envelope;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => render_table(envelope)?,
    }

    Ok(())
}

fn render_table(envelope: &Envelope<Value>) -> Result<(), CliError> {
    println!("request_id  : {}", envelope.meta.request_id);
    println!("schema      : {}", envelope.meta.schema_version);
    println!("generated_at: {}", envelope.meta.generated_at_rfc3339());
    if let Some(period) = envelope.meta.period {
        println!("period      : {period}");
    }
    if !envelope.meta.symbols.is_empty() {
        println!(
            "symbols     : {}",
            envelope
                .meta
                .symbols
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(",")
        );
    }

    if !envelope.meta.warnings.is_empty() {
        println!("warnings:");
        for warning in &envelope.meta.warnings {
            println!("  - {warning}");
        }
    }

    match envelope.data.get("results").and_then(Value::as_array) {
        Some(results) => render_results(results),
        None if envelope.data.is_null() => {}
        None => {
            println!("data:");
            let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
            for line in pretty_data.lines() {
                println!("  {line}");
            }
        }
    }

    if !envelope.errors.is_empty() {
        println!("errors:");
        for error in &envelope.errors {
            println!("  - {}: {}", error.code, error.message);
        }
    }

    Ok(())
}

/// One block per symbol/date, one row per fact and ratio.
fn render_results(results: &[Value]) {
    for entry in results {
        let symbol = entry.get("symbol").and_then(Value::as_str).unwrap_or("?");
        let date = entry.get("date").and_then(Value::as_str).unwrap_or("?");
        println!();
        println!("{symbol} {date}");

        if let Some(facts) = entry.get("facts").and_then(Value::as_object) {
            for (id, value) in facts {
                println!("  {id:<32} {}", format_number(value));
            }
        }

        if let Some(ratios) = entry.get("ratios").and_then(Value::as_object) {
            for (id, metric) in ratios {
                println!(
                    "  {id:<32} {} = {} / {}",
                    format_number(&metric["ratio"]),
                    format_number(&metric["a"]),
                    format_number(&metric["b"]),
                );
            }
        }
    }
}

/// Non-finite ratios arrive as `"inf"`, `"-inf"` or `"nan"` and print as-is.
fn format_number(value: &Value) -> String {
    match (value.as_f64(), value.as_str()) {
        (Some(number), _) => format!("{number:.4}"),
        (None, Some(text)) => text.to_owned(),
        (None, None) => "n/a".to_owned(),
    }
}
