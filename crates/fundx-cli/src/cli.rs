//! CLI argument definitions for fundx.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Evaluate a rule document against statement fixtures |
//! | `validate` | Parse and validate a rule document |
//! | `lookup` | Resolve candidate names against one statement file |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--verbose` | `false` | Debug-level logs on stderr |
//!
//! # Examples
//!
//! ```bash
//! fundx run --rules rules.yaml --statements fixtures --symbol AAPL --date 2020Q4 --period quarterly
//! fundx run --config report.toml --format table
//! fundx validate rules.yaml
//! fundx lookup --statement balance.json "Total Assets" us-gaap_Assets
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Rule-driven fact and ratio evaluation over financial statements.
#[derive(Debug, Parser)]
#[command(name = "fundx", author, version, about)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object output.
    Json,
    /// Plain text tables for terminal display.
    Table,
}

/// Reporting granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PeriodArg {
    Annual,
    Quarterly,
}

impl From<PeriodArg> for fundx_core::PeriodKind {
    fn from(value: PeriodArg) -> Self {
        match value {
            PeriodArg::Annual => Self::Annual,
            PeriodArg::Quarterly => Self::Quarterly,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate every fact and ratio for the given symbols and dates.
    ///
    /// Flags override the values of `--config`. The statements directory
    /// falls back to `FUNDX_STATEMENTS_DIR`.
    ///
    /// # Examples
    ///
    ///   fundx run --rules rules.yaml --statements fixtures --symbol AAPL --date 2020
    ///   fundx run --config report.toml --date 2020Q3 --date 2020Q4
    Run(RunArgs),

    /// Parse a rule document and report what it declares.
    Validate(ValidateArgs),

    /// Resolve candidate names or patterns against one statement file.
    Lookup(LookupArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Rule document (YAML, or JSON by extension).
    #[arg(long)]
    pub rules: Option<PathBuf>,

    /// Directory of `<SYMBOL>/<DATE>.json` filings.
    #[arg(long)]
    pub statements: Option<PathBuf>,

    /// Symbol to evaluate; repeatable.
    #[arg(long = "symbol")]
    pub symbols: Vec<String>,

    /// Date to evaluate (`2020` or `2020Q3`); repeatable.
    #[arg(long = "date")]
    pub dates: Vec<String>,

    #[arg(long, value_enum)]
    pub period: Option<PeriodArg>,

    /// TOML report configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Rule document to validate.
    pub rules: PathBuf,
}

#[derive(Debug, Args)]
pub struct LookupArgs {
    /// Statement file (JSON `RawStatement`).
    #[arg(long)]
    pub statement: PathBuf,

    #[arg(long, value_enum, default_value_t = PeriodArg::Annual)]
    pub period: PeriodArg,

    /// Treat candidates as case-insensitive patterns.
    #[arg(long, default_value_t = false)]
    pub search: bool,

    /// Candidate keys/labels, tried as one field.
    #[arg(required = true, num_args = 1..)]
    pub candidates: Vec<String>,
}
