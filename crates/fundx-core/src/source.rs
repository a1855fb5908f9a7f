//! Statement-source contract and provider dispatch.
//!
//! The engine never retrieves filings itself. It asks a [`StatementSource`]
//! for the [`Report`] of one symbol at one date; how that report is obtained
//! (network, cache, fixtures) is the source's business.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`StatementSource`] | Blocking report retrieval contract |
//! | [`SymbolRouter`] | Dispatches by [`Listing`] between two providers |
//! | [`FilingStore`] | In-memory filings, loadable from a fixtures directory |

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::statement::{Filing, Report};
use crate::{Date, Listing, PeriodKind, Symbol, ValidationError};

/// Canonical provider identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Edgar,
    MarketWatch,
    Fixture,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Edgar, Self::MarketWatch, Self::Fixture];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Edgar => "edgar",
            Self::MarketWatch => "market_watch",
            Self::Fixture => "fixture",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "edgar" => Ok(Self::Edgar),
            "market_watch" | "marketwatch" => Ok(Self::MarketWatch),
            "fixture" => Ok(Self::Fixture),
            other => Err(ValidationError::InvalidProvider {
                value: other.to_owned(),
            }),
        }
    }
}

/// Source-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    NoData,
    UnsupportedPeriod,
    Unavailable,
    InvalidRequest,
    Internal,
}

/// Structured statement-source error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn no_data(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::NoData,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unsupported_period(provider: ProviderId, period: PeriodKind) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedPeriod,
            message: format!("provider '{provider}' does not serve {period} statements"),
            retryable: false,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::NoData => "source.no_data",
            SourceErrorKind::UnsupportedPeriod => "source.unsupported_period",
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Report retrieval contract.
///
/// `fetch_report` may block on I/O. The engine does not retry it and applies
/// no timeout; wrap the source if either is needed.
///
/// Implementations must be `Send + Sync` so one source can serve several
/// sequential runs from different threads.
pub trait StatementSource: Send + Sync {
    /// Provider that serves `symbol`.
    fn provider_for(&self, symbol: &Symbol) -> ProviderId;

    /// Fetches the report of `symbol` for `period` at `date`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if:
    /// - No filing exists for the symbol/date ([`SourceErrorKind::NoData`])
    /// - The provider does not serve `period`
    /// - The provider is unavailable
    fn fetch_report(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        date: Date,
    ) -> Result<Report, SourceError>;
}

/// Dispatches each symbol by its [`Listing`]: exchange tickers to one
/// provider, OTC tickers to another.
pub struct SymbolRouter {
    exchange: Arc<dyn StatementSource>,
    otc: Arc<dyn StatementSource>,
    exchange_max_len: usize,
}

impl SymbolRouter {
    pub fn new(exchange: Arc<dyn StatementSource>, otc: Arc<dyn StatementSource>) -> Self {
        Self {
            exchange,
            otc,
            exchange_max_len: Symbol::EXCHANGE_MAX_LEN,
        }
    }

    pub fn with_exchange_max_len(mut self, exchange_max_len: usize) -> Self {
        self.exchange_max_len = exchange_max_len;
        self
    }

    fn select(&self, symbol: &Symbol) -> &dyn StatementSource {
        match symbol.listing_within(self.exchange_max_len) {
            Listing::Exchange => self.exchange.as_ref(),
            Listing::OverTheCounter => self.otc.as_ref(),
        }
    }
}

impl StatementSource for SymbolRouter {
    fn provider_for(&self, symbol: &Symbol) -> ProviderId {
        self.select(symbol).provider_for(symbol)
    }

    fn fetch_report(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        date: Date,
    ) -> Result<Report, SourceError> {
        let source = self.select(symbol);
        debug!(%symbol, provider = %source.provider_for(symbol), "routing report request");
        source.fetch_report(symbol, period, date)
    }
}

/// In-memory filings keyed by symbol and date.
#[derive(Debug, Clone)]
pub struct FilingStore {
    provider: ProviderId,
    periods: Vec<PeriodKind>,
    filings: HashMap<(Symbol, Date), Filing>,
}

impl Default for FilingStore {
    fn default() -> Self {
        Self::new(ProviderId::Fixture)
    }
}

impl FilingStore {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            periods: PeriodKind::ALL.to_vec(),
            filings: HashMap::new(),
        }
    }

    /// Restrict the periods this store serves.
    pub fn with_periods(mut self, periods: &[PeriodKind]) -> Self {
        self.periods = periods.to_vec();
        self
    }

    pub fn insert(&mut self, symbol: Symbol, date: Date, filing: Filing) -> &mut Self {
        self.filings.insert((symbol, date), filing);
        self
    }

    pub fn len(&self) -> usize {
        self.filings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filings.is_empty()
    }

    /// Load `<dir>/<SYMBOL>/<DATE>.json` files, where `<DATE>` is `2020Q3`
    /// or `2020` for annual filings.
    pub fn load_dir(provider: ProviderId, dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        let mut store = Self::new(provider);

        for symbol_entry in fs::read_dir(dir.as_ref())? {
            let symbol_path = symbol_entry?.path();
            if !symbol_path.is_dir() {
                continue;
            }
            let Some(symbol_name) = symbol_path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let symbol = Symbol::parse(symbol_name)?;

            for file_entry in fs::read_dir(&symbol_path)? {
                let file_path = file_entry?.path();
                if file_path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                    continue;
                }
                let Some(stem) = file_path.file_stem().and_then(|stem| stem.to_str()) else {
                    continue;
                };
                let date = Date::from_str(stem)?;
                let filing: Filing = serde_json::from_str(&fs::read_to_string(&file_path)?)?;
                store.insert(symbol.clone(), date, filing);
            }
        }

        debug!(provider = %provider, filings = store.len(), "loaded filing fixtures");
        Ok(store)
    }
}

impl StatementSource for FilingStore {
    fn provider_for(&self, _symbol: &Symbol) -> ProviderId {
        self.provider
    }

    fn fetch_report(
        &self,
        symbol: &Symbol,
        period: PeriodKind,
        date: Date,
    ) -> Result<Report, SourceError> {
        if !self.periods.contains(&period) {
            return Err(SourceError::unsupported_period(self.provider, period));
        }

        let filing = self
            .filings
            .get(&(symbol.clone(), date))
            .ok_or_else(|| SourceError::no_data(format!("no filing for {symbol} at {date}")))?;

        Report::from_filing(filing, period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{RawStatement, StatementLine};

    fn filing(value: f64) -> Filing {
        let statement = RawStatement::new(
            "2020-12-31",
            Some(3),
            vec![StatementLine::new("us-gaap_Assets", ["Total Assets"], vec![value])],
        );
        Filing {
            balance_sheets: vec![statement.clone()],
            cash_flows: vec![statement.clone()],
            income_statements: vec![statement],
        }
    }

    fn symbol(raw: &str) -> Symbol {
        Symbol::parse(raw).expect("valid symbol")
    }

    #[test]
    fn filing_store_serves_inserted_filings() {
        let date = Date::new(2020, 4).expect("date");
        let mut store = FilingStore::default();
        store.insert(symbol("XOM"), date, filing(10.0));

        let report = store
            .fetch_report(&symbol("XOM"), PeriodKind::Quarterly, date)
            .expect("report");
        assert_eq!(report.balance_sheet.get(&["us-gaap_Assets"]).expect("field"), 10.0);

        let err = store
            .fetch_report(&symbol("CVX"), PeriodKind::Quarterly, date)
            .expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::NoData);
        assert_eq!(err.code(), "source.no_data");
    }

    #[test]
    fn filing_store_rejects_unsupported_periods() {
        let date = Date::annual(2020);
        let mut store =
            FilingStore::new(ProviderId::MarketWatch).with_periods(&[PeriodKind::Quarterly]);
        store.insert(symbol("ABEPF"), date, filing(1.0));

        let err = store
            .fetch_report(&symbol("ABEPF"), PeriodKind::Annual, date)
            .expect_err("must fail");
        assert_eq!(err.kind(), SourceErrorKind::UnsupportedPeriod);
        assert!(!err.retryable());
    }

    #[test]
    fn router_sends_otc_tickers_to_second_store() {
        let date = Date::new(2020, 1).expect("date");
        let mut edgar = FilingStore::new(ProviderId::Edgar);
        edgar.insert(symbol("MTDR"), date, filing(1.0));
        let mut market_watch = FilingStore::new(ProviderId::MarketWatch);
        market_watch.insert(symbol("FTSSF"), date, filing(2.0));

        let router = SymbolRouter::new(Arc::new(edgar), Arc::new(market_watch));

        assert_eq!(router.provider_for(&symbol("MTDR")), ProviderId::Edgar);
        assert_eq!(router.provider_for(&symbol("FTSSF")), ProviderId::MarketWatch);

        let report = router
            .fetch_report(&symbol("FTSSF"), PeriodKind::Quarterly, date)
            .expect("report");
        assert_eq!(report.balance_sheet.get(&["total assets"]).expect("field"), 2.0);
    }

    #[test]
    fn parses_provider_id() {
        assert_eq!(
            "MarketWatch".parse::<ProviderId>().expect("provider"),
            ProviderId::MarketWatch
        );
        assert!(matches!(
            "bloomberg".parse::<ProviderId>(),
            Err(ValidationError::InvalidProvider { .. })
        ));
    }
}
