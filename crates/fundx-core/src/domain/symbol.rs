use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Five-letter OTC code plus a share-class suffix.
const MAX_TICKER_LEN: usize = 10;

/// Market a ticker trades on, inferred from the length of its root.
///
/// Exchange tickers have at most four letters and file with EDGAR; longer
/// roots are OTC listings (mostly foreign issuers such as `ABEPF`) whose
/// statements come from a different provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    Exchange,
    OverTheCounter,
}

/// Ticker of a reporting entity.
///
/// Stored upper-case with `.` as the share-class separator, so `brk-b`,
/// `BRK.B` and ` brk.b ` are the same symbol and map to the same fixture
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Longest root still treated as exchange-listed.
    pub const EXCHANGE_MAX_LEN: usize = 4;

    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized: String = trimmed
            .chars()
            .map(|ch| if ch == '-' { '.' } else { ch.to_ascii_uppercase() })
            .collect();
        let len = normalized.chars().count();
        if len > MAX_TICKER_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_TICKER_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            if index == 0 && !ch.is_ascii_alphabetic() {
                return Err(ValidationError::SymbolInvalidStart { ch });
            }
            if !(ch.is_ascii_alphanumeric() || ch == '.') {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        let class = normalized.split_once('.').map(|(_, class)| class);
        let class_ok = class.map_or(true, |class| {
            !class.is_empty() && class.chars().all(|ch| ch.is_ascii_alphabetic())
        });
        if !class_ok {
            let index = normalized.rfind('.').unwrap_or_default();
            return Err(ValidationError::SymbolInvalidChar { ch: '.', index });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ticker without its share class (`BRK.B` -> `BRK`).
    pub fn root(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(root, _)| root)
    }

    pub fn share_class(&self) -> Option<&str> {
        self.0.split_once('.').map(|(_, class)| class)
    }

    pub fn listing(&self) -> Listing {
        self.listing_within(Self::EXCHANGE_MAX_LEN)
    }

    /// Classify against a custom exchange root length.
    pub fn listing_within(&self, exchange_max_len: usize) -> Listing {
        if self.root().len() <= exchange_max_len {
            Listing::Exchange
        } else {
            Listing::OverTheCounter
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
