use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_SYMBOL_LEN: usize = 15;

/// Exchange suffixes that mark a symbol as listed on the regional market.
pub const DOMESTIC_SUFFIXES: [&str; 2] = ["TW", "TWO"];

/// Suffix of the over-the-counter board. Its listings are domestic but absent
/// from the exchange's own daily report.
pub const OTC_SUFFIX: &str = "TWO";

/// Suffix appended when a bare domestic code is sent to the aggregator.
const AGGREGATOR_DOMESTIC_SUFFIX: &str = "TW";

/// Normalized market symbol/ticker.
///
/// Input is case-insensitive; the stored form is trimmed and upper-cased.
/// A symbol may be a bare code (`AAPL`, `2330`) or carry an exchange suffix
/// after the last dot (`2330.TW`, `7203.T`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a symbol to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '^');
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        if let Some((base, suffix)) = normalized.rsplit_once('.') {
            if base.is_empty() || suffix.is_empty() {
                return Err(ValidationError::SymbolMalformed { value: normalized });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exchange suffix after the last dot, if any.
    pub fn suffix(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, suffix)| suffix)
    }

    /// Symbol without its exchange suffix.
    pub fn base(&self) -> &str {
        self.0
            .rsplit_once('.')
            .map(|(base, _)| base)
            .unwrap_or(self.0.as_str())
    }

    /// Domestic classification under the default suffix list.
    ///
    /// An explicit suffix always wins over the all-digit heuristic, so
    /// `2330.T` is foreign while `2330` and `2330.TW` are domestic.
    pub fn is_domestic(&self) -> bool {
        self.is_domestic_with(&DOMESTIC_SUFFIXES, false)
    }

    /// Domestic classification with a custom suffix list.
    ///
    /// `digits_win` flips the ambiguous case (all-digit base carrying a
    /// non-regional suffix) over to the domestic side.
    pub fn is_domestic_with<S: AsRef<str>>(&self, domestic_suffixes: &[S], digits_win: bool) -> bool {
        match self.suffix() {
            Some(suffix) if has_suffix(domestic_suffixes, suffix) => true,
            Some(_) => digits_win && is_all_digits(self.base()),
            None => is_all_digits(self.base()),
        }
    }

    /// Listed on the over-the-counter board (`6488.TWO`).
    pub fn is_otc(&self) -> bool {
        self.suffix()
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(OTC_SUFFIX))
    }

    /// Cache and lookup key: the regional suffix is stripped so `2330` and
    /// `2330.TW` share one entry. OTC listings keep theirs, since a bare
    /// code means the main board.
    pub fn canonical_id(&self) -> &str {
        self.canonical_id_with(&DOMESTIC_SUFFIXES)
    }

    pub fn canonical_id_with<S: AsRef<str>>(&self, domestic_suffixes: &[S]) -> &str {
        match self.suffix() {
            Some(_) if self.is_otc() => self.as_str(),
            Some(suffix) if has_suffix(domestic_suffixes, suffix) => self.base(),
            _ => self.as_str(),
        }
    }

    /// Ticker form understood by the general aggregator.
    pub fn aggregator_ticker(&self) -> String {
        if self.suffix().is_none() && self.is_domestic() {
            format!("{}.{AGGREGATOR_DOMESTIC_SUFFIX}", self.0)
        } else {
            self.0.clone()
        }
    }
}

fn has_suffix<S: AsRef<str>>(suffixes: &[S], suffix: &str) -> bool {
    suffixes
        .iter()
        .any(|candidate| candidate.as_ref().eq_ignore_ascii_case(suffix))
}

fn is_all_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
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

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}
