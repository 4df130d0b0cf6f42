use serde::{Deserialize, Serialize};
use time::Date;

use crate::{Symbol, ValidationError};

/// One trading day in the canonical OHLCV shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBar {
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl NormalizedBar {
    pub fn new(
        date: Date,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Daily bars for one symbol, strictly increasing by date.
///
/// Never mutated after construction; a cache refresh replaces the whole
/// series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSeries {
    symbol: Symbol,
    bars: Vec<NormalizedBar>,
}

impl NormalizedSeries {
    /// Build a series from bars that are already in strictly increasing date
    /// order.
    pub fn new(symbol: Symbol, bars: Vec<NormalizedBar>) -> Result<Self, ValidationError> {
        for pair in bars.windows(2) {
            if pair[0].date >= pair[1].date {
                return Err(ValidationError::UnorderedSeries {
                    previous: pair[0].date.to_string(),
                    next: pair[1].date.to_string(),
                });
            }
        }

        Ok(Self { symbol, bars })
    }

    pub fn empty(symbol: Symbol) -> Self {
        Self {
            symbol,
            bars: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn bars(&self) -> &[NormalizedBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> impl DoubleEndedIterator<Item = f64> + ExactSizeIterator + '_ {
        self.bars.iter().map(|bar| bar.close)
    }
}

impl<'de> Deserialize<'de> for NormalizedSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            symbol: Symbol,
            bars: Vec<NormalizedBar>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.symbol, raw.bars).map_err(serde::de::Error::custom)
    }
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
