//! # Domain Models
//!
//! Canonical domain types for stockcast market data.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, upper-cased ticker with regional classification |
//! | [`NormalizedBar`] | One trading day in canonical OHLCV form |
//! | [`NormalizedSeries`] | Bars for one symbol, strictly increasing by date |
//!
//! All models enforce their invariants at construction time:
//!
//! ```rust,ignore
//! use stockcast_core::{NormalizedBar, ValidationError};
//!
//! // Invalid bar (high < low) - returns ValidationError
//! let invalid = NormalizedBar::new(date, 100.0, 95.0, 105.0, 102.0, 1_000);
//! assert!(matches!(invalid, Err(ValidationError::InvalidBarRange)));
//! ```

mod models;
mod symbol;

pub use models::{NormalizedBar, NormalizedSeries};
pub use symbol::{Symbol, DOMESTIC_SUFFIXES, OTC_SUFFIX};
