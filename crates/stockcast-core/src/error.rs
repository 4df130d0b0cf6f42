use thiserror::Error;

/// Validation and contract errors exposed by `stockcast-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },
    #[error("symbol has an empty base or suffix: '{value}'")]
    SymbolMalformed { value: String },

    #[error("invalid source '{value}', expected one of twse, yahoo, finmind")]
    InvalidSource { value: String },

    #[error("date range start {start} is after end {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,
    #[error("series dates must be strictly increasing: {previous} then {next}")]
    UnorderedSeries { previous: String, next: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("trace_id must be 32 hex characters")]
    InvalidTraceId,
    #[error("source_chain must contain at least one provider")]
    EmptySourceChain,
}
