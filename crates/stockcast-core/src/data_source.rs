//! Price source trait and request/response types.
//!
//! This module defines the adapter contract (`PriceSource`) every upstream
//! provider implements, the request handed to it and the provider-native
//! payload it returns.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`HistoryRequest`] | Symbol plus inclusive date window |
//! | [`ProviderPayload`] | Rows in the provider's own field vocabulary |
//! | [`FetchResult`] | `Success`, `Empty` or a typed [`SourceError`] |
//! | [`HealthStatus`] | Circuit and quota snapshot for routing and the `sources` command |
//!
//! # Example
//!
//! ```rust,ignore
//! use stockcast_core::{FetchResult, HistoryRequest, PriceSource, Symbol, TwseAdapter};
//!
//! async fn recent(adapter: &TwseAdapter) {
//!     let request = HistoryRequest::trailing(Symbol::parse("2330")?, 31);
//!     match adapter.fetch(request).await {
//!         FetchResult::Success(payload) => println!("{} rows", payload.records.len()),
//!         FetchResult::Empty => println!("no rows"),
//!         FetchResult::Failure(error) => eprintln!("{error}"),
//!     }
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Date, Duration, OffsetDateTime};

use crate::circuit_breaker::CircuitState;
use crate::{ProviderId, Symbol, ValidationError};

/// Health state used by chain planning and `sources` command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Runtime source health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub state: HealthState,
    pub rate_available: bool,
}

impl HealthStatus {
    pub const fn new(state: HealthState, rate_available: bool) -> Self {
        Self {
            state,
            rate_available,
        }
    }

    pub const fn healthy() -> Self {
        Self::new(HealthState::Healthy, true)
    }

    /// Open circuit is unhealthy, a pending probe is degraded.
    pub const fn from_circuit(circuit: CircuitState, rate_available: bool) -> Self {
        let state = match circuit {
            CircuitState::Closed => HealthState::Healthy,
            CircuitState::HalfOpen => HealthState::Degraded,
            CircuitState::Open => HealthState::Unhealthy,
        };
        Self::new(state, rate_available)
    }

    pub fn label(self) -> &'static str {
        if !self.rate_available {
            return "rate_limited";
        }

        match self.state {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
        }
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// Network failure, timeout, upstream 5xx or an open circuit.
    Transport,
    /// HTTP 429, a quota message in the body, or a local throttle refusal.
    RateLimited,
    /// Payload could not be mapped onto the canonical schema.
    SchemaMismatch,
    /// Too few bars for the requested metric.
    InsufficientData,
    InvalidRequest,
    AdapterNotRegistered,
}

/// Structured source error used by chain fallback and envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Transport,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::SchemaMismatch,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InsufficientData,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn adapter_not_registered(provider: ProviderId) -> Self {
        Self {
            kind: SourceErrorKind::AdapterNotRegistered,
            message: format!("source adapter '{provider}' is not registered"),
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
            SourceErrorKind::Transport => "source.transport",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::SchemaMismatch => "source.schema_mismatch",
            SourceErrorKind::InsufficientData => "source.insufficient_data",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::AdapterNotRegistered => "source.adapter_not_registered",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Outcome of one fetch: data, a well-formed "nothing there", or a failure.
///
/// `Empty` is deliberately not an error: a provider that answers with no
/// rows is healthy, and the caller decides whether to try elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    Success(T),
    Empty,
    Failure(SourceError),
}

impl<T> FetchResult<T> {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
        match self {
            Self::Success(value) => FetchResult::Success(f(value)),
            Self::Empty => FetchResult::Empty,
            Self::Failure(error) => FetchResult::Failure(error),
        }
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&SourceError> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }
}

/// Daily history request over an inclusive date window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub start: Date,
    pub end: Date,
}

impl HistoryRequest {
    pub fn new(symbol: Symbol, start: Date, end: Date) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        Ok(Self { symbol, start, end })
    }

    /// Window of `days` calendar days ending today (UTC).
    pub fn trailing(symbol: Symbol, days: u32) -> Self {
        Self::trailing_from(symbol, OffsetDateTime::now_utc().date(), days)
    }

    pub fn trailing_from(symbol: Symbol, end: Date, days: u32) -> Self {
        let start = end
            .checked_sub(Duration::days(i64::from(days)))
            .unwrap_or(Date::MIN);
        Self { symbol, start, end }
    }
}

/// Provider-native rows, keyed by the provider's own field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPayload {
    pub provider: ProviderId,
    pub symbol: Symbol,
    /// Exchange offset applied to epoch-second timestamps.
    pub utc_offset_seconds: i32,
    pub records: Vec<Map<String, Value>>,
}

impl ProviderPayload {
    pub fn new(provider: ProviderId, symbol: Symbol, records: Vec<Map<String, Value>>) -> Self {
        Self {
            provider,
            symbol,
            utc_offset_seconds: 0,
            records,
        }
    }

    pub fn with_utc_offset(mut self, seconds: i32) -> Self {
        self.utc_offset_seconds = seconds;
        self
    }
}

/// Price adapter contract implemented by each upstream provider.
///
/// Implementations make no retries and keep no memo of past answers; the
/// pipeline owns fallback and the fetch cache owns reuse.
pub trait PriceSource: Send + Sync {
    fn id(&self) -> ProviderId;

    fn fetch<'a>(
        &'a self,
        req: HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = FetchResult<ProviderPayload>> + Send + 'a>>;

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SourceError::transport("x").code(), "source.transport");
        assert_eq!(SourceError::rate_limited("x").code(), "source.rate_limited");
        assert_eq!(
            SourceError::schema_mismatch("x").code(),
            "source.schema_mismatch"
        );
        assert_eq!(
            SourceError::adapter_not_registered(ProviderId::Finmind).code(),
            "source.adapter_not_registered"
        );
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(SourceError::transport("x").retryable());
        assert!(SourceError::rate_limited("x").retryable());
        assert!(!SourceError::schema_mismatch("x").retryable());
        assert!(!SourceError::insufficient_data("x").retryable());
    }

    #[test]
    fn trailing_window_spans_requested_days() {
        let end = Date::from_calendar_date(2024, Month::March, 1).expect("valid date");
        let request =
            HistoryRequest::trailing_from(Symbol::parse("2330").expect("valid"), end, 31);

        assert_eq!(
            request.start,
            Date::from_calendar_date(2024, Month::January, 30).expect("valid date")
        );
        assert_eq!(request.end, end);
    }

    #[test]
    fn rejects_inverted_window() {
        let start = Date::from_calendar_date(2024, Month::March, 2).expect("valid date");
        let end = Date::from_calendar_date(2024, Month::March, 1).expect("valid date");

        let err = HistoryRequest::new(Symbol::parse("AAPL").expect("valid"), start, end)
            .expect_err("must fail");
        assert!(matches!(err, ValidationError::InvalidDateRange { .. }));
    }

    #[test]
    fn health_follows_circuit_state() {
        assert_eq!(
            HealthStatus::from_circuit(CircuitState::Open, true).state,
            HealthState::Unhealthy
        );
        assert_eq!(
            HealthStatus::from_circuit(CircuitState::HalfOpen, true).label(),
            "degraded"
        );
        assert_eq!(
            HealthStatus::from_circuit(CircuitState::Closed, false).label(),
            "rate_limited"
        );
    }
}
