//! # Stockcast Core
//!
//! End-of-day price pipeline for the stockcast toolkit.
//!
//! ## Overview
//!
//! - **Canonical domain models** for symbols, daily bars and series
//! - **Provider adapters** for the exchange feed, Yahoo and FinMind
//! - **Schema normalization** of provider vocabularies into one OHLCV shape
//! - **Routing** of a symbol to its ordered adapter chain
//! - **Fetch cache** with TTL expiry and per-key request coalescing
//! - **Derived metrics** and the advisory payload handed to a text engine
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (TWSE, Yahoo, FinMind) |
//! | [`advisory`] | Advisory payload, prompt and engine trait |
//! | [`cache`] | TTL fetch cache with request coalescing |
//! | [`circuit_breaker`] | Circuit breaker for resilient calls |
//! | [`config`] | Pipeline configuration and credentials |
//! | [`data_source`] | Adapter trait and request/response types |
//! | [`domain`] | Domain models (Symbol, NormalizedBar, NormalizedSeries) |
//! | [`envelope`] | Response envelope with metadata |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`metrics`] | Last close, day-over-day change, moving average |
//! | [`news`] | Best-effort headline lookup |
//! | [`normalizer`] | Provider payload to canonical series |
//! | [`pipeline`] | End-to-end fetch and analysis |
//! | [`provider_policy`] | Per-provider quota and backoff |
//! | [`routing`] | Symbol classification and adapter order |
//! | [`source`] | Provider identifiers |
//! | [`throttling`] | Rate limiting support |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stockcast_core::AnalysisPipeline;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = AnalysisPipeline::builder().with_real_clients().build();
//!
//!     let analysis = pipeline.analyze("2330").await?;
//!     println!(
//!         "{} closed at {:.2} ({:+.2}%)",
//!         analysis.payload.symbol, analysis.metrics.last_close, analysis.metrics.pct_change
//!     );
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CLI / User     │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Analysis        │────▶│ Source Router    │
//! │ Pipeline        │     └──────────────────┘
//! └────────┬────────┘
//!          │              ┌──────────────────┐
//!          ├─────────────▶│ Fetch Cache      │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Price Source    │────▶│ Circuit Breaker  │
//! │ (Adapter Trait) │     │ Throttling Queue │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Normalizer      │────▶│ Derived Metrics  │
//! └─────────────────┘     └────────┬─────────┘
//!                                  │
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ Advisory Engine  │
//!                         └──────────────────┘
//! ```

pub mod adapters;
pub mod advisory;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod http_client;
pub mod metrics;
pub mod news;
pub mod normalizer;
pub mod pipeline;
pub mod provider_policy;
pub mod routing;
pub mod source;
pub mod throttling;

pub use adapters::{FinMindAdapter, TwseAdapter, YahooAdapter};
pub use advisory::{AdvisoryEngine, AdvisoryError, AdvisoryPayload, GeminiEngine};
pub use cache::{CacheConfig, CacheOrigin, Cached, EntryState, FetchCache};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{ConfigError, Credentials, PipelineConfig};
pub use data_source::{
    FetchResult, HealthState, HealthStatus, HistoryRequest, PriceSource, ProviderPayload,
    SourceError, SourceErrorKind,
};
pub use domain::{NormalizedBar, NormalizedSeries, Symbol, DOMESTIC_SUFFIXES, OTC_SUFFIX};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta, SCHEMA_VERSION};
pub use error::ValidationError;
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use metrics::{derive, moving_average, DerivedMetrics};
pub use news::{HeadlineSource, NoHeadlines, YahooNewsSidecar};
pub use normalizer::{normalize, FieldMap};
pub use pipeline::{
    Analysis, AnalysisPipeline, AnalysisPipelineBuilder, MarketSnapshot, PipelineError,
    RouteTrace, SourceSnapshot, Traced,
};
pub use provider_policy::{BackoffPolicy, ProviderPolicy, Quota};
pub use routing::{AmbiguousSymbolPolicy, RouterConfig, SourceRouter};
pub use source::ProviderId;
pub use throttling::ThrottlingQueue;
