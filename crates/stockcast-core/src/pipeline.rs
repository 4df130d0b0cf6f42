//! Symbol → route → adapter chain → normalize → cache → metrics.
//!
//! [`AnalysisPipeline`] owns the adapter registry and the fetch cache. The
//! adapter chain is walked inside the cache's fetch closure, so concurrent
//! requests for the same listing share one walk.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::adapters::{FinMindAdapter, TwseAdapter, YahooAdapter};
use crate::advisory::{AdvisoryEngine, AdvisoryError, AdvisoryPayload, GeminiEngine};
use crate::cache::{CacheOrigin, FetchCache};
use crate::config::{Credentials, PipelineConfig};
use crate::data_source::{
    FetchResult, HealthState, HealthStatus, HistoryRequest, PriceSource, SourceError,
    SourceErrorKind,
};
use crate::envelope::EnvelopeError;
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::metrics::{self, DerivedMetrics};
use crate::news::{HeadlineSource, NoHeadlines, YahooNewsSidecar};
use crate::normalizer::normalize;
use crate::routing::SourceRouter;
use crate::{NormalizedSeries, ProviderId, Symbol, ValidationError};

/// Cached outcome of one successful chain walk.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: Symbol,
    /// Provider whose payload produced the series.
    pub source: ProviderId,
    pub series: Arc<NormalizedSeries>,
    pub headlines: Vec<String>,
}

/// How a fetch was served.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteTrace {
    pub source_chain: Vec<ProviderId>,
    pub errors: Vec<EnvelopeError>,
    pub warnings: Vec<String>,
    pub latency_ms: u64,
    pub cache_hit: bool,
}

/// A value plus the trace of how it was obtained.
#[derive(Debug, Clone)]
pub struct Traced<T> {
    pub value: T,
    pub trace: RouteTrace,
}

/// Metrics and advisory payload for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub snapshot: MarketSnapshot,
    pub metrics: DerivedMetrics,
    pub payload: AdvisoryPayload,
}

/// Consolidated pipeline failure.
///
/// Every `Empty` or `Failure` collapses into one of two user-facing
/// messages, see [`PipelineError::user_message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidSymbol(#[from] ValidationError),
    #[error("no data for this symbol ({symbol})")]
    NoData {
        symbol: String,
        cause: Option<SourceError>,
    },
    #[error("temporary provider outage, retry later ({cause})")]
    Outage { symbol: String, cause: SourceError },
}

impl PipelineError {
    pub const NO_DATA: &'static str = "no data for this symbol";
    pub const OUTAGE: &'static str = "temporary provider outage, retry later";

    pub fn from_failure(symbol: &Symbol, cause: SourceError) -> Self {
        match cause.kind() {
            SourceErrorKind::InsufficientData | SourceErrorKind::InvalidRequest => Self::NoData {
                symbol: symbol.to_string(),
                cause: Some(cause),
            },
            SourceErrorKind::Transport
            | SourceErrorKind::RateLimited
            | SourceErrorKind::SchemaMismatch
            | SourceErrorKind::AdapterNotRegistered => Self::Outage {
                symbol: symbol.to_string(),
                cause,
            },
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidSymbol(error) => error.to_string(),
            Self::NoData { .. } => String::from(Self::NO_DATA),
            Self::Outage { .. } => String::from(Self::OUTAGE),
        }
    }

    pub fn cause(&self) -> Option<&SourceError> {
        match self {
            Self::InvalidSymbol(_) => None,
            Self::NoData { cause, .. } => cause.as_ref(),
            Self::Outage { cause, .. } => Some(cause),
        }
    }

    /// Stable code for envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSymbol(_) => "pipeline.invalid_symbol",
            Self::NoData { .. } => "pipeline.no_data",
            Self::Outage { .. } => "pipeline.outage",
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Self::Outage { .. })
    }
}

/// Registered adapter with its current health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceSnapshot {
    pub id: ProviderId,
    pub health: HealthStatus,
}

impl SourceSnapshot {
    pub fn available(self) -> bool {
        self.health.state != HealthState::Unhealthy
    }

    pub fn status_label(self) -> &'static str {
        self.health.label()
    }
}

pub struct AnalysisPipeline {
    adapters: HashMap<ProviderId, Arc<dyn PriceSource>>,
    router: SourceRouter,
    cache: FetchCache<MarketSnapshot>,
    headlines: Arc<dyn HeadlineSource>,
    advisor: Option<Arc<dyn AdvisoryEngine>>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn builder() -> AnalysisPipelineBuilder {
        AnalysisPipelineBuilder::new()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn router(&self) -> &SourceRouter {
        &self.router
    }

    pub fn cache(&self) -> &FetchCache<MarketSnapshot> {
        &self.cache
    }

    /// Engine configured at build time, if any.
    pub fn advisor(&self) -> Option<&dyn AdvisoryEngine> {
        self.advisor.as_deref()
    }

    /// Fetches through the cache. An unparsable symbol is an
    /// `InvalidRequest` failure.
    pub async fn fetch(&self, raw_symbol: &str) -> FetchResult<MarketSnapshot> {
        match self.fetch_traced(raw_symbol).await {
            Ok(traced) => traced.value,
            Err(error) => FetchResult::Failure(SourceError::invalid_request(error.to_string())),
        }
    }

    pub async fn fetch_traced(
        &self,
        raw_symbol: &str,
    ) -> Result<Traced<FetchResult<MarketSnapshot>>, ValidationError> {
        let symbol = Symbol::parse(raw_symbol)?;
        Ok(self.fetch_symbol(&symbol).await)
    }

    pub async fn analyze(&self, raw_symbol: &str) -> Result<Analysis, PipelineError> {
        self.analyze_traced(raw_symbol).await?.value
    }

    pub async fn analyze_traced(
        &self,
        raw_symbol: &str,
    ) -> Result<Traced<Result<Analysis, PipelineError>>, ValidationError> {
        let symbol = Symbol::parse(raw_symbol)?;
        let Traced { value, trace } = self.fetch_symbol(&symbol).await;

        Ok(Traced {
            value: self.analysis_of(&symbol, value),
            trace,
        })
    }

    /// Hands the payload to `engine`. A failure here leaves `analysis` intact.
    pub async fn advise(
        &self,
        analysis: &Analysis,
        engine: &dyn AdvisoryEngine,
    ) -> Result<String, AdvisoryError> {
        let result = engine.advise(&analysis.payload).await;
        if let Err(error) = &result {
            tracing::warn!(symbol = %analysis.payload.symbol, %error, "advisory request failed");
        }
        result
    }

    /// Health of every registered adapter, in provider order.
    pub async fn sources(&self) -> Vec<SourceSnapshot> {
        let mut snapshots = Vec::with_capacity(self.adapters.len());
        for id in ProviderId::ALL {
            if let Some(adapter) = self.adapters.get(&id) {
                snapshots.push(SourceSnapshot {
                    id,
                    health: adapter.health().await,
                });
            }
        }
        snapshots
    }

    async fn fetch_symbol(&self, symbol: &Symbol) -> Traced<FetchResult<MarketSnapshot>> {
        let started = Instant::now();
        let chain = self.router.route_symbol(symbol);
        let key = self.router.cache_key(symbol);

        let mut walk = ChainWalk::default();
        let cached = self
            .cache
            .lookup(&key, || self.walk_chain(symbol, &chain, &mut walk))
            .await;

        let latency_ms = elapsed_ms(started);
        let trace = match cached.origin {
            CacheOrigin::Fetched => walk.into_trace(latency_ms),
            CacheOrigin::Hit | CacheOrigin::Coalesced => {
                cached_trace(&cached.result, &chain, latency_ms)
            }
        };

        Traced {
            value: cached.result,
            trace,
        }
    }

    async fn walk_chain(
        &self,
        symbol: &Symbol,
        chain: &[ProviderId],
        walk: &mut ChainWalk,
    ) -> FetchResult<MarketSnapshot> {
        let days = self
            .config
            .lookback_days(self.router.is_domestic(symbol));
        let request = HistoryRequest::trailing(symbol.clone(), days);
        let mut last_failure = None;

        for &provider in chain {
            walk.source_chain.push(provider);

            let Some(adapter) = self.adapters.get(&provider) else {
                let error = SourceError::adapter_not_registered(provider);
                walk.record(provider, &error);
                last_failure = Some(error);
                continue;
            };

            if adapter.health().await.state == HealthState::Unhealthy {
                let error = SourceError::transport(format!(
                    "{provider} reported unhealthy; skipped"
                ));
                walk.record(provider, &error);
                last_failure = Some(error);
                continue;
            }

            let outcome =
                match tokio::time::timeout(self.config.fetch_timeout, adapter.fetch(request.clone()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => FetchResult::Failure(SourceError::transport(format!(
                        "{provider} did not answer within {} ms",
                        duration_ms(self.config.fetch_timeout)
                    ))),
                };

            let error = match outcome {
                FetchResult::Success(payload) => match normalize(&payload) {
                    Ok(series) if !series.is_empty() => {
                        if !walk.errors.is_empty() {
                            walk.warnings.push(format!(
                                "source fallback succeeded with '{provider}' after {} failed attempt(s)",
                                walk.errors.len()
                            ));
                        }
                        tracing::info!(%symbol, %provider, bars = series.len(), "series fetched");

                        let headlines = self.headlines_for(symbol).await;
                        return FetchResult::Success(MarketSnapshot {
                            symbol: symbol.clone(),
                            source: provider,
                            series: Arc::new(series),
                            headlines,
                        });
                    }
                    Ok(_) => {
                        tracing::debug!(%symbol, %provider, "no usable rows after normalization");
                        continue;
                    }
                    Err(error) => error,
                },
                FetchResult::Empty => {
                    tracing::debug!(%symbol, %provider, "provider has no rows");
                    continue;
                }
                FetchResult::Failure(error) => error,
            };

            walk.record(provider, &error);
            last_failure = Some(error);
        }

        match last_failure {
            Some(error) => {
                walk.warnings
                    .push(format!("all sources failed for '{symbol}'"));
                FetchResult::Failure(error)
            }
            None => FetchResult::Empty,
        }
    }

    async fn headlines_for(&self, symbol: &Symbol) -> Vec<String> {
        let limit = self.config.headline_limit;
        if limit == 0 {
            return Vec::new();
        }

        match tokio::time::timeout(self.config.fetch_timeout, self.headlines.headlines(symbol, limit))
            .await
        {
            Ok(mut titles) => {
                titles.truncate(limit);
                titles
            }
            Err(_) => {
                tracing::debug!(%symbol, "headline lookup timed out");
                Vec::new()
            }
        }
    }

    fn analysis_of(
        &self,
        symbol: &Symbol,
        result: FetchResult<MarketSnapshot>,
    ) -> Result<Analysis, PipelineError> {
        let snapshot = match result {
            FetchResult::Success(snapshot) => snapshot,
            FetchResult::Empty => {
                return Err(PipelineError::NoData {
                    symbol: symbol.to_string(),
                    cause: None,
                })
            }
            FetchResult::Failure(error) => return Err(PipelineError::from_failure(symbol, error)),
        };

        let metrics = metrics::derive(&snapshot.series, self.config.ma_window)
            .map_err(|error| PipelineError::from_failure(symbol, error))?;
        let payload = AdvisoryPayload::new(symbol, &metrics, snapshot.headlines.clone());

        Ok(Analysis {
            snapshot,
            metrics,
            payload,
        })
    }
}

/// Attempts made during one chain walk.
#[derive(Debug, Default)]
struct ChainWalk {
    source_chain: Vec<ProviderId>,
    errors: Vec<EnvelopeError>,
    warnings: Vec<String>,
}

impl ChainWalk {
    fn record(&mut self, provider: ProviderId, error: &SourceError) {
        tracing::warn!(
            %provider,
            code = error.code(),
            detail = error.message(),
            "source attempt failed"
        );
        self.errors
            .push(EnvelopeError::from_source_error(error).with_source(provider));
    }

    fn into_trace(self, latency_ms: u64) -> RouteTrace {
        RouteTrace {
            source_chain: self.source_chain,
            errors: self.errors,
            warnings: self.warnings,
            latency_ms,
            cache_hit: false,
        }
    }
}

fn cached_trace(
    result: &FetchResult<MarketSnapshot>,
    chain: &[ProviderId],
    latency_ms: u64,
) -> RouteTrace {
    let source_chain = match result {
        FetchResult::Success(snapshot) => vec![snapshot.source],
        FetchResult::Empty | FetchResult::Failure(_) => chain.to_vec(),
    };

    RouteTrace {
        source_chain,
        errors: result
            .error()
            .map(EnvelopeError::from_source_error)
            .into_iter()
            .collect(),
        warnings: Vec::new(),
        latency_ms,
        cache_hit: true,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    duration_ms(started.elapsed())
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Builder for [`AnalysisPipeline`].
///
/// With an HTTP client (either [`with_http_client`](Self::with_http_client)
/// or [`with_real_clients`](Self::with_real_clients)) all three adapters,
/// the Yahoo news sidecar and, when a key is present, the Gemini engine are
/// created on it. Explicit [`with_adapter`](Self::with_adapter) calls
/// replace the adapter with the same id.
///
/// # Environment Variables
///
/// | Credential | Primary Env Var | Fallback Env Var |
/// |------------|----------------|------------------|
/// | FinMind token | `STOCKCAST_FINMIND_TOKEN` | `FINMIND_TOKEN` |
/// | Gemini key | `STOCKCAST_GEMINI_API_KEY` | `GEMINI_API_KEY` |
/// | Gemini model | `STOCKCAST_GEMINI_MODEL` | - |
///
/// # Example
///
/// ```rust,ignore
/// use stockcast_core::{AnalysisPipeline, PipelineConfig};
///
/// let pipeline = AnalysisPipeline::builder()
///     .with_config(PipelineConfig::from_env()?)
///     .with_real_clients()
///     .build();
/// let analysis = pipeline.analyze("2330").await?;
/// ```
#[derive(Default)]
pub struct AnalysisPipelineBuilder {
    config: PipelineConfig,
    credentials: Credentials,
    http_client: Option<Arc<dyn HttpClient>>,
    adapters: Vec<Arc<dyn PriceSource>>,
    headlines: Option<Arc<dyn HeadlineSource>>,
    advisor: Option<Arc<dyn AdvisoryEngine>>,
}

impl AnalysisPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses reqwest and reads credentials from the environment.
    pub fn with_real_clients(mut self) -> Self {
        self.credentials = Credentials::from_env();
        if self.http_client.is_none() {
            self.http_client = Some(Arc::new(ReqwestHttpClient::new()));
        }
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn PriceSource>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_headlines(mut self, headlines: Arc<dyn HeadlineSource>) -> Self {
        self.headlines = Some(headlines);
        self
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn AdvisoryEngine>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn build(self) -> AnalysisPipeline {
        let Self {
            config,
            credentials,
            http_client,
            adapters: overrides,
            mut headlines,
            mut advisor,
        } = self;

        let mut adapters: HashMap<ProviderId, Arc<dyn PriceSource>> = HashMap::new();

        if let Some(http_client) = http_client {
            let timeout_ms = duration_ms(config.fetch_timeout);

            adapters.insert(
                ProviderId::Twse,
                Arc::new(TwseAdapter::new(Arc::clone(&http_client)).with_timeout_ms(timeout_ms)),
            );
            adapters.insert(
                ProviderId::Yahoo,
                Arc::new(YahooAdapter::new(Arc::clone(&http_client)).with_timeout_ms(timeout_ms)),
            );

            let mut finmind =
                FinMindAdapter::new(Arc::clone(&http_client)).with_timeout_ms(timeout_ms);
            if let Some(token) = &credentials.finmind_token {
                finmind = finmind.with_token(token.clone());
            }
            adapters.insert(ProviderId::Finmind, Arc::new(finmind));

            if headlines.is_none() {
                headlines = Some(Arc::new(
                    YahooNewsSidecar::new(Arc::clone(&http_client)).with_timeout(config.fetch_timeout),
                ));
            }

            if advisor.is_none() {
                if let Some(api_key) = &credentials.gemini_api_key {
                    let mut engine = GeminiEngine::new(Arc::clone(&http_client), api_key.clone());
                    if let Some(model) = &credentials.gemini_model {
                        engine = engine.with_model(model.clone());
                    }
                    advisor = Some(Arc::new(engine));
                }
            }
        }

        for adapter in overrides {
            adapters.insert(adapter.id(), adapter);
        }

        AnalysisPipeline {
            adapters,
            router: SourceRouter::new(config.router.clone()),
            cache: FetchCache::new(config.cache),
            headlines: headlines.unwrap_or_else(|| Arc::new(NoHeadlines)),
            advisor,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::RecordingHttpClient;
    use crate::data_source::ProviderPayload;
    use crate::routing::RouterConfig;
    use serde_json::{json, Map, Value};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        id: ProviderId,
        outcome: FetchResult<Vec<Map<String, Value>>>,
        health: HealthStatus,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(id: ProviderId, outcome: FetchResult<Vec<Map<String, Value>>>) -> Arc<Self> {
            Arc::new(Self {
                id,
                outcome,
                health: HealthStatus::healthy(),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PriceSource for StubSource {
        fn id(&self) -> ProviderId {
            self.id
        }

        fn fetch<'a>(
            &'a self,
            req: HistoryRequest,
        ) -> Pin<Box<dyn Future<Output = FetchResult<ProviderPayload>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .outcome
                .clone()
                .map(|records| ProviderPayload::new(self.id, req.symbol, records));
            Box::pin(async move { outcome })
        }

        fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
            let health = self.health;
            Box::pin(async move { health })
        }
    }

    /// Rows readable by every provider's field map.
    fn rows(closes: &[f64]) -> Vec<Map<String, Value>> {
        closes
            .iter()
            .enumerate()
            .map(|(day, close)| {
                let row = json!({
                    "date": format!("2024-01-{:02}", day + 1),
                    "open": close, "high": close, "low": close, "close": close,
                    "max": close, "min": close,
                    "volume": 1000, "Trading_Volume": 1000
                });
                match row {
                    Value::Object(map) => map,
                    _ => Map::new(),
                }
            })
            .collect()
    }

    fn fallback_config() -> PipelineConfig {
        PipelineConfig {
            router: RouterConfig {
                domestic_fallback: true,
                ..RouterConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_domestic_source() {
        let twse = StubSource::new(
            ProviderId::Twse,
            FetchResult::Failure(SourceError::transport("connection reset")),
        );
        let finmind = StubSource::new(
            ProviderId::Finmind,
            FetchResult::Success(rows(&[10.0, 11.0, 12.0])),
        );
        let pipeline = AnalysisPipeline::builder()
            .with_config(fallback_config())
            .with_adapter(twse.clone())
            .with_adapter(finmind.clone())
            .build();

        let traced = pipeline.fetch_traced("2330").await.expect("valid symbol");

        let snapshot = traced.value.success().expect("fallback succeeds");
        assert_eq!(snapshot.source, ProviderId::Finmind);
        assert_eq!(snapshot.series.len(), 3);
        assert_eq!(
            traced.trace.source_chain,
            vec![ProviderId::Twse, ProviderId::Finmind]
        );
        assert_eq!(traced.trace.errors.len(), 1);
        assert_eq!(traced.trace.errors[0].source, Some(ProviderId::Twse));
        assert_eq!(traced.trace.warnings.len(), 1);
        assert!(!traced.trace.cache_hit);
    }

    #[tokio::test]
    async fn all_empty_is_empty_and_failure_wins_over_empty() {
        let pipeline = AnalysisPipeline::builder()
            .with_config(fallback_config())
            .with_adapter(StubSource::new(ProviderId::Twse, FetchResult::Empty))
            .with_adapter(StubSource::new(ProviderId::Finmind, FetchResult::Empty))
            .build();
        assert_eq!(pipeline.fetch("2330").await, FetchResult::Empty);

        let pipeline = AnalysisPipeline::builder()
            .with_config(fallback_config())
            .with_adapter(StubSource::new(
                ProviderId::Twse,
                FetchResult::Failure(SourceError::rate_limited("429")),
            ))
            .with_adapter(StubSource::new(ProviderId::Finmind, FetchResult::Empty))
            .build();
        let result = pipeline.fetch("2330").await;
        assert_eq!(
            result.error().map(SourceError::kind),
            Some(SourceErrorKind::RateLimited)
        );
    }

    #[tokio::test]
    async fn unhealthy_adapter_is_skipped_without_a_call() {
        let twse = Arc::new(StubSource {
            id: ProviderId::Twse,
            outcome: FetchResult::Success(rows(&[1.0])),
            health: HealthStatus::new(HealthState::Unhealthy, true),
            calls: AtomicUsize::new(0),
        });
        let pipeline = AnalysisPipeline::builder().with_adapter(twse.clone()).build();

        let result = pipeline.fetch("2330").await;

        assert_eq!(twse.calls(), 0);
        assert_eq!(
            result.error().map(SourceError::kind),
            Some(SourceErrorKind::Transport)
        );
    }

    #[tokio::test]
    async fn unregistered_adapter_is_reported() {
        let pipeline = AnalysisPipeline::builder().build();

        let traced = pipeline.fetch_traced("AAPL").await.expect("valid symbol");

        assert_eq!(
            traced.value.error().map(SourceError::kind),
            Some(SourceErrorKind::AdapterNotRegistered)
        );
        assert_eq!(traced.trace.errors[0].code, "source.adapter_not_registered");
    }

    #[tokio::test]
    async fn second_fetch_is_a_cache_hit_across_spellings() {
        let twse = StubSource::new(
            ProviderId::Twse,
            FetchResult::Success(rows(&[10.0, 11.0])),
        );
        let pipeline = AnalysisPipeline::builder().with_adapter(twse.clone()).build();

        pipeline.fetch("2330").await;
        let traced = pipeline.fetch_traced("2330.tw").await.expect("valid symbol");

        assert_eq!(twse.calls(), 1);
        assert!(traced.trace.cache_hit);
        assert_eq!(traced.trace.source_chain, vec![ProviderId::Twse]);
    }

    #[tokio::test]
    async fn analyze_maps_outcomes_to_user_messages() {
        let pipeline = AnalysisPipeline::builder()
            .with_adapter(StubSource::new(ProviderId::Twse, FetchResult::Empty))
            .with_adapter(StubSource::new(
                ProviderId::Yahoo,
                FetchResult::Failure(SourceError::transport("timeout")),
            ))
            .build();

        let empty = pipeline.analyze("2330").await.expect_err("no rows");
        assert_eq!(empty.user_message(), PipelineError::NO_DATA);

        let outage = pipeline.analyze("AAPL").await.expect_err("transport failure");
        assert_eq!(outage.user_message(), PipelineError::OUTAGE);
        assert!(outage.retryable());

        let invalid = pipeline.analyze("").await.expect_err("empty symbol");
        assert!(matches!(invalid, PipelineError::InvalidSymbol(_)));
    }

    #[tokio::test]
    async fn single_bar_is_no_data_not_outage() {
        let pipeline = AnalysisPipeline::builder()
            .with_adapter(StubSource::new(
                ProviderId::Twse,
                FetchResult::Success(rows(&[42.0])),
            ))
            .build();

        let err = pipeline.analyze("2330").await.expect_err("one bar");
        assert_eq!(
            err.cause().map(SourceError::kind),
            Some(SourceErrorKind::InsufficientData)
        );
        assert_eq!(err.user_message(), PipelineError::NO_DATA);
    }

    #[tokio::test]
    async fn builder_wires_default_adapters_on_a_shared_client() {
        let client = Arc::new(RecordingHttpClient::json(200, "{}"));
        let pipeline = AnalysisPipeline::builder()
            .with_http_client(client)
            .with_credentials(Credentials {
                gemini_api_key: Some(String::from("key")),
                ..Credentials::default()
            })
            .build();

        let ids = pipeline
            .sources()
            .await
            .into_iter()
            .map(|snapshot| snapshot.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, ProviderId::ALL.to_vec());
        assert!(pipeline.advisor().is_some());
    }
}
