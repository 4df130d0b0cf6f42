use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use time::{Date, Duration, Time};

use crate::adapters::{guarded_call, health_of};
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{
    FetchResult, HealthStatus, HistoryRequest, PriceSource, ProviderPayload, SourceError,
};
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::ThrottlingQueue;
use crate::ProviderId;

pub(crate) const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart adapter for everything outside the regional market.
///
/// Bars arrive as parallel arrays keyed by epoch-second timestamps; the
/// adapter pivots them into one record per timestamp and carries the
/// exchange's `gmtoffset` so the normalizer can recover the trading date.
#[derive(Clone)]
pub struct YahooAdapter {
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    throttle: Option<ThrottlingQueue>,
    base_url: String,
    timeout_ms: u64,
}

impl YahooAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_policy(http_client, &ProviderPolicy::yahoo_default())
    }

    pub fn with_policy(http_client: Arc<dyn HttpClient>, policy: &ProviderPolicy) -> Self {
        Self {
            http_client,
            circuit_breaker: Arc::new(CircuitBreaker::new(policy.breaker)),
            throttle: ThrottlingQueue::from_policy(policy),
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn chart_request(&self, req: &HistoryRequest) -> HttpRequest {
        let period1 = epoch_seconds(req.start);
        let period2 = epoch_seconds(req.end.saturating_add(Duration::days(1)));

        HttpRequest::get(format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            urlencoding::encode(&req.symbol.aggregator_ticker())
        ))
        .with_query("period1", &period1.to_string())
        .with_query("period2", &period2.to_string())
        .with_query("interval", "1d")
        .with_query("events", "history")
        .with_header("referer", "https://finance.yahoo.com/")
        .with_timeout_ms(self.timeout_ms)
    }

    async fn fetch_chart(&self, req: HistoryRequest) -> FetchResult<ProviderPayload> {
        let response = match guarded_call(
            ProviderId::Yahoo,
            self.http_client.as_ref(),
            &self.circuit_breaker,
            self.throttle.as_ref(),
            self.chart_request(&req),
        )
        .await
        {
            Ok(response) => response,
            Err(error) => return FetchResult::Failure(error),
        };

        let chart = match serde_json::from_str::<ChartResponse>(&response.body) {
            Ok(parsed) => parsed.chart,
            Err(_) if !response.is_success() => {
                return FetchResult::Failure(SourceError::transport(format!(
                    "yahoo upstream returned status {}",
                    response.status
                )));
            }
            Err(e) => {
                return FetchResult::Failure(SourceError::schema_mismatch(format!(
                    "failed to parse yahoo chart: {e}"
                )));
            }
        };

        if let Some(error) = chart.error {
            if error.code.eq_ignore_ascii_case("Not Found") {
                tracing::debug!(symbol = %req.symbol, "yahoo has no chart for symbol");
                return FetchResult::Empty;
            }
            return FetchResult::Failure(SourceError::schema_mismatch(format!(
                "yahoo chart error {}: {}",
                error.code, error.description
            )));
        }

        if !response.is_success() {
            return FetchResult::Failure(SourceError::transport(format!(
                "yahoo upstream returned status {}",
                response.status
            )));
        }

        let Some(result) = chart.result.and_then(|results| results.into_iter().next()) else {
            return FetchResult::Empty;
        };

        let records = pivot(&result);
        if records.is_empty() {
            return FetchResult::Empty;
        }

        FetchResult::Success(
            ProviderPayload::new(ProviderId::Yahoo, req.symbol, records)
                .with_utc_offset(result.meta.gmtoffset),
        )
    }
}

impl PriceSource for YahooAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Yahoo
    }

    fn fetch<'a>(
        &'a self,
        req: HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = FetchResult<ProviderPayload>> + Send + 'a>> {
        Box::pin(self.fetch_chart(req))
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { health_of(&self.circuit_breaker, self.throttle.as_ref()) })
    }
}

fn epoch_seconds(date: Date) -> i64 {
    date.with_time(Time::MIDNIGHT).assume_utc().unix_timestamp()
}

/// One record per timestamp; missing cells become JSON null.
fn pivot(result: &ChartResult) -> Vec<Map<String, Value>> {
    let quote = result.indicators.quote.first();
    let cell = |series: Option<&Vec<Option<f64>>>, index: usize| -> Value {
        series
            .and_then(|values| values.get(index).copied().flatten())
            .map_or(Value::Null, Value::from)
    };

    result
        .timestamp
        .iter()
        .enumerate()
        .map(|(index, timestamp)| {
            let record = json!({
                "timestamp": timestamp,
                "open": cell(quote.map(|q| &q.open), index),
                "high": cell(quote.map(|q| &q.high), index),
                "low": cell(quote.map(|q| &q.low), index),
                "close": cell(quote.map(|q| &q.close), index),
                "volume": cell(quote.map(|q| &q.volume), index),
            });
            match record {
                Value::Object(map) => map,
                _ => Map::new(),
            }
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}
