use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use time::{Date, Month};

use crate::adapters::{guarded_call, health_of};
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{
    FetchResult, HealthStatus, HistoryRequest, PriceSource, ProviderPayload, SourceError,
};
use crate::http_client::{HttpClient, HttpRequest, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::ThrottlingQueue;
use crate::ProviderId;

const DEFAULT_BASE_URL: &str = "https://www.twse.com.tw";
/// Exchange local time is UTC+8.
const TAIPEI_OFFSET_SECONDS: i32 = 8 * 3_600;

/// Taiwan Stock Exchange daily report adapter.
///
/// The `STOCK_DAY` report is month-granular, so a window crossing month
/// boundaries costs one request per calendar month. Rows come back as the
/// exchange publishes them (ROC dates, comma-grouped numbers under Chinese
/// headers); the normalizer owns the translation.
#[derive(Clone)]
pub struct TwseAdapter {
    http_client: Arc<dyn HttpClient>,
    circuit_breaker: Arc<CircuitBreaker>,
    throttle: Option<ThrottlingQueue>,
    base_url: String,
    timeout_ms: u64,
}

impl TwseAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_policy(http_client, &ProviderPolicy::twse_default())
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

    fn month_url(&self, stock_no: &str, year: i32, month: Month) -> String {
        format!(
            "{}/exchangeReport/STOCK_DAY?response=json&date={year:04}{:02}01&stockNo={}",
            self.base_url,
            u8::from(month),
            urlencoding::encode(stock_no)
        )
    }

    async fn fetch_month(
        &self,
        stock_no: &str,
        year: i32,
        month: Month,
    ) -> Result<Vec<Map<String, Value>>, SourceError> {
        let request =
            HttpRequest::get(self.month_url(stock_no, year, month)).with_timeout_ms(self.timeout_ms);
        let response = guarded_call(
            ProviderId::Twse,
            self.http_client.as_ref(),
            &self.circuit_breaker,
            self.throttle.as_ref(),
            request,
        )
        .await?;

        if !response.is_success() {
            return Err(SourceError::transport(format!(
                "twse upstream returned status {}",
                response.status
            )));
        }

        let report: StockDayResponse = serde_json::from_str(&response.body).map_err(|e| {
            SourceError::schema_mismatch(format!("failed to parse twse report: {e}"))
        })?;

        if report.stat != "OK" {
            tracing::debug!(stat = %report.stat, stock_no, year, month = u8::from(month), "twse month has no rows");
            return Ok(Vec::new());
        }

        Ok(report
            .data
            .into_iter()
            .map(|row| {
                report
                    .fields
                    .iter()
                    .cloned()
                    .zip(row)
                    .collect::<Map<String, Value>>()
            })
            .collect())
    }
}

impl PriceSource for TwseAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Twse
    }

    fn fetch<'a>(
        &'a self,
        req: HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = FetchResult<ProviderPayload>> + Send + 'a>> {
        Box::pin(async move {
            let stock_no = req.symbol.base().to_owned();
            if !stock_no.chars().all(|ch| ch.is_ascii_alphanumeric()) {
                return FetchResult::Failure(SourceError::invalid_request(format!(
                    "'{}' is not an exchange stock number",
                    req.symbol
                )));
            }

            let mut records = Vec::new();
            for (year, month) in months_between(req.start, req.end) {
                match self.fetch_month(&stock_no, year, month).await {
                    Ok(rows) => records.extend(rows),
                    Err(error) => return FetchResult::Failure(error),
                }
            }

            if records.is_empty() {
                return FetchResult::Empty;
            }

            FetchResult::Success(
                ProviderPayload::new(ProviderId::Twse, req.symbol, records)
                    .with_utc_offset(TAIPEI_OFFSET_SECONDS),
            )
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { health_of(&self.circuit_breaker, self.throttle.as_ref()) })
    }
}

/// Calendar months touched by the inclusive window, oldest first.
fn months_between(start: Date, end: Date) -> Vec<(i32, Month)> {
    let mut months = Vec::new();
    let (mut year, mut month) = (start.year(), start.month());

    while (year, u8::from(month)) <= (end.year(), u8::from(end.month())) {
        months.push((year, month));
        if month == Month::December {
            year += 1;
        }
        month = month.next();
    }

    months
}

#[derive(Debug, Deserialize)]
struct StockDayResponse {
    stat: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    data: Vec<Vec<Value>>,
}
