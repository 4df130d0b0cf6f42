use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use time::macros::format_description;

use crate::adapters::{guarded_call, health_of};
use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{
    FetchResult, HealthStatus, HistoryRequest, PriceSource, ProviderPayload, SourceError,
};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, DEFAULT_REQUEST_TIMEOUT_MS};
use crate::provider_policy::ProviderPolicy;
use crate::throttling::ThrottlingQueue;
use crate::ProviderId;

const DEFAULT_BASE_URL: &str = "https://api.finmindtrade.com";
const PRICE_DATASET: &str = "TaiwanStockPrice";
const TAIPEI_OFFSET_SECONDS: i32 = 8 * 3_600;

/// FinMind community API adapter, used as the regional fallback.
///
/// Works anonymously under a tighter quota; a token raises the limit.
#[derive(Clone)]
pub struct FinMindAdapter {
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
    circuit_breaker: Arc<CircuitBreaker>,
    throttle: Option<ThrottlingQueue>,
    base_url: String,
    timeout_ms: u64,
}

impl FinMindAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_policy(http_client, &ProviderPolicy::finmind_default())
    }

    pub fn with_policy(http_client: Arc<dyn HttpClient>, policy: &ProviderPolicy) -> Self {
        Self {
            http_client,
            auth: HttpAuth::None,
            circuit_breaker: Arc::new(CircuitBreaker::new(policy.breaker)),
            throttle: ThrottlingQueue::from_policy(policy),
            base_url: String::from(DEFAULT_BASE_URL),
            timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth = HttpAuth::BearerToken(token.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn data_request(&self, req: &HistoryRequest) -> Result<HttpRequest, SourceError> {
        let iso = format_description!("[year]-[month]-[day]");
        let start = req
            .start
            .format(&iso)
            .map_err(|e| SourceError::invalid_request(format!("invalid start date: {e}")))?;
        let end = req
            .end
            .format(&iso)
            .map_err(|e| SourceError::invalid_request(format!("invalid end date: {e}")))?;

        Ok(HttpRequest::get(format!("{}/api/v4/data", self.base_url))
            .with_query("dataset", PRICE_DATASET)
            .with_query("data_id", req.symbol.base())
            .with_query("start_date", &start)
            .with_query("end_date", &end)
            .with_auth(&self.auth)
            .with_timeout_ms(self.timeout_ms))
    }

    async fn fetch_prices(&self, req: HistoryRequest) -> FetchResult<ProviderPayload> {
        let request = match self.data_request(&req) {
            Ok(request) => request,
            Err(error) => return FetchResult::Failure(error),
        };

        let response = match guarded_call(
            ProviderId::Finmind,
            self.http_client.as_ref(),
            &self.circuit_breaker,
            self.throttle.as_ref(),
            request,
        )
        .await
        {
            Ok(response) => response,
            Err(error) => return FetchResult::Failure(error),
        };

        let body = match serde_json::from_str::<DataResponse>(&response.body) {
            Ok(body) => body,
            Err(_) if !response.is_success() => {
                return FetchResult::Failure(status_error(response.status, "unparseable body"));
            }
            Err(e) => {
                return FetchResult::Failure(SourceError::schema_mismatch(format!(
                    "failed to parse finmind response: {e}"
                )));
            }
        };

        // The API reports quota exhaustion in-band as status 402.
        let status = body.status.unwrap_or(response.status);
        if status != 200 {
            return FetchResult::Failure(status_error(status, &body.msg));
        }

        if body.data.is_empty() {
            return FetchResult::Empty;
        }

        FetchResult::Success(
            ProviderPayload::new(ProviderId::Finmind, req.symbol, body.data)
                .with_utc_offset(TAIPEI_OFFSET_SECONDS),
        )
    }
}

impl PriceSource for FinMindAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Finmind
    }

    fn fetch<'a>(
        &'a self,
        req: HistoryRequest,
    ) -> Pin<Box<dyn Future<Output = FetchResult<ProviderPayload>> + Send + 'a>> {
        Box::pin(self.fetch_prices(req))
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { health_of(&self.circuit_breaker, self.throttle.as_ref()) })
    }
}

fn status_error(status: u16, message: &str) -> SourceError {
    let upper_limit = message.to_ascii_lowercase().contains("upper limit");
    if status == 402 || status == 429 || upper_limit {
        SourceError::rate_limited(format!("finmind quota exhausted: {message}"))
    } else if status == 400 || status == 422 {
        SourceError::invalid_request(format!("finmind rejected request ({status}): {message}"))
    } else {
        SourceError::transport(format!("finmind returned status {status}: {message}"))
    }
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    msg: String,
    #[serde(default)]
    status: Option<u16>,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
}
