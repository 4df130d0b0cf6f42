mod finmind;
mod twse;
mod yahoo;

pub use finmind::FinMindAdapter;
pub use twse::TwseAdapter;
pub use yahoo::YahooAdapter;
pub(crate) use yahoo::DEFAULT_BASE_URL as YAHOO_BASE_URL;

use std::time::Duration;

use crate::circuit_breaker::CircuitBreaker;
use crate::data_source::{HealthStatus, SourceError};
use crate::http_client::{HttpClient, HttpRequest, HttpResponse};
use crate::throttling::ThrottlingQueue;
use crate::ProviderId;

/// Runs one upstream call behind the provider's throttle and circuit breaker.
///
/// The throttle may hold the call back for up to the request's own timeout;
/// past that the call fails as `RateLimited` without reaching the upstream.
/// Only transport-level trouble (network errors, timeouts, 5xx) counts
/// against the breaker. 429 maps to `RateLimited`; any other status is
/// handed back for the adapter to interpret.
pub(crate) async fn guarded_call(
    provider: ProviderId,
    http_client: &dyn HttpClient,
    circuit_breaker: &CircuitBreaker,
    throttle: Option<&ThrottlingQueue>,
    request: HttpRequest,
) -> Result<HttpResponse, SourceError> {
    if let Some(throttle) = throttle {
        let max_wait = Duration::from_millis(request.timeout_ms);
        if let Err(wait) = throttle.acquire_within(max_wait).await {
            tracing::debug!(%provider, wait_ms = wait.as_millis() as u64, "throttled locally");
            return Err(SourceError::rate_limited(format!(
                "{provider} request budget exhausted; retry in {}s",
                wait.as_secs().max(1)
            )));
        }
    }

    if !circuit_breaker.allow_request() {
        return Err(SourceError::transport(format!(
            "{provider} circuit breaker is open; skipping upstream call"
        )));
    }

    tracing::debug!(%provider, url = %request.url, "upstream request");
    let response = match http_client.execute(request).await {
        Ok(response) => response,
        Err(error) => {
            circuit_breaker.record_failure();
            let what = if error.timed_out() { "timeout" } else { "transport error" };
            return Err(SourceError::transport(format!(
                "{provider} {what}: {}",
                error.message()
            )));
        }
    };

    if response.is_rate_limited() {
        return Err(SourceError::rate_limited(format!(
            "{provider} upstream returned status 429"
        )));
    }

    if response.status >= 500 {
        circuit_breaker.record_failure();
        return Err(SourceError::transport(format!(
            "{provider} upstream returned status {}",
            response.status
        )));
    }

    circuit_breaker.record_success();
    Ok(response)
}

pub(crate) fn health_of(
    circuit_breaker: &CircuitBreaker,
    throttle: Option<&ThrottlingQueue>,
) -> HealthStatus {
    let rate_available = throttle.map_or(true, |queue| queue.consecutive_rejections() == 0);
    HealthStatus::from_circuit(circuit_breaker.state(), rate_available)
}
