use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use stockcast_core::{
    normalize, AnalysisPipeline, FetchResult, FinMindAdapter, HistoryRequest, HttpClient, HttpError, HttpRequest,
    HttpResponse, PriceSource, ProviderId, ProviderPolicy, SourceErrorKind, Symbol, TwseAdapter,
    YahooAdapter,
};
use time::{Date, Month};

const TWSE_REPORT: &str = r#"{
    "stat": "OK",
    "fields": ["日期","成交股數","成交金額","開盤價","最高價","最低價","收盤價","漲跌價差","成交筆數"],
    "data": [
        ["113/01/03","37,106,763","21,616,562,897","584.00","585.00","576.00","578.00","-15.00","58,279"],
        ["113/01/02","26,059,058","15,326,425,951","590.00","593.00","589.00","593.00","+0.00","24,120"]
    ]
}"#;

const YAHOO_CHART: &str = r#"{
    "chart": {
        "result": [{
            "meta": {"symbol": "AAPL", "gmtoffset": -18000},
            "timestamp": [1704205800, 1704292200],
            "indicators": {"quote": [{
                "open": [187.15, 184.22],
                "high": [188.44, 185.88],
                "low": [183.89, 183.43],
                "close": [185.64, 184.25],
                "volume": [82488700, 58414500]
            }]}
        }],
        "error": null
    }
}"#;

const FINMIND_PRICES: &str = r#"{
    "msg": "success",
    "status": 200,
    "data": [
        {"date":"2024-01-02","stock_id":"2330","Trading_Volume":26059058,"open":590.0,"max":593.0,"min":589.0,"close":593.0},
        {"date":"2024-01-03","stock_id":"2330","Trading_Volume":37106763,"open":584.0,"max":585.0,"min":576.0,"close":578.0}
    ]
}"#;

const TWSE_NO_ROWS: &str = r#"{"stat":"很抱歉，沒有符合條件的資料!"}"#;
const YAHOO_NOT_FOUND: &str = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
const FINMIND_NO_ROWS: &str = r#"{"msg":"success","status":200,"data":[]}"#;

/// Answers every request with the same canned outcome and keeps the URLs.
struct CannedHttpClient {
    outcome: Result<HttpResponse, HttpError>,
    urls: Mutex<Vec<String>>,
}

impl CannedHttpClient {
    fn respond(status: u16, body: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(HttpResponse::new(status, body)),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn fail(error: HttpError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().expect("url log should not be poisoned").clone()
    }
}

impl HttpClient for CannedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.urls
            .lock()
            .expect("url log should not be poisoned")
            .push(request.url);
        let outcome = self.outcome.clone();
        Box::pin(async move { outcome })
    }
}

fn unthrottled(provider: ProviderId) -> ProviderPolicy {
    ProviderPolicy {
        quota: None,
        ..ProviderPolicy::default_for(provider)
    }
}

fn adapter(provider: ProviderId, client: Arc<CannedHttpClient>) -> Arc<dyn PriceSource> {
    let policy = unthrottled(provider);
    match provider {
        ProviderId::Twse => Arc::new(TwseAdapter::with_policy(client, &policy)),
        ProviderId::Yahoo => Arc::new(YahooAdapter::with_policy(client, &policy)),
        ProviderId::Finmind => Arc::new(FinMindAdapter::with_policy(client, &policy)),
    }
}

fn date(year: i32, month: Month, day: u8) -> Date {
    Date::from_calendar_date(year, month, day).expect("valid date")
}

fn january_request(provider: ProviderId) -> HistoryRequest {
    let raw = match provider {
        ProviderId::Yahoo => "AAPL",
        ProviderId::Twse | ProviderId::Finmind => "2330.TW",
    };
    HistoryRequest::new(
        Symbol::parse(raw).expect("valid symbol"),
        date(2024, Month::January, 1),
        date(2024, Month::January, 31),
    )
    .expect("valid window")
}

struct ProviderCase {
    id: ProviderId,
    rows: &'static str,
    no_rows: &'static str,
    closes: [f64; 2],
}

fn provider_cases() -> Vec<ProviderCase> {
    vec![
        ProviderCase {
            id: ProviderId::Twse,
            rows: TWSE_REPORT,
            no_rows: TWSE_NO_ROWS,
            closes: [593.0, 578.0],
        },
        ProviderCase {
            id: ProviderId::Yahoo,
            rows: YAHOO_CHART,
            no_rows: YAHOO_NOT_FOUND,
            closes: [185.64, 184.25],
        },
        ProviderCase {
            id: ProviderId::Finmind,
            rows: FINMIND_PRICES,
            no_rows: FINMIND_NO_ROWS,
            closes: [593.0, 578.0],
        },
    ]
}

#[tokio::test]
async fn every_provider_normalizes_to_the_same_canonical_shape() {
    for case in provider_cases() {
        let client = CannedHttpClient::respond(200, case.rows);
        let source = adapter(case.id, client.clone());
        assert_eq!(source.id(), case.id);

        let payload = source
            .fetch(january_request(case.id))
            .await
            .success()
            .unwrap_or_else(|| panic!("provider '{}': expected rows", case.id));
        assert_eq!(payload.provider, case.id, "provider '{}': payload tag", case.id);

        let series = normalize(&payload)
            .unwrap_or_else(|error| panic!("provider '{}' normalize failed: {error}", case.id));
        let bars = series.bars();
        assert_eq!(bars.len(), 2, "provider '{}': bar count", case.id);
        assert_eq!(bars[0].date, date(2024, Month::January, 2), "provider '{}'", case.id);
        assert_eq!(bars[1].date, date(2024, Month::January, 3), "provider '{}'", case.id);
        assert_eq!(
            [bars[0].close, bars[1].close],
            case.closes,
            "provider '{}': closes",
            case.id
        );
        for bar in bars {
            assert!(bar.low <= bar.high, "provider '{}': low above high", case.id);
            assert!(bar.volume > 0, "provider '{}': volume present", case.id);
        }

        assert!(!client.urls().is_empty(), "provider '{}': no upstream call", case.id);
    }
}

#[tokio::test]
async fn no_rows_is_empty_for_every_provider() {
    for case in provider_cases() {
        let source = adapter(case.id, CannedHttpClient::respond(200, case.no_rows));
        let result = source.fetch(january_request(case.id)).await;
        assert!(
            result.is_empty(),
            "provider '{}': expected Empty, got {result:?}",
            case.id
        );
    }
}

#[tokio::test]
async fn transport_errors_surface_as_retryable_failures() {
    for case in provider_cases() {
        let source = adapter(case.id, CannedHttpClient::fail(HttpError::new("connection refused")));
        let result = source.fetch(january_request(case.id)).await;

        let error = result
            .error()
            .unwrap_or_else(|| panic!("provider '{}': expected failure", case.id));
        assert_eq!(error.kind(), SourceErrorKind::Transport, "provider '{}'", case.id);
        assert!(error.retryable(), "provider '{}': transport is retryable", case.id);
    }
}

#[tokio::test]
async fn upstream_429_is_rate_limited_for_every_provider() {
    for case in provider_cases() {
        let source = adapter(case.id, CannedHttpClient::respond(429, ""));
        let result = source.fetch(january_request(case.id)).await;
        assert_eq!(
            result.error().map(|error| error.kind()),
            Some(SourceErrorKind::RateLimited),
            "provider '{}'",
            case.id
        );
    }
}

#[tokio::test]
async fn garbage_body_is_a_schema_mismatch_not_a_panic() {
    for case in provider_cases() {
        let source = adapter(case.id, CannedHttpClient::respond(200, "<html>maintenance</html>"));
        let result = source.fetch(january_request(case.id)).await;
        assert!(
            matches!(
                &result,
                FetchResult::Failure(error) if error.kind() == SourceErrorKind::SchemaMismatch
            ),
            "provider '{}': got {result:?}",
            case.id
        );
    }
}

#[tokio::test]
async fn repeated_transport_failures_open_the_circuit() {
    for case in provider_cases() {
        let client = CannedHttpClient::fail(HttpError::timeout("deadline elapsed"));
        let source = adapter(case.id, client.clone());

        for _ in 0..10 {
            if source.health().await.label() == "unhealthy" {
                break;
            }
            let _ = source.fetch(january_request(case.id)).await;
        }

        assert_eq!(source.health().await.label(), "unhealthy", "provider '{}'", case.id);

        let calls_before = client.urls().len();
        let result = source.fetch(january_request(case.id)).await;
        assert!(result.error().is_some(), "provider '{}'", case.id);
        assert_eq!(
            client.urls().len(),
            calls_before,
            "provider '{}': open circuit must not call upstream",
            case.id
        );
    }
}

#[tokio::test]
async fn consecutive_domestic_symbols_share_the_exchange_quota() {
    let client = CannedHttpClient::respond(200, TWSE_REPORT);
    let pipeline = AnalysisPipeline::builder()
        .with_http_client(client.clone())
        .build();

    for raw in ["2330", "2317"] {
        let fetched = pipeline.fetch_traced(raw).await.expect("valid symbol");
        assert!(
            fetched.value.is_success(),
            "{raw}: expected rows, got {:?}",
            fetched.value
        );
        assert_eq!(fetched.trace.source_chain, vec![ProviderId::Twse], "{raw}");
    }

    let exchange_calls = client
        .urls()
        .iter()
        .filter(|url| url.contains("STOCK_DAY"))
        .count();
    assert!(exchange_calls >= 2, "saw {exchange_calls} exchange calls");
}
