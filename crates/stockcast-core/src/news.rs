use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::http_client::{HttpClient, HttpRequest};
use crate::Symbol;

/// Headlines requested when the caller does not say otherwise.
pub const DEFAULT_HEADLINE_LIMIT: usize = 3;

/// Best-effort headline lookup.
///
/// Never fails: any upstream problem yields an empty list, and the result
/// holds at most `limit` titles.
pub trait HeadlineSource: Send + Sync {
    fn headlines<'a>(
        &'a self,
        symbol: &'a Symbol,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + 'a>>;
}

/// Headline source that never has anything to say.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHeadlines;

impl HeadlineSource for NoHeadlines {
    fn headlines<'a>(
        &'a self,
        _symbol: &'a Symbol,
        _limit: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + 'a>> {
        Box::pin(async { Vec::new() })
    }
}

/// News titles from the Yahoo Finance search endpoint.
#[derive(Clone)]
pub struct YahooNewsSidecar {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl YahooNewsSidecar {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            base_url: String::from(crate::adapters::YAHOO_BASE_URL),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn search(&self, symbol: &Symbol, limit: usize) -> Result<Vec<String>, String> {
        let request = HttpRequest::get(format!("{}/v1/finance/search", self.base_url))
            .with_query("q", &symbol.aggregator_ticker())
            .with_query("quotesCount", "0")
            .with_query("newsCount", &limit.to_string())
            .with_timeout_ms(self.timeout.as_millis().min(u128::from(u64::MAX)) as u64);

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| error.to_string())?;
        if !response.is_success() {
            return Err(format!("status {}", response.status));
        }

        let body: SearchResponse =
            serde_json::from_str(&response.body).map_err(|error| error.to_string())?;

        Ok(body
            .news
            .into_iter()
            .map(|item| item.title.trim().to_owned())
            .filter(|title| !title.is_empty())
            .take(limit)
            .collect())
    }
}

impl HeadlineSource for YahooNewsSidecar {
    fn headlines<'a>(
        &'a self,
        symbol: &'a Symbol,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Vec<String>> + Send + 'a>> {
        Box::pin(async move {
            if limit == 0 {
                return Vec::new();
            }

            match tokio::time::timeout(self.timeout, self.search(symbol, limit)).await {
                Ok(Ok(titles)) => titles,
                Ok(Err(reason)) => {
                    tracing::debug!(%symbol, reason = %reason, "headline lookup failed");
                    Vec::new()
                }
                Err(_) => {
                    tracing::debug!(%symbol, "headline lookup timed out");
                    Vec::new()
                }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news: Vec<NewsItem>,
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: String,
}
