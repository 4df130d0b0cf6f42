//! Advisory payload and the text-generation collaborator.
//!
//! The pipeline hands an [`AdvisoryPayload`] to any [`AdvisoryEngine`] and
//! treats the answer as an opaque string. [`GeminiEngine`] is the engine the
//! CLI ships with.

use std::fmt::Write as _;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::metrics::DerivedMetrics;
use crate::Symbol;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const GEMINI_TIMEOUT_MS: u64 = 30_000;

/// Fixed-shape input for the advisory engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryPayload {
    pub symbol: String,
    pub last_price: f64,
    pub pct_change: f64,
    pub moving_average: f64,
    pub headlines: Vec<String>,
}

impl AdvisoryPayload {
    pub fn new(symbol: &Symbol, metrics: &DerivedMetrics, headlines: Vec<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            last_price: metrics.last_close,
            pct_change: metrics.pct_change,
            moving_average: metrics.moving_average,
            headlines,
        }
    }

    /// Natural-language prompt in Traditional Chinese.
    pub fn render_prompt(&self) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "你是一位專業的台股與美股分析師，請根據以下資料提供簡短的投資建議。");
        let _ = writeln!(prompt);
        let _ = writeln!(prompt, "股票代號：{}", self.symbol);
        let _ = writeln!(prompt, "最新收盤價：{:.2}", self.last_price);
        let _ = writeln!(prompt, "單日漲跌幅：{:+.2}%", self.pct_change);
        let _ = writeln!(prompt, "短期移動平均：{:.2}", self.moving_average);
        let _ = writeln!(prompt, "近期新聞：");
        if self.headlines.is_empty() {
            let _ = writeln!(prompt, "（無相關新聞）");
        }
        for headline in &self.headlines {
            let _ = writeln!(prompt, "- {headline}");
        }
        let _ = writeln!(prompt);
        let _ = write!(
            prompt,
            "請以繁體中文回答，說明目前走勢與主要風險，最後給出「買進」、「持有」或「觀望」其中一項建議。"
        );
        prompt
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdvisoryError {
    #[error("advisory engine is not configured: {0}")]
    NotConfigured(String),
    #[error("advisory transport error: {0}")]
    Transport(String),
    #[error("advisory engine returned status {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("advisory engine returned no text")]
    EmptyResponse,
    #[error("failed to parse advisory response: {0}")]
    Malformed(String),
}

/// Text-generation collaborator consuming an advisory payload.
pub trait AdvisoryEngine: Send + Sync {
    fn advise<'a>(
        &'a self,
        payload: &'a AdvisoryPayload,
    ) -> Pin<Box<dyn Future<Output = Result<String, AdvisoryError>> + Send + 'a>>;
}

/// Google Gemini `generateContent` engine.
#[derive(Clone)]
pub struct GeminiEngine {
    http_client: Arc<dyn HttpClient>,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiEngine {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            model: String::from(DEFAULT_GEMINI_MODEL),
            base_url: String::from(GEMINI_BASE_URL),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &str) -> HttpRequest {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        HttpRequest::post_json(
            format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url,
                urlencoding::encode(&self.model)
            ),
            body.to_string(),
        )
        .with_auth(&HttpAuth::Header {
            name: String::from("x-goog-api-key"),
            value: self.api_key.clone(),
        })
        .with_timeout_ms(GEMINI_TIMEOUT_MS)
    }
}

impl AdvisoryEngine for GeminiEngine {
    fn advise<'a>(
        &'a self,
        payload: &'a AdvisoryPayload,
    ) -> Pin<Box<dyn Future<Output = Result<String, AdvisoryError>> + Send + 'a>> {
        Box::pin(async move {
            if self.api_key.trim().is_empty() {
                return Err(AdvisoryError::NotConfigured(String::from(
                    "gemini api key is empty",
                )));
            }

            let request = self.request(&payload.render_prompt());
            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| AdvisoryError::Transport(error.to_string()))?;

            if !response.is_success() {
                let message = serde_json::from_str::<GeminiErrorEnvelope>(&response.body)
                    .map(|envelope| envelope.error.message)
                    .unwrap_or_else(|_| response.body.chars().take(200).collect());
                return Err(AdvisoryError::Upstream {
                    status: response.status,
                    message,
                });
            }

            let parsed: GenerateContentResponse = serde_json::from_str(&response.body)
                .map_err(|error| AdvisoryError::Malformed(error.to_string()))?;

            let text = parsed
                .candidates
                .into_iter()
                .next()
                .map(|candidate| {
                    candidate
                        .content
                        .parts
                        .into_iter()
                        .map(|part| part.text)
                        .collect::<String>()
                })
                .unwrap_or_default();

            if text.trim().is_empty() {
                return Err(AdvisoryError::EmptyResponse);
            }

            Ok(text)
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
