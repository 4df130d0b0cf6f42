//! JSON envelope written by every `stockcast` command.
//!
//! `meta` says where the data came from and how long it took, `data` is the
//! command payload and `errors` lists every upstream attempt that failed, even
//! when a later provider succeeded.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::data_source::SourceError;
use crate::{ProviderId, ValidationError};

pub const SCHEMA_VERSION: &str = "v1.0.0";

const MIN_REQUEST_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub meta: EnvelopeMeta,
    pub data: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EnvelopeError>,
}

impl<T> Envelope<T> {
    pub fn new(meta: EnvelopeMeta, data: T, errors: Vec<EnvelopeError>) -> Self {
        Self { meta, data, errors }
    }
}

/// Provenance of one command run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub schema_version: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    /// Providers consulted, in the order they were tried.
    pub source_chain: Vec<ProviderId>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl EnvelopeMeta {
    /// Stamps the current time and schema version. The request id must be at
    /// least eight characters and the chain must name a provider.
    pub fn new(
        request_id: impl Into<String>,
        source_chain: Vec<ProviderId>,
        latency_ms: u64,
        cache_hit: bool,
    ) -> Result<Self, ValidationError> {
        let request_id = request_id.into();
        if request_id.trim().len() < MIN_REQUEST_ID_LEN {
            return Err(ValidationError::InvalidRequestId);
        }
        if source_chain.is_empty() {
            return Err(ValidationError::EmptySourceChain);
        }

        Ok(Self {
            request_id,
            trace_id: None,
            schema_version: String::from(SCHEMA_VERSION),
            generated_at: OffsetDateTime::now_utc(),
            source_chain,
            latency_ms,
            cache_hit,
            warnings: Vec::new(),
        })
    }

    /// Attaches a W3C-style trace id: 32 hex digits, not all zero.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Result<Self, ValidationError> {
        let trace_id = trace_id.into();
        let well_formed = trace_id.len() == 32
            && trace_id.chars().all(|ch| ch.is_ascii_hexdigit())
            && trace_id.chars().any(|ch| ch != '0');
        if !well_formed {
            return Err(ValidationError::InvalidTraceId);
        }

        self.trace_id = Some(trace_id);
        Ok(self)
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }
}

/// One failed attempt or command-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ProviderId>,
}

impl EnvelopeError {
    /// A blank message is replaced by the code so readers always get text.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        let message = if message.trim().is_empty() {
            code.clone()
        } else {
            message
        };

        Self {
            code,
            message,
            retryable: None,
            source: None,
        }
    }

    pub fn from_source_error(error: &SourceError) -> Self {
        Self::new(error.code(), error.message()).with_retryable(error.retryable())
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = Some(retryable);
        self
    }

    pub fn with_source(mut self, source: ProviderId) -> Self {
        self.source = Some(source);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> EnvelopeMeta {
        EnvelopeMeta::new("request-12345", vec![ProviderId::Twse], 11, true)
            .expect("meta should be valid")
    }

    #[test]
    fn meta_is_stamped_with_schema_version() {
        let meta = meta();
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
        assert!(meta.cache_hit);
        assert!(meta.trace_id.is_none());
    }

    #[test]
    fn short_request_id_or_empty_chain_is_rejected() {
        let err = EnvelopeMeta::new("req", vec![ProviderId::Yahoo], 1, false).expect_err("short id");
        assert_eq!(err, ValidationError::InvalidRequestId);

        let err = EnvelopeMeta::new("request-12345", Vec::new(), 1, false).expect_err("no chain");
        assert_eq!(err, ValidationError::EmptySourceChain);
    }

    #[test]
    fn malformed_trace_ids_are_rejected() {
        for bad in ["not-a-trace-id", "00000000000000000000000000000000"] {
            assert_eq!(
                meta().with_trace_id(bad).expect_err("must fail"),
                ValidationError::InvalidTraceId,
                "{bad}"
            );
        }

        let traced = meta()
            .with_trace_id("4bf92f3577b34da6a3ce929d0e0e4736")
            .expect("valid trace id");
        assert_eq!(traced.trace_id.as_deref(), Some("4bf92f3577b34da6a3ce929d0e0e4736"));
    }

    #[test]
    fn source_error_keeps_code_and_retry_hint() {
        let error = EnvelopeError::from_source_error(&SourceError::rate_limited("quota"))
            .with_source(ProviderId::Finmind);

        assert_eq!(error.code, "source.rate_limited");
        assert_eq!(error.message, "quota");
        assert_eq!(error.retryable, Some(true));
        assert_eq!(error.source, Some(ProviderId::Finmind));
    }

    #[test]
    fn blank_message_falls_back_to_code() {
        let error = EnvelopeError::new("source.transport", "  ");
        assert_eq!(error.message, "source.transport");
    }

    #[test]
    fn envelope_serializes_errors_only_when_present() {
        let clean = serde_json::to_value(Envelope::new(meta(), 1, Vec::new())).expect("serializable");
        assert!(clean.get("errors").is_none());
        assert!(clean["meta"]["generated_at"]
            .as_str()
            .is_some_and(|stamp| stamp.ends_with('Z')));
        assert_eq!(clean["meta"]["source_chain"][0], "twse");

        let failed = Envelope::new(
            meta(),
            serde_json::Value::Null,
            vec![EnvelopeError::new("source.empty", "no rows")],
        );
        let json = serde_json::to_value(failed).expect("serializable");
        assert_eq!(json["errors"][0]["code"], "source.empty");
    }
}
