use serde::Serialize;

use stockcast_core::{
    AdvisoryPayload, AnalysisPipeline, DerivedMetrics, EnvelopeError, PipelineError, ProviderId,
};

use crate::cli::AnalyzeArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct AnalyzeResponseData<'a> {
    symbol: &'a str,
    source: ProviderId,
    bars: usize,
    metrics: &'a DerivedMetrics,
    payload: &'a AdvisoryPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    advice: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct FailureData<'a> {
    pub symbol: &'a str,
    pub message: String,
}

pub async fn run(args: &AnalyzeArgs, pipeline: &AnalysisPipeline) -> Result<CommandResult, CliError> {
    let traced = pipeline.analyze_traced(&args.symbol).await?;

    let analysis = match traced.value {
        Ok(analysis) => analysis,
        Err(error) => {
            let data = serde_json::to_value(FailureData {
                symbol: &args.symbol,
                message: error.user_message(),
            })?;
            return Ok(CommandResult::traced(data, traced.trace)
                .with_error(pipeline_error(&error))
                .failed());
        }
    };

    let mut warnings = Vec::new();
    let advice = if args.advise {
        match pipeline.advisor() {
            Some(engine) => match pipeline.advise(&analysis, engine).await {
                Ok(text) => Some(text),
                Err(error) => {
                    warnings.push(format!("advisory unavailable: {error}"));
                    None
                }
            },
            None => {
                warnings.push(String::from(
                    "advisory engine is not configured; set STOCKCAST_GEMINI_API_KEY or GEMINI_API_KEY",
                ));
                None
            }
        }
    } else {
        None
    };

    let data = serde_json::to_value(AnalyzeResponseData {
        symbol: analysis.snapshot.symbol.as_str(),
        source: analysis.snapshot.source,
        bars: analysis.snapshot.series.len(),
        metrics: &analysis.metrics,
        payload: &analysis.payload,
        prompt: args.show_prompt.then(|| analysis.payload.render_prompt()),
        advice,
    })?;

    let mut result = CommandResult::traced(data, traced.trace);
    for warning in warnings {
        result = result.with_warning(warning);
    }
    Ok(result)
}

pub(super) fn pipeline_error(error: &PipelineError) -> EnvelopeError {
    let message = match error.cause() {
        Some(cause) => format!("{}: {}", error.user_message(), cause.message()),
        None => error.user_message(),
    };
    EnvelopeError::new(error.code(), message).with_retryable(error.retryable())
}
