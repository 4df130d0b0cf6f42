use serde::Serialize;

use stockcast_core::{AnalysisPipeline, FetchResult, NormalizedBar, PipelineError, ProviderId, Symbol};

use crate::cli::BarsArgs;
use crate::error::CliError;

use super::analyze::{pipeline_error, FailureData};
use super::CommandResult;

#[derive(Debug, Serialize)]
struct BarsResponseData<'a> {
    symbol: &'a str,
    source: ProviderId,
    bars: &'a [NormalizedBar],
    headlines: &'a [String],
}

pub async fn run(args: &BarsArgs, pipeline: &AnalysisPipeline) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let traced = pipeline.fetch_traced(symbol.as_str()).await?;

    let snapshot = match traced.value {
        FetchResult::Success(snapshot) => snapshot,
        FetchResult::Empty => {
            return failure(
                &symbol,
                PipelineError::NoData {
                    symbol: symbol.to_string(),
                    cause: None,
                },
                traced.trace,
            )
        }
        FetchResult::Failure(error) => {
            return failure(
                &symbol,
                PipelineError::from_failure(&symbol, error),
                traced.trace,
            )
        }
    };

    let bars = snapshot.series.bars();
    let keep = args.limit.unwrap_or(bars.len()).min(bars.len());

    let data = serde_json::to_value(BarsResponseData {
        symbol: snapshot.symbol.as_str(),
        source: snapshot.source,
        bars: &bars[bars.len() - keep..],
        headlines: &snapshot.headlines,
    })?;

    Ok(CommandResult::traced(data, traced.trace))
}

fn failure(
    symbol: &Symbol,
    error: PipelineError,
    trace: stockcast_core::RouteTrace,
) -> Result<CommandResult, CliError> {
    let data = serde_json::to_value(FailureData {
        symbol: symbol.as_str(),
        message: error.user_message(),
    })?;

    Ok(CommandResult::traced(data, trace)
        .with_error(pipeline_error(&error))
        .failed())
}
