mod analyze;
mod bars;
mod route;
mod sources;

use serde_json::Value;
use stockcast_core::{AnalysisPipeline, Envelope, EnvelopeError, ProviderId, RouteTrace};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::metadata::Metadata;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
    pub latency_ms: u64,
    pub cache_hit: bool,
    pub source_chain: Vec<ProviderId>,
    /// Set when the command produced no usable data.
    pub failed: bool,
}

impl CommandResult {
    pub fn ok(data: Value, source_chain: Vec<ProviderId>) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
            latency_ms: 0,
            cache_hit: false,
            source_chain,
            failed: false,
        }
    }

    /// Carries chain, errors, warnings, latency and cache flag from a fetch.
    pub fn traced(data: Value, trace: RouteTrace) -> Self {
        Self {
            data,
            warnings: trace.warnings,
            errors: trace.errors,
            latency_ms: trace.latency_ms,
            cache_hit: trace.cache_hit,
            source_chain: trace.source_chain,
            failed: false,
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_error(mut self, error: EnvelopeError) -> Self {
        self.errors.push(error);
        self
    }

    pub fn failed(mut self) -> Self {
        self.failed = true;
        self
    }
}

pub struct CommandOutcome {
    pub envelope: Envelope<Value>,
    pub failed: bool,
}

pub async fn run(cli: &Cli) -> Result<CommandOutcome, CliError> {
    let config = cli.pipeline_config()?;
    let pipeline = AnalysisPipeline::builder()
        .with_config(config)
        .with_real_clients()
        .build();

    let command_result = match &cli.command {
        Command::Analyze(args) => analyze::run(args, &pipeline).await?,
        Command::Bars(args) => bars::run(args, &pipeline).await?,
        Command::Route(args) => route::run(args, pipeline.router())?,
        Command::Sources => sources::run(&pipeline).await?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
        latency_ms,
        cache_hit,
        source_chain,
        failed,
    } = command_result;

    let mut metadata = Metadata::new(source_chain, latency_ms, cache_hit)?;
    for warning in warnings {
        metadata.push_warning(warning);
    }

    let meta = metadata.into_envelope_meta()?;
    let envelope = Envelope::new(meta, data, errors);

    Ok(CommandOutcome { envelope, failed })
}
