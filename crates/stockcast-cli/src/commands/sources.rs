use serde::Serialize;

use stockcast_core::{AnalysisPipeline, ProviderId};

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct SourceStatus {
    id: ProviderId,
    available: bool,
    status: &'static str,
    rate_available: bool,
}

#[derive(Debug, Serialize)]
struct SourcesResponseData {
    sources: Vec<SourceStatus>,
}

pub async fn run(pipeline: &AnalysisPipeline) -> Result<CommandResult, CliError> {
    let snapshots = pipeline.sources().await;
    if snapshots.is_empty() {
        return Err(CliError::Command(String::from("no source adapters are registered")));
    }

    let source_chain = snapshots.iter().map(|snapshot| snapshot.id).collect();
    let sources = snapshots
        .into_iter()
        .map(|snapshot| SourceStatus {
            id: snapshot.id,
            available: snapshot.available(),
            status: snapshot.status_label(),
            rate_available: snapshot.health.rate_available,
        })
        .collect();

    let data = serde_json::to_value(SourcesResponseData { sources })?;
    Ok(CommandResult::ok(data, source_chain))
}
