//! CLI argument definitions for stockcast.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `analyze` | Fetch a symbol and derive metrics plus the advisory payload |
//! | `bars` | Fetch the normalized daily series |
//! | `route` | Show which providers a symbol routes to |
//! | `sources` | List registered providers and their health |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--timeout-ms` | `10000` | Per-provider fetch timeout |
//! | `--lookback-days` | `31` / `90` | History window (domestic / foreign) |
//! | `--ma-window` | `5` | Moving-average window |
//! | `--domestic-fallback` | `false` | Fall back to FinMind for domestic symbols |
//! | `--ambiguous-policy` | `suffix-wins` | Routing for digit codes with a foreign suffix |
//!
//! Unset options fall back to the `STOCKCAST_*` environment variables.
//!
//! # Examples
//!
//! ```bash
//! stockcast analyze 2330 --pretty
//! stockcast analyze AAPL --advise
//! stockcast bars 2330.TW --limit 5
//! stockcast route 7203.T --ambiguous-policy digits-win
//! ```

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use stockcast_core::{AmbiguousSymbolPolicy, PipelineConfig};

use crate::error::CliError;

/// End-of-day price pipeline with provider fallback.
#[derive(Debug, Parser)]
#[command(
    name = "stockcast",
    author,
    version,
    about = "End-of-day price pipeline with provider fallback",
    long_about = "stockcast fetches daily prices from the Taiwan Stock Exchange, Yahoo Finance \
or FinMind, normalizes them into one OHLCV series, caches the result and derives \
last close, day-over-day change and a moving average.\n\
\n\
Output is a JSON envelope with request metadata on stdout; logs go to stderr."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Per-provider fetch timeout in milliseconds.
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// History window in calendar days, for domestic and foreign symbols.
    #[arg(long, global = true)]
    pub lookback_days: Option<u32>,

    /// Number of trailing closes in the moving average.
    #[arg(long, global = true)]
    pub ma_window: Option<usize>,

    /// Try FinMind after the exchange feed for domestic symbols.
    #[arg(long, global = true, default_value_t = false)]
    pub domestic_fallback: bool,

    /// How to route an all-digit code with a foreign suffix (e.g. 7203.T).
    #[arg(long, global = true, value_enum)]
    pub ambiguous_policy: Option<PolicyArg>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// The explicit suffix decides.
    SuffixWins,
    /// The digits decide.
    DigitsWin,
}

impl From<PolicyArg> for AmbiguousSymbolPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::SuffixWins => Self::SuffixWins,
            PolicyArg::DigitsWin => Self::DigitsWin,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a symbol and derive metrics and the advisory payload.
    Analyze(AnalyzeArgs),
    /// Fetch the normalized daily series.
    Bars(BarsArgs),
    /// Show the routing decision for a symbol.
    Route(RouteArgs),
    /// List registered providers and their health.
    Sources,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Ticker, bare exchange code or suffixed code (AAPL, 2330, 2330.TW).
    pub symbol: String,

    /// Ask the configured advisory engine for a recommendation.
    #[arg(long, default_value_t = false)]
    pub advise: bool,

    /// Include the rendered advisory prompt in the output.
    #[arg(long, default_value_t = false)]
    pub show_prompt: bool,
}

#[derive(Debug, Args)]
pub struct BarsArgs {
    pub symbol: String,

    /// Keep only the most recent N bars.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    pub symbol: String,
}

impl Cli {
    /// Environment config with command-line overrides applied.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        let config = PipelineConfig::from_env()?;
        Ok(self.apply_overrides(config))
    }

    fn apply_overrides(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(timeout_ms) = self.timeout_ms {
            config.fetch_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(days) = self.lookback_days {
            config.domestic_lookback_days = days;
            config.foreign_lookback_days = days;
        }
        if let Some(window) = self.ma_window {
            config.ma_window = window;
        }
        if self.domestic_fallback {
            config.router.domestic_fallback = true;
        }
        if let Some(policy) = self.ambiguous_policy {
            config.router.ambiguous_policy = policy.into();
        }
        config
    }
}
