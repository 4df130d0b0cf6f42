//! Pipeline configuration.
//!
//! [`PipelineConfig::default`] matches the dashboard's behaviour; every knob
//! can be overridden from the environment:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `STOCKCAST_DOMESTIC_FALLBACK` | `router.domestic_fallback` | `false` |
//! | `STOCKCAST_AMBIGUOUS_POLICY` | `router.ambiguous_policy` | `suffix_wins` |
//! | `STOCKCAST_DOMESTIC_SUFFIXES` | `router.domestic_suffixes` | `TW,TWO` |
//! | `STOCKCAST_CACHE_TTL_SECS` | `cache.ttl` | `600` |
//! | `STOCKCAST_FAILURE_TTL_SECS` | `cache.failure_ttl` | ttl / 10 |
//! | `STOCKCAST_FETCH_TIMEOUT_MS` | `fetch_timeout` | `10000` |
//! | `STOCKCAST_DOMESTIC_LOOKBACK_DAYS` | `domestic_lookback_days` | `31` |
//! | `STOCKCAST_FOREIGN_LOOKBACK_DAYS` | `foreign_lookback_days` | `90` |
//! | `STOCKCAST_MA_WINDOW` | `ma_window` | `5` |
//! | `STOCKCAST_HEADLINE_LIMIT` | `headline_limit` | `3` |
//!
//! Credentials are read separately by [`Credentials::from_env`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheConfig;
use crate::metrics::DEFAULT_MA_WINDOW;
use crate::news::DEFAULT_HEADLINE_LIMIT;
use crate::routing::{AmbiguousSymbolPolicy, RouterConfig};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_DOMESTIC_LOOKBACK_DAYS: u32 = 31;
pub const DEFAULT_FOREIGN_LOOKBACK_DAYS: u32 = 90;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value '{value}' for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub router: RouterConfig,
    pub cache: CacheConfig,
    /// Upper bound on each adapter call and on the headline lookup.
    pub fetch_timeout: Duration,
    pub domestic_lookback_days: u32,
    pub foreign_lookback_days: u32,
    pub ma_window: usize,
    pub headline_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            cache: CacheConfig::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            domestic_lookback_days: DEFAULT_DOMESTIC_LOOKBACK_DAYS,
            foreign_lookback_days: DEFAULT_FOREIGN_LOOKBACK_DAYS,
            ma_window: DEFAULT_MA_WINDOW,
            headline_limit: DEFAULT_HEADLINE_LIMIT,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &'static str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(|value| (name, value))
        };

        if let Some((var, value)) = get("STOCKCAST_DOMESTIC_FALLBACK") {
            config.router.domestic_fallback = parse_bool(var, &value)?;
        }
        if let Some((var, value)) = get("STOCKCAST_AMBIGUOUS_POLICY") {
            config.router.ambiguous_policy = value
                .parse::<AmbiguousSymbolPolicy>()
                .map_err(|reason| ConfigError {
                    var,
                    value: value.clone(),
                    reason,
                })?;
        }
        if let Some((_, value)) = get("STOCKCAST_DOMESTIC_SUFFIXES") {
            config.router.domestic_suffixes = value
                .split(',')
                .map(|suffix| suffix.trim().trim_start_matches('.').to_ascii_uppercase())
                .filter(|suffix| !suffix.is_empty())
                .collect();
        }
        if let Some((var, value)) = get("STOCKCAST_CACHE_TTL_SECS") {
            config.cache = CacheConfig::with_ttl(Duration::from_secs(parse_number(var, &value)?));
        }
        if let Some((var, value)) = get("STOCKCAST_FAILURE_TTL_SECS") {
            config.cache.failure_ttl = Duration::from_secs(parse_number(var, &value)?);
        }
        if let Some((var, value)) = get("STOCKCAST_FETCH_TIMEOUT_MS") {
            config.fetch_timeout = Duration::from_millis(parse_number(var, &value)?);
        }
        if let Some((var, value)) = get("STOCKCAST_DOMESTIC_LOOKBACK_DAYS") {
            config.domestic_lookback_days = parse_number(var, &value)?;
        }
        if let Some((var, value)) = get("STOCKCAST_FOREIGN_LOOKBACK_DAYS") {
            config.foreign_lookback_days = parse_number(var, &value)?;
        }
        if let Some((var, value)) = get("STOCKCAST_MA_WINDOW") {
            config.ma_window = parse_number(var, &value)?;
        }
        if let Some((var, value)) = get("STOCKCAST_HEADLINE_LIMIT") {
            config.headline_limit = parse_number(var, &value)?;
        }

        Ok(config)
    }

    pub const fn lookback_days(&self, domestic: bool) -> u32 {
        if domestic {
            self.domestic_lookback_days
        } else {
            self.foreign_lookback_days
        }
    }
}

/// Upstream credentials; every one is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub finmind_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
}

impl Credentials {
    /// Reads `STOCKCAST_*` names first, then the provider's conventional name.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_owned())
                .find(|value| !value.is_empty())
        };

        Self {
            finmind_token: first(&["STOCKCAST_FINMIND_TOKEN", "FINMIND_TOKEN"]),
            gemini_api_key: first(&["STOCKCAST_GEMINI_API_KEY", "GEMINI_API_KEY"]),
            gemini_model: first(&["STOCKCAST_GEMINI_MODEL"]),
        }
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: value.to_owned(),
            reason: String::from("expected true or false"),
        }),
    }
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|error: T::Err| ConfigError {
        var,
        value: value.to_owned(),
        reason: error.to_string(),
    })
}
