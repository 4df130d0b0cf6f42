use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ProviderId, Symbol, ValidationError, DOMESTIC_SUFFIXES};

/// Resolution for an all-digit code carrying a non-regional suffix (`7203.T`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousSymbolPolicy {
    /// The explicit suffix decides: `7203.T` is foreign.
    #[default]
    SuffixWins,
    /// The digits decide: `7203.T` is routed as domestic.
    DigitsWin,
}

impl AmbiguousSymbolPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuffixWins => "suffix_wins",
            Self::DigitsWin => "digits_win",
        }
    }
}

impl Display for AmbiguousSymbolPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmbiguousSymbolPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "suffix_wins" | "suffix" => Ok(Self::SuffixWins),
            "digits_win" | "digits" => Ok(Self::DigitsWin),
            other => Err(format!(
                "unknown ambiguous-symbol policy '{other}', expected suffix_wins or digits_win"
            )),
        }
    }
}

/// Routing knobs. Defaults: no domestic fallback, suffix wins, `TW`/`TWO`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub domestic_fallback: bool,
    pub ambiguous_policy: AmbiguousSymbolPolicy,
    pub domestic_suffixes: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            domestic_fallback: false,
            ambiguous_policy: AmbiguousSymbolPolicy::default(),
            domestic_suffixes: DOMESTIC_SUFFIXES.iter().map(|s| (*s).to_owned()).collect(),
        }
    }
}

/// Decides which adapters to try for a symbol, in order.
///
/// Pure: looks only at the symbol's text, never at adapter health or the
/// network.
#[derive(Debug, Clone, Default)]
pub struct SourceRouter {
    config: RouterConfig,
}

impl SourceRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn route(&self, raw_symbol: &str) -> Result<Vec<ProviderId>, ValidationError> {
        Symbol::parse(raw_symbol).map(|symbol| self.route_symbol(&symbol))
    }

    /// Main-board domestic codes go to the exchange first. OTC listings skip
    /// it because the exchange report does not carry them.
    pub fn route_symbol(&self, symbol: &Symbol) -> Vec<ProviderId> {
        if !self.is_domestic(symbol) {
            return vec![ProviderId::Yahoo];
        }

        let primary = if symbol.is_otc() {
            ProviderId::Yahoo
        } else {
            ProviderId::Twse
        };
        if self.config.domestic_fallback {
            vec![primary, ProviderId::Finmind]
        } else {
            vec![primary]
        }
    }

    pub fn is_domestic(&self, symbol: &Symbol) -> bool {
        symbol.is_domestic_with(
            &self.config.domestic_suffixes,
            self.config.ambiguous_policy == AmbiguousSymbolPolicy::DigitsWin,
        )
    }

    /// Cache key shared by every spelling of the same listing.
    pub fn cache_key(&self, symbol: &Symbol) -> String {
        symbol
            .canonical_id_with(&self.config.domestic_suffixes)
            .to_owned()
    }
}
