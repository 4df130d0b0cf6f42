use serde::Serialize;

use stockcast_core::{AmbiguousSymbolPolicy, ProviderId, SourceRouter, Symbol};

use crate::cli::RouteArgs;
use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct RouteResponseData<'a> {
    symbol: &'a str,
    cache_key: String,
    domestic: bool,
    aggregator_ticker: String,
    ambiguous_policy: AmbiguousSymbolPolicy,
    domestic_fallback: bool,
    chain: &'a [ProviderId],
}

pub fn run(args: &RouteArgs, router: &SourceRouter) -> Result<CommandResult, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let chain = router.route_symbol(&symbol);

    let data = serde_json::to_value(RouteResponseData {
        symbol: symbol.as_str(),
        cache_key: router.cache_key(&symbol),
        domestic: router.is_domestic(&symbol),
        aggregator_ticker: symbol.aggregator_ticker(),
        ambiguous_policy: router.config().ambiguous_policy,
        domestic_fallback: router.config().domestic_fallback,
        chain: &chain,
    })?;

    Ok(CommandResult::ok(data, chain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockcast_core::RouterConfig;

    #[test]
    fn reports_chain_and_classification() {
        let router = SourceRouter::new(RouterConfig {
            domestic_fallback: true,
            ..RouterConfig::default()
        });
        let args = RouteArgs {
            symbol: String::from("2330.tw"),
        };

        let result = run(&args, &router).expect("valid symbol");

        assert_eq!(
            result.source_chain,
            vec![ProviderId::Twse, ProviderId::Finmind]
        );
        assert_eq!(result.data["symbol"], "2330.TW");
        assert_eq!(result.data["cache_key"], "2330");
        assert_eq!(result.data["domestic"], true);
        assert_eq!(result.data["ambiguous_policy"], "suffix_wins");
    }

    #[test]
    fn invalid_symbol_is_a_validation_error() {
        let args = RouteArgs {
            symbol: String::from("AA PL"),
        };

        let err = run(&args, &SourceRouter::default()).err().expect("must fail");
        assert_eq!(err.exit_code(), 2);
    }
}
