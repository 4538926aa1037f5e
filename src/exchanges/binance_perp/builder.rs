use crate::core::config::ExchangeSettings;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ReqwestRest, RestBuilder, RestClient};
use crate::core::symbols::SymbolMap;
use crate::core::types::{ExchangeName, Market};
use crate::exchanges::binance_perp::{
    connector::{markets_from_exchange_info, BinancePerpConnector},
    rest::BinancePerpRest,
    signer::BinancePerpSigner,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{info, warn};

const MARKET_LOAD_RETRY_MS: u64 = 500;
const MARKET_LOAD_RETRIES: usize = 2;

/// Fetch exchangeInfo, retrying transient failures.
pub async fn load_markets<R: RestClient>(
    rest: &BinancePerpRest<R>,
) -> Result<HashMap<String, Market>, ExchangeError> {
    let strategy = FixedInterval::from_millis(MARKET_LOAD_RETRY_MS).take(MARKET_LOAD_RETRIES);
    let info = Retry::spawn(strategy, || async {
        rest.get_exchange_info().await.map_err(|e| {
            warn!(error = %e, "failed to load bnf markets");
            e
        })
    })
    .await?;
    markets_from_exchange_info(&info)
}

/// Create a Binance USDⓈ-M connector for the account described by `settings`
pub async fn build_connector(
    settings: &ExchangeSettings,
) -> Result<BinancePerpConnector<ReqwestRest>, ExchangeError> {
    let endpoints = settings.endpoints()?;
    let credentials = settings.credentials()?;
    let symbols = SymbolMap::load(&settings.symbols_path())?;

    let signer = Arc::new(BinancePerpSigner::new(
        credentials.api_key().to_string(),
        credentials.secret().to_string(),
    ));
    let client = RestBuilder::new(endpoints.api_url.as_str(), ExchangeName::BinancePerp.as_str())
        .signer(signer)
        .build()?;
    let rest = BinancePerpRest::new(client);
    let markets = load_markets(&rest).await?;

    info!(
        testnet = !settings.environment.is_mainnet(),
        markets = markets.len(),
        "bnf adapter ready"
    );

    Ok(BinancePerpConnector::new(
        rest,
        symbols,
        markets,
        endpoints.ws_url,
        settings.is_cross,
    ))
}
