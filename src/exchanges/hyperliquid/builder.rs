use crate::core::config::{flag_from_env, ExchangeSettings};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{ReqwestRest, RestBuilder, RestClient};
use crate::core::symbols::SymbolMap;
use crate::core::types::{ExchangeName, Market};
use crate::exchanges::binance_perp::rest::BinancePerpRest;
use crate::exchanges::hyperliquid::connector::{BinanceKlines, HyperliquidConnector};
use crate::exchanges::hyperliquid::rest::HyperliquidRest;
use crate::exchanges::hyperliquid::signer::HyperliquidSigner;
use crate::exchanges::hyperliquid::types::Meta;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{info, warn};

/// Price decimals plus size decimals never exceed this
pub const MAX_PRICE_DECIMALS: u32 = 6;
pub const MIN_NOTIONAL_USD: f64 = 10.0;
pub const MAKER_FEE_PCT: f64 = 0.0001;
pub const TAKER_FEE_PCT: f64 = 0.00035;

const BINANCE_KLINES_API_URL: &str = "https://fapi.binance.com";
const BINANCE_KLINES_WS_URL: &str = "wss://fstream.binance.com/ws";

const MARKET_LOAD_RETRY_MS: u64 = 500;
const MARKET_LOAD_RETRIES: usize = 2;

fn pow10_neg(exponent: u32) -> f64 {
    Decimal::new(1, exponent).to_f64().unwrap_or_default()
}

/// Markets keyed by coin; the index in the universe is the asset id.
pub fn markets_from_meta(meta: &Meta) -> HashMap<String, Market> {
    meta.universe
        .iter()
        .enumerate()
        .map(|(index, asset)| {
            let size_step = pow10_neg(asset.sz_decimals);
            let price_decimals = MAX_PRICE_DECIMALS.saturating_sub(asset.sz_decimals);
            let market = Market {
                id: index as u32,
                exchange_name: ExchangeName::Hyperliquid,
                symbol: asset.name.clone(),
                tick_size: pow10_neg(price_decimals),
                min_notional: MIN_NOTIONAL_USD,
                lot_min_qty: size_step,
                lot_max_qty: 0.0,
                lot_step_size: size_step,
                market_lot_min_qty: size_step,
                market_lot_max_qty: 0.0,
                market_lot_step_size: size_step,
                max_leverage: f64::from(asset.max_leverage),
                maker_fee_pct: MAKER_FEE_PCT,
                taker_fee_pct: TAKER_FEE_PCT,
            };
            (asset.name.clone(), market)
        })
        .collect()
}

/// Fetch the universe, retrying transient failures.
pub async fn load_markets<R: RestClient>(
    rest: &HyperliquidRest<R>,
) -> Result<HashMap<String, Market>, ExchangeError> {
    let strategy = FixedInterval::from_millis(MARKET_LOAD_RETRY_MS).take(MARKET_LOAD_RETRIES);
    let meta = Retry::spawn(strategy, || async {
        rest.get_meta().await.map_err(|e| {
            warn!(error = %e, "failed to load hpl markets");
            e
        })
    })
    .await?;
    Ok(markets_from_meta(&meta))
}

/// Builder for the Hyperliquid adapter of one account
pub struct HyperliquidBuilder {
    settings: ExchangeSettings,
    use_binance_klines: Option<bool>,
}

impl HyperliquidBuilder {
    pub fn new(settings: ExchangeSettings) -> Self {
        Self {
            settings,
            use_binance_klines: None,
        }
    }

    /// Override `{PREFIX}_USE_BNF_KLINES`
    pub fn with_binance_klines(mut self, enabled: bool) -> Self {
        self.use_binance_klines = Some(enabled);
        self
    }

    fn binance_klines_enabled(&self) -> bool {
        self.use_binance_klines.unwrap_or_else(|| {
            flag_from_env(&format!(
                "{}_USE_BNF_KLINES",
                self.settings.env_prefix.to_uppercase()
            ))
        })
    }

    /// Load credentials, endpoints, symbols and markets, then assemble the adapter.
    pub async fn build(self) -> Result<HyperliquidConnector<ReqwestRest>, ExchangeError> {
        let endpoints = self.settings.endpoints()?;
        let credentials = self.settings.credentials()?;
        let symbols = SymbolMap::load(&self.settings.symbols_path())?;

        let signer = Arc::new(HyperliquidSigner::from_private_key(
            credentials.secret(),
            self.settings.environment.is_mainnet(),
        )?);
        let client = RestBuilder::new(endpoints.api_url.as_str(), ExchangeName::Hyperliquid.as_str())
            .build()?;
        let rest = HyperliquidRest::new(client, signer);
        let markets = load_markets(&rest).await?;

        let binance_klines = if self.binance_klines_enabled() {
            Some(BinanceKlines {
                rest: BinancePerpRest::new(ReqwestRest::public(
                    BINANCE_KLINES_API_URL,
                    ExchangeName::BinancePerp.as_str(),
                )?),
                ws_url: BINANCE_KLINES_WS_URL.to_string(),
            })
        } else {
            None
        };

        info!(
            account = %rest.wallet_address(),
            markets = markets.len(),
            binance_klines = binance_klines.is_some(),
            "hpl adapter ready"
        );

        Ok(HyperliquidConnector::new(
            rest,
            symbols,
            markets,
            endpoints.ws_url,
            self.settings.is_cross,
            binance_klines,
        ))
    }
}

/// Create a Hyperliquid connector for the account described by `settings`
pub async fn build_connector(
    settings: &ExchangeSettings,
) -> Result<HyperliquidConnector<ReqwestRest>, ExchangeError> {
    HyperliquidBuilder::new(settings.clone()).build().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markets_from_meta() {
        let meta: Meta = serde_json::from_str(
            r#"{"universe":[
                {"name":"BTC","szDecimals":5,"maxLeverage":50},
                {"name":"ETH","szDecimals":4,"maxLeverage":50,"onlyIsolated":false}
            ]}"#,
        )
        .unwrap();
        let markets = markets_from_meta(&meta);

        let eth = &markets["ETH"];
        assert_eq!(eth.id, 1);
        assert_eq!(format!("{}", eth.lot_step_size), "0.0001");
        assert_eq!(format!("{}", eth.tick_size), "0.01");
        assert!((eth.taker_fee_pct - 0.00035).abs() < f64::EPSILON);

        let btc = &markets["BTC"];
        assert_eq!(btc.id, 0);
        assert_eq!(format!("{}", btc.tick_size), "0.1");
        assert!((btc.min_notional - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_binance_symbol() {
        assert_eq!(BinanceKlines::symbol("BTC_USD"), "BTCUSDT");
    }

    #[test]
    fn test_binance_klines_flag_override() {
        let builder = HyperliquidBuilder::new(ExchangeSettings::new(
            ExchangeName::Hyperliquid,
            "LFG_TEST_NO_SUCH_PREFIX",
        ));
        assert!(!builder.binance_klines_enabled());
        assert!(builder.with_binance_klines(true).binance_klines_enabled());
    }
}
