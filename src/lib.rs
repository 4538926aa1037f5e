pub mod core;
pub mod exchanges;
pub mod utils;

pub use core::{
    errors::ExchangeError,
    traits::{
        AccountInfo, Exchange, MarketDataSource, OrderMgmtSubscription, OrderPlacer, OrderStream,
        StreamControl, Subscription,
    },
    types::*,
};
pub use exchanges::binance_perp::BinancePerpConnector;
pub use exchanges::hyperliquid::HyperliquidConnector;
pub use utils::{ExchangeFactory, ExchangeRegistry};
