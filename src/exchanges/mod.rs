pub mod binance_perp;
pub mod hyperliquid;
