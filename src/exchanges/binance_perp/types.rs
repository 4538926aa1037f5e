use crate::core::errors::ExchangeError;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinancePerpError {
    #[error("Order rejected: code={code}, message={message}")]
    OrderError { code: i32, message: String },

    #[error("Missing filter {filter} for {symbol}")]
    MissingFilter {
        filter: &'static str,
        symbol: String,
    },

    #[error("Invalid order id: {value}")]
    InvalidOrderId { value: String },
}

impl BinancePerpError {
    #[cold]
    #[inline(never)]
    pub fn order_error(code: i32, message: impl Into<String>) -> Self {
        Self::OrderError {
            code,
            message: message.into(),
        }
    }

    #[cold]
    #[inline(never)]
    pub fn missing_filter(filter: &'static str, symbol: impl Into<String>) -> Self {
        Self::MissingFilter {
            filter,
            symbol: symbol.into(),
        }
    }
}

impl From<BinancePerpError> for ExchangeError {
    fn from(err: BinancePerpError) -> Self {
        match err {
            BinancePerpError::OrderError { code, message } => Self::ApiError { code, message },
            BinancePerpError::InvalidOrderId { .. } => Self::InvalidParameters(err.to_string()),
            BinancePerpError::MissingFilter { .. } => Self::Other(err.to_string()),
        }
    }
}

/// Error body returned with non-200 statuses and inside batch replies
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ApiErrorBody {
    pub code: i32,
    pub msg: String,
}

// ─── REST ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: String },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        min_qty: String,
        max_qty: String,
        step_size: String,
    },
    #[serde(rename = "MARKET_LOT_SIZE", rename_all = "camelCase")]
    MarketLotSize {
        min_qty: String,
        max_qty: String,
        step_size: String,
    },
    #[serde(rename = "MIN_NOTIONAL")]
    MinNotional { notional: String },
    #[serde(other)]
    Other,
}

/// One row of `/fapi/v1/klines`
#[derive(Debug, Clone, Deserialize)]
pub struct RestKline(
    pub i64,    // open time
    pub String, // open
    pub String, // high
    pub String, // low
    pub String, // close
    pub String, // volume
    pub i64,    // close time
    pub String, // quote asset volume
    pub u64,    // number of trades
    pub String, // taker buy base volume
    pub String, // taker buy quote volume
    pub String, // ignore
);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: u64,
    pub symbol: String,
    pub status: String,
    #[serde(default)]
    pub client_order_id: String,
    pub price: String,
    pub orig_qty: String,
    #[serde(default)]
    pub executed_qty: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    #[serde(default)]
    pub time_in_force: String,
    #[serde(default)]
    pub reduce_only: bool,
}

/// Items of a `/fapi/v1/batchOrders` reply, one per submitted order
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Rejected(ApiErrorBody),
    Accepted(OrderResponse),
}

/// Reply of cancel-all and similar acknowledgements
#[derive(Debug, Clone, Deserialize)]
pub struct CodeReply {
    pub code: i32,
    pub msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeverageReply {
    pub leverage: u32,
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKey {
    pub listen_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountState {
    pub total_margin_balance: String,
    #[serde(default)]
    pub positions: Vec<AccountPosition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPosition {
    pub symbol: String,
    pub position_amt: String,
    pub entry_price: String,
}

// ─── Streams ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WsAggTrade {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "q")]
    pub quantity: String,
    #[serde(rename = "T")]
    pub trade_time: i64,
    /// true when the buyer is the maker, i.e. the aggressor sold
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsKlineEvent {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: WsKline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsKline {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub end_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsMarkPrice {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub mark_price: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsDepth {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsUserEvent {
    #[serde(rename = "e")]
    pub event: String,
    #[serde(rename = "T", default)]
    pub transaction_time: i64,
    #[serde(rename = "o")]
    pub order: Option<WsOrderUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsOrderUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub orig_qty: String,
    #[serde(rename = "p")]
    pub price: String,
    #[serde(rename = "ap")]
    pub avg_price: String,
    #[serde(rename = "X")]
    pub status: String,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "z")]
    pub filled_qty: String,
    #[serde(rename = "N", default)]
    pub fee_asset: Option<String>,
    #[serde(rename = "n", default)]
    pub fee: Option<String>,
    #[serde(rename = "R")]
    pub reduce_only: bool,
    #[serde(rename = "rp")]
    pub realized_pnl: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_ignore_unknown_types() {
        let info: SymbolInfo = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","status":"TRADING","filters":[
                {"filterType":"PRICE_FILTER","minPrice":"556.80","maxPrice":"4529764","tickSize":"0.10"},
                {"filterType":"LOT_SIZE","maxQty":"1000","minQty":"0.001","stepSize":"0.001"},
                {"filterType":"MARKET_LOT_SIZE","maxQty":"120","minQty":"0.001","stepSize":"0.001"},
                {"filterType":"MAX_NUM_ORDERS","limit":200},
                {"filterType":"MIN_NOTIONAL","notional":"100"},
                {"filterType":"PERCENT_PRICE","multiplierUp":"1.0500","multiplierDown":"0.9500","multiplierDecimal":"4"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(info.filters.len(), 6);
        assert_eq!(info.filters[3], SymbolFilter::Other);
        assert_eq!(
            info.filters[4],
            SymbolFilter::MinNotional {
                notional: "100".to_string()
            }
        );
    }

    #[test]
    fn test_batch_items() {
        let items: Vec<BatchItem> = serde_json::from_str(
            r#"[
                {"orderId":22542179,"symbol":"BTCUSDT","status":"NEW","clientOrderId":"x","price":"60000","origQty":"0.01","executedQty":"0","type":"LIMIT","side":"BUY","timeInForce":"GTC","reduceOnly":false},
                {"code":-2022,"msg":"ReduceOnly Order is rejected."}
            ]"#,
        )
        .unwrap();
        assert!(matches!(&items[0], BatchItem::Accepted(o) if o.order_id == 22_542_179));
        assert!(matches!(&items[1], BatchItem::Rejected(e) if e.code == -2022));
    }

    #[test]
    fn test_rest_kline_row() {
        let rows: Vec<RestKline> = serde_json::from_str(
            r#"[[1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","0"]]"#,
        )
        .unwrap();
        assert_eq!(rows[0].0, 1_499_040_000_000);
        assert_eq!(rows[0].4, "0.01577100");
        assert_eq!(rows[0].6, 1_499_644_799_999);
    }
}
