use super::types::{
    ApiErrorBody, WsAggTrade, WsDepth, WsKlineEvent, WsMarkPrice, WsOrderUpdate, WsUserEvent,
};
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{Inbound, WsCodec, WsDialect};
use crate::core::kernel::ws::WsConfig;
use crate::core::precision::parse_f64;
use crate::core::types::{
    now_ms, Ask, Bid, BookDepthEvent, Interval, KLine, KLineEvent, MarkPriceEvent, OrderEvent,
    OrderSide, OrderStatus, OrderTif, OrderType, TradeEvent,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Binance drops connections after 24h; reconnect well before that.
pub const AUTO_RESET: Duration = Duration::from_secs(3600);

/// Framing of the raw `/ws/<stream>` endpoints
///
/// Subscriptions are part of the URL, so nothing is sent after connecting.
/// The server pings every few minutes and the stream answers with the same
/// payload; no client heartbeat.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinancePerpDialect;

impl BinancePerpDialect {
    pub fn ws_config() -> WsConfig {
        WsConfig::default()
            .with_handshake_timeout(Duration::from_secs(10))
            .with_auto_reset(AUTO_RESET)
    }
}

impl WsDialect for BinancePerpDialect {
    fn exchange(&self) -> &'static str {
        "bnf"
    }

    fn subscribe_message(&self, _params: &Value) -> Option<String> {
        None
    }

    fn classify(&self, text: &str) -> Inbound {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return Inbound::Malformed(e.to_string()),
        };
        if value.get("e").is_none() {
            if let Ok(error) = serde_json::from_value::<ApiErrorBody>(value) {
                return Inbound::ServerError(format!("{} {}", error.code, error.msg));
            }
        }
        Inbound::Data
    }
}

/// `wss://fstream.binance.com/ws` + `BTCUSDT` + `aggTrade` → `.../ws/btcusdt@aggTrade`
pub fn stream_url(ws_base: &str, local: &str, channel: &str) -> String {
    format!(
        "{}/{}@{}",
        ws_base.trim_end_matches('/'),
        local.to_lowercase(),
        channel
    )
}

pub fn kline_channel(interval: Interval) -> String {
    format!("kline_{}", interval.as_str())
}

pub const AGG_TRADE_CHANNEL: &str = "aggTrade";
pub const MARK_PRICE_CHANNEL: &str = "markPrice@1s";
/// Fastest update speed and deepest partial book
pub const DEPTH_CHANNEL: &str = "depth20@100ms";

/// Parse a frame if its `e` field is `event`, `None` otherwise.
fn event_data<T: DeserializeOwned>(text: &str, event: &str) -> Result<Option<T>, ExchangeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ExchangeError::decode("bnf frame", e))?;
    if value.get("e").and_then(Value::as_str) != Some(event) {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ExchangeError::decode(event, e))
}

pub fn parse_side(raw: &str) -> Result<OrderSide, ExchangeError> {
    match raw {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(ExchangeError::unsupported("order side", other)),
    }
}

pub fn parse_order_status(raw: &str) -> Result<OrderStatus, ExchangeError> {
    match raw {
        "NEW" => Ok(OrderStatus::New),
        "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" => Ok(OrderStatus::Canceled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => Err(ExchangeError::unsupported("order status", other)),
    }
}

pub fn parse_tif(raw: &str) -> Result<OrderTif, ExchangeError> {
    match raw {
        "GTC" => Ok(OrderTif::Gtc),
        "IOC" => Ok(OrderTif::Ioc),
        "FOK" => Ok(OrderTif::Fok),
        "GTX" => Ok(OrderTif::Alo),
        other => Err(ExchangeError::unsupported("time in force", other)),
    }
}

pub fn parse_order_type(raw: &str) -> Result<OrderType, ExchangeError> {
    match raw {
        "MARKET" => Ok(OrderType::Market),
        "LIMIT" => Ok(OrderType::Limit),
        "STOP_MARKET" => Ok(OrderType::StopMarket),
        "STOP" => Ok(OrderType::StopLimit),
        "TAKE_PROFIT_MARKET" => Ok(OrderType::TakeProfitMarket),
        "TAKE_PROFIT" => Ok(OrderType::TakeProfitLimit),
        other => Err(ExchangeError::unsupported("order type", other)),
    }
}

/// `<symbol>@aggTrade`
#[derive(Debug, Clone)]
pub struct AggTradeCodec {
    symbol: String,
}

impl AggTradeCodec {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl WsCodec for AggTradeCodec {
    type Message = TradeEvent;

    fn decode_message(&self, text: &str) -> Result<Vec<TradeEvent>, ExchangeError> {
        let Some(trade) = event_data::<WsAggTrade>(text, "aggTrade")? else {
            return Ok(Vec::new());
        };
        Ok(vec![TradeEvent {
            event: trade.event,
            time: trade.trade_time,
            symbol: self.symbol.clone(),
            price: parse_f64(&trade.price, "p")?,
            quantity: parse_f64(&trade.quantity, "q")?,
            // aggressor side, same letters as Hyperliquid
            side: if trade.buyer_is_maker { "A" } else { "B" }.to_string(),
            received_time: now_ms(),
        }])
    }
}

/// `<symbol>@kline_<interval>`
#[derive(Debug, Clone)]
pub struct KlineCodec {
    symbol: String,
    interval: Interval,
}

impl KlineCodec {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
        }
    }
}

impl WsCodec for KlineCodec {
    type Message = KLineEvent;

    fn decode_message(&self, text: &str) -> Result<Vec<KLineEvent>, ExchangeError> {
        let Some(event) = event_data::<WsKlineEvent>(text, "kline")? else {
            return Ok(Vec::new());
        };
        let kline = &event.kline;
        if kline.interval != self.interval.as_str() {
            return Ok(Vec::new());
        }
        Ok(vec![KLineEvent {
            event: event.event,
            open_time: kline.start_time,
            close_time: kline.end_time,
            symbol: self.symbol.clone(),
            kline: KLine {
                o: parse_f64(&kline.open, "o")?,
                h: parse_f64(&kline.high, "h")?,
                l: parse_f64(&kline.low, "l")?,
                c: parse_f64(&kline.close, "c")?,
            },
            received_time: now_ms(),
        }])
    }
}

/// `<symbol>@markPrice@1s`
#[derive(Debug, Clone)]
pub struct MarkPriceCodec {
    symbol: String,
}

impl MarkPriceCodec {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

impl WsCodec for MarkPriceCodec {
    type Message = MarkPriceEvent;

    fn decode_message(&self, text: &str) -> Result<Vec<MarkPriceEvent>, ExchangeError> {
        let Some(mark) = event_data::<WsMarkPrice>(text, "markPriceUpdate")? else {
            return Ok(Vec::new());
        };
        Ok(vec![MarkPriceEvent {
            event: mark.event,
            time: mark.event_time,
            symbol: self.symbol.clone(),
            price: parse_f64(&mark.mark_price, "p")?,
            received_time: now_ms(),
        }])
    }
}

/// `<symbol>@depth20@100ms`, a full top-20 snapshot per frame
#[derive(Debug, Clone)]
pub struct DepthCodec {
    symbol: String,
}

impl DepthCodec {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

fn parse_level(level: &[String; 2]) -> Result<(f64, f64), ExchangeError> {
    Ok((parse_f64(&level[0], "price")?, parse_f64(&level[1], "qty")?))
}

impl WsCodec for DepthCodec {
    type Message = BookDepthEvent;

    fn decode_message(&self, text: &str) -> Result<Vec<BookDepthEvent>, ExchangeError> {
        let Some(depth) = event_data::<WsDepth>(text, "depthUpdate")? else {
            return Ok(Vec::new());
        };
        let bids = depth
            .bids
            .iter()
            .map(|level| {
                parse_level(level).map(|(price, qty)| Bid {
                    price,
                    qty,
                    orders: 0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let asks = depth
            .asks
            .iter()
            .map(|level| {
                parse_level(level).map(|(price, qty)| Ask {
                    price,
                    qty,
                    orders: 0,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(vec![BookDepthEvent {
            event: depth.event,
            time: depth.event_time,
            symbol: self.symbol.clone(),
            bids,
            asks,
            received_time: now_ms(),
        }])
    }
}

/// User data stream, only `ORDER_TRADE_UPDATE` of one symbol
#[derive(Debug, Clone)]
pub struct UserDataCodec {
    local: String,
    symbol: String,
}

impl UserDataCodec {
    pub fn new(local: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            symbol: symbol.into(),
        }
    }

    fn to_event(&self, time: i64, order: &WsOrderUpdate) -> Result<OrderEvent, ExchangeError> {
        Ok(OrderEvent {
            event: "ORDER_TRADE_UPDATE".to_string(),
            time,
            symbol: self.symbol.clone(),
            order_id: order.order_id.to_string(),
            client_order_id: order.client_order_id.clone(),
            side: parse_side(&order.side)?,
            is_reduce_only: order.reduce_only,
            status: parse_order_status(&order.status)?,
            price: parse_f64(&order.price, "p")?,
            orig_qty: parse_f64(&order.orig_qty, "q")?,
            tif: Some(parse_tif(&order.time_in_force)?),
            order_type: parse_order_type(&order.order_type)?,
            avg_price: parse_f64(&order.avg_price, "ap")?,
            filled_qty: parse_f64(&order.filled_qty, "z")?,
            realized_pnl: parse_f64(&order.realized_pnl, "rp")?,
            fee: match &order.fee {
                Some(fee) => parse_f64(fee, "n")?,
                None => 0.0,
            },
            fee_asset: order.fee_asset.clone().unwrap_or_default(),
        })
    }
}

impl WsCodec for UserDataCodec {
    type Message = OrderEvent;

    fn decode_message(&self, text: &str) -> Result<Vec<OrderEvent>, ExchangeError> {
        let Some(event) = event_data::<WsUserEvent>(text, "ORDER_TRADE_UPDATE")? else {
            return Ok(Vec::new());
        };
        match &event.order {
            Some(order) if order.symbol == self.local => {
                Ok(vec![self.to_event(event.transaction_time, order)?])
            }
            _ => Ok(Vec::new()),
        }
    }
}
