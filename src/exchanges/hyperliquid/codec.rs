use super::types::{
    Candle, WsActiveAssetCtx, WsBook, WsFrame, WsLevel, WsOrderUpdate, WsTrade,
};
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{Inbound, WsCodec, WsDialect};
use crate::core::kernel::ws::WsConfig;
use crate::core::precision::parse_f64;
use crate::core::types::{
    now_ms, Ask, Bid, BookDepthEvent, Interval, KLine, KLineEvent, MarkPriceEvent, OrderEvent,
    OrderSide, OrderStatus, OrderType, TradeEvent,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::error;

/// Framing shared by every Hyperliquid channel
///
/// - subscribe: `{"method":"subscribe","subscription":{..}}`
/// - heartbeat: `{"method":"ping"}`, answered on channel `pong`
/// - stream posts are answered on channel `post` with the request `id`
#[derive(Debug, Clone, Copy, Default)]
pub struct HyperliquidDialect;

impl HyperliquidDialect {
    pub fn ws_config() -> WsConfig {
        WsConfig::default()
            .with_handshake_timeout(Duration::from_secs(5))
            .with_heartbeat(Duration::from_secs(55))
            .with_response_timeout(Duration::from_secs(5))
    }
}

impl WsDialect for HyperliquidDialect {
    fn exchange(&self) -> &'static str {
        "hpl"
    }

    fn subscribe_message(&self, params: &Value) -> Option<String> {
        Some(json!({ "method": "subscribe", "subscription": params }).to_string())
    }

    fn ping_message(&self) -> Option<String> {
        Some(r#"{"method":"ping"}"#.to_string())
    }

    fn classify(&self, text: &str) -> Inbound {
        let frame: WsFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => return Inbound::Malformed(e.to_string()),
        };

        match frame.channel.as_str() {
            "pong" => Inbound::Pong,
            "error" => Inbound::ServerError(match frame.data {
                Value::String(message) => message,
                other => other.to_string(),
            }),
            "post" => match frame.data.get("id").and_then(Value::as_u64) {
                Some(id) => Inbound::Reply {
                    id,
                    body: frame.data.get("response").cloned().unwrap_or(Value::Null),
                },
                None => Inbound::Data,
            },
            _ => Inbound::Data,
        }
    }
}

/// Parse `data` of a frame on `channel`; `None` for any other channel,
/// `subscriptionResponse` acknowledgements included.
fn channel_data<T: DeserializeOwned>(text: &str, channel: &str) -> Result<Option<T>, ExchangeError> {
    let frame: WsFrame =
        serde_json::from_str(text).map_err(|e| ExchangeError::decode("hpl frame", e))?;
    if frame.channel != channel {
        return Ok(None);
    }
    serde_json::from_value(frame.data)
        .map(Some)
        .map_err(|e| ExchangeError::decode(channel, e))
}

pub fn parse_side(raw: &str) -> Result<OrderSide, ExchangeError> {
    match raw {
        "B" | "b" => Ok(OrderSide::Buy),
        "A" | "a" => Ok(OrderSide::Sell),
        other => Err(ExchangeError::unsupported("order side", other)),
    }
}

pub fn parse_order_status(raw: &str) -> Result<OrderStatus, ExchangeError> {
    match raw {
        "open" => Ok(OrderStatus::New),
        "filled" => Ok(OrderStatus::Filled),
        "canceled" => Ok(OrderStatus::Canceled),
        "rejected" => Ok(OrderStatus::Rejected),
        other => Err(ExchangeError::unsupported("order status", other)),
    }
}

pub fn candle_to_kline(candle: &Candle, symbol: &str, event: &str) -> Result<KLineEvent, ExchangeError> {
    Ok(KLineEvent {
        event: event.to_string(),
        open_time: candle.open_time,
        close_time: candle.close_time,
        symbol: symbol.to_string(),
        kline: KLine {
            o: parse_f64(&candle.open, "open")?,
            h: parse_f64(&candle.high, "high")?,
            l: parse_f64(&candle.low, "low")?,
            c: parse_f64(&candle.close, "close")?,
        },
        received_time: now_ms(),
    })
}

/// `trades` channel of one coin
#[derive(Debug, Clone)]
pub struct TradesCodec {
    coin: String,
    symbol: String,
}

impl TradesCodec {
    pub fn new(coin: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            coin: coin.into(),
            symbol: symbol.into(),
        }
    }
}

impl WsCodec for TradesCodec {
    type Message = TradeEvent;

    fn subscription(&self) -> Option<Value> {
        Some(json!({ "type": "trades", "coin": self.coin }))
    }

    fn decode_message(&self, text: &str) -> Result<Vec<TradeEvent>, ExchangeError> {
        let Some(trades) = channel_data::<Vec<WsTrade>>(text, "trades")? else {
            return Ok(Vec::new());
        };
        let received_time = now_ms();

        trades
            .iter()
            .filter(|trade| trade.coin == self.coin)
            .map(|trade| {
                Ok(TradeEvent {
                    event: "trades".to_string(),
                    time: trade.time,
                    symbol: self.symbol.clone(),
                    price: parse_f64(&trade.px, "px")?,
                    quantity: parse_f64(&trade.sz, "sz")?,
                    side: trade.side.clone(),
                    received_time,
                })
            })
            .collect()
    }
}

/// `candle` channel of one coin and interval
#[derive(Debug, Clone)]
pub struct CandleCodec {
    coin: String,
    symbol: String,
    interval: Interval,
}

impl CandleCodec {
    pub fn new(coin: impl Into<String>, symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            coin: coin.into(),
            symbol: symbol.into(),
            interval,
        }
    }
}

impl WsCodec for CandleCodec {
    type Message = KLineEvent;

    fn subscription(&self) -> Option<Value> {
        Some(json!({ "type": "candle", "coin": self.coin, "interval": self.interval.as_str() }))
    }

    fn decode_message(&self, text: &str) -> Result<Vec<KLineEvent>, ExchangeError> {
        let Some(candle) = channel_data::<Candle>(text, "candle")? else {
            return Ok(Vec::new());
        };
        // another coin or interval multiplexed on the same socket
        if candle.coin != self.coin
            || (!candle.interval.is_empty() && candle.interval != self.interval.as_str())
        {
            return Ok(Vec::new());
        }
        Ok(vec![candle_to_kline(&candle, &self.symbol, "candle")?])
    }
}

/// `activeAssetCtx` channel, source of the mark price
#[derive(Debug, Clone)]
pub struct ActiveAssetCtxCodec {
    coin: String,
    symbol: String,
}

impl ActiveAssetCtxCodec {
    pub fn new(coin: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            coin: coin.into(),
            symbol: symbol.into(),
        }
    }
}

impl WsCodec for ActiveAssetCtxCodec {
    type Message = MarkPriceEvent;

    fn subscription(&self) -> Option<Value> {
        Some(json!({ "type": "activeAssetCtx", "coin": self.coin }))
    }

    fn decode_message(&self, text: &str) -> Result<Vec<MarkPriceEvent>, ExchangeError> {
        let Some(ctx) = channel_data::<WsActiveAssetCtx>(text, "activeAssetCtx")? else {
            return Ok(Vec::new());
        };
        if ctx.coin != self.coin {
            return Ok(Vec::new());
        }
        // the channel carries no timestamp
        let now = now_ms();
        Ok(vec![MarkPriceEvent {
            event: "activeAssetCtx".to_string(),
            time: now,
            symbol: self.symbol.clone(),
            price: parse_f64(&ctx.ctx.mark_px, "markPx")?,
            received_time: now,
        }])
    }
}

/// `l2Book` channel; `levels[0]` are bids, `levels[1]` asks
#[derive(Debug, Clone)]
pub struct L2BookCodec {
    coin: String,
    symbol: String,
}

impl L2BookCodec {
    pub fn new(coin: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            coin: coin.into(),
            symbol: symbol.into(),
        }
    }
}

fn parse_levels(levels: Option<&Vec<WsLevel>>) -> Result<Vec<(f64, f64, u32)>, ExchangeError> {
    levels
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|level| {
            Ok((
                parse_f64(&level.px, "px")?,
                parse_f64(&level.sz, "sz")?,
                level.n,
            ))
        })
        .collect()
}

impl WsCodec for L2BookCodec {
    type Message = BookDepthEvent;

    fn subscription(&self) -> Option<Value> {
        Some(json!({ "type": "l2Book", "coin": self.coin }))
    }

    fn decode_message(&self, text: &str) -> Result<Vec<BookDepthEvent>, ExchangeError> {
        let Some(book) = channel_data::<WsBook>(text, "l2Book")? else {
            return Ok(Vec::new());
        };
        if book.coin != self.coin {
            return Ok(Vec::new());
        }

        let bids = parse_levels(book.levels.first())?
            .into_iter()
            .map(|(price, qty, orders)| Bid { price, qty, orders })
            .collect();
        let asks = parse_levels(book.levels.get(1))?
            .into_iter()
            .map(|(price, qty, orders)| Ask { price, qty, orders })
            .collect();

        Ok(vec![BookDepthEvent {
            event: "l2Book".to_string(),
            time: book.time,
            symbol: self.symbol.clone(),
            bids,
            asks,
            received_time: now_ms(),
        }])
    }
}

/// `orderUpdates` channel of one user, narrowed to one coin
#[derive(Debug, Clone)]
pub struct OrderUpdatesCodec {
    user: String,
    coin: String,
    symbol: String,
}

impl OrderUpdatesCodec {
    pub fn new(user: impl Into<String>, coin: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            coin: coin.into(),
            symbol: symbol.into(),
        }
    }

    fn to_event(&self, update: &WsOrderUpdate) -> Result<OrderEvent, ExchangeError> {
        let order = &update.order;
        let orig_qty = parse_f64(&order.orig_sz, "origSz")?;
        let remaining = parse_f64(&order.sz, "sz")?;

        Ok(OrderEvent {
            event: "orderUpdates".to_string(),
            time: update.status_timestamp,
            symbol: self.symbol.clone(),
            order_id: order.oid.to_string(),
            client_order_id: order.cloid.clone().unwrap_or_default(),
            side: parse_side(&order.side)?,
            // not reported on this channel
            is_reduce_only: false,
            status: parse_order_status(&update.status)?,
            price: parse_f64(&order.limit_px, "limitPx")?,
            orig_qty,
            tif: None,
            order_type: OrderType::Limit,
            avg_price: 0.0,
            filled_qty: orig_qty - remaining,
            realized_pnl: 0.0,
            fee: 0.0,
            fee_asset: String::new(),
        })
    }
}

impl WsCodec for OrderUpdatesCodec {
    type Message = OrderEvent;

    fn subscription(&self) -> Option<Value> {
        Some(json!({ "type": "orderUpdates", "user": self.user }))
    }

    fn decode_message(&self, text: &str) -> Result<Vec<OrderEvent>, ExchangeError> {
        let frame: WsFrame =
            serde_json::from_str(text).map_err(|e| ExchangeError::decode("hpl frame", e))?;

        match frame.channel.as_str() {
            "orderUpdates" => {
                let updates: Vec<WsOrderUpdate> = serde_json::from_value(frame.data)
                    .map_err(|e| ExchangeError::decode("orderUpdates", e))?;
                updates
                    .iter()
                    .filter(|update| update.order.coin == self.coin)
                    .map(|update| self.to_event(update))
                    .collect()
            }
            // post replies nobody waited for anymore
            "post" => {
                if frame.data["response"]["type"] == "error" {
                    error!(response = %text, "order request rejected");
                }
                Ok(Vec::new())
            }
            _ => Ok(Vec::new()),
        }
    }
}
