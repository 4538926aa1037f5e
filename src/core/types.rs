use crate::core::errors::ExchangeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Exchanges with an adapter in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeName {
    #[serde(rename = "bnf")]
    BinancePerp,
    #[serde(rename = "hpl")]
    Hyperliquid,
}

impl ExchangeName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BinancePerp => "bnf",
            Self::Hyperliquid => "hpl",
        }
    }
}

impl fmt::Display for ExchangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeName {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bnf" => Ok(Self::BinancePerp),
            "hpl" => Ok(Self::Hyperliquid),
            other => Err(ExchangeError::UnsupportedExchange(other.to_string())),
        }
    }
}

/// Kline interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1s")]
    OneSecond,
    #[serde(rename = "15s")]
    FifteenSeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneSecond => "1s",
            Self::FifteenSeconds => "15s",
            Self::OneMinute => "1m",
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }

    pub const fn duration(self) -> Duration {
        match self {
            Self::OneSecond => Duration::from_secs(1),
            Self::FifteenSeconds => Duration::from_secs(15),
            Self::OneMinute => Duration::from_secs(60),
            Self::FiveMinutes => Duration::from_secs(5 * 60),
            Self::FifteenMinutes => Duration::from_secs(15 * 60),
            Self::OneHour => Duration::from_secs(60 * 60),
            Self::FourHours => Duration::from_secs(4 * 60 * 60),
            Self::OneDay => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub const fn as_millis(self) -> i64 {
        self.duration().as_millis() as i64
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "1s" => Self::OneSecond,
            "15s" => Self::FifteenSeconds,
            "1m" => Self::OneMinute,
            "5m" => Self::FiveMinutes,
            "15m" => Self::FifteenMinutes,
            "1h" => Self::OneHour,
            "4h" => Self::FourHours,
            "1d" => Self::OneDay,
            other => return Err(ExchangeError::unsupported("interval", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub const fn is_buy(self) -> bool {
        matches!(self, Self::Buy)
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        })
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderTif {
    Gtc,
    Ioc,
    Fok,
    /// Add liquidity only (post-only)
    Alo,
}

impl fmt::Display for OrderTif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gtc => "GTC",
            Self::Ioc => "IOC",
            Self::Fok => "FOK",
            Self::Alo => "ALO",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    TakeProfitMarket,
    TakeProfitLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

/// One leg of a batch limit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderInput {
    pub side: OrderSide,
    pub price: f64,
    pub qty: f64,
    pub tif: OrderTif,
}

/// Parameters of a single limit order.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitOrderRequest {
    pub side: OrderSide,
    pub price: f64,
    pub qty: f64,
    pub leverage: u32,
    pub reduce_only: bool,
    pub tif: OrderTif,
    pub client_order_id: Option<String>,
}

impl LimitOrderRequest {
    pub fn new(side: OrderSide, price: f64, qty: f64, leverage: u32) -> Self {
        Self {
            side,
            price,
            qty,
            leverage,
            reduce_only: false,
            tif: OrderTif::Gtc,
            client_order_id: None,
        }
    }

    pub const fn tif(mut self, tif: OrderTif) -> Self {
        self.tif = tif;
        self
    }

    pub const fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }
}

/// Result of a batch placement: accepted order ids plus per-item errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub order_ids: Vec<String>,
    /// `(index in the request, exchange error message)`
    pub errors: Vec<(usize, String)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Static per-symbol trading constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Market id or asset index, used by some wire formats
    pub id: u32,
    pub exchange_name: ExchangeName,
    /// Local symbol
    pub symbol: String,
    pub tick_size: f64,
    pub min_notional: f64,
    pub lot_min_qty: f64,
    pub lot_max_qty: f64,
    pub lot_step_size: f64,
    pub market_lot_min_qty: f64,
    pub market_lot_max_qty: f64,
    pub market_lot_step_size: f64,
    pub max_leverage: f64,
    /// e.g. 0.0001 means 1bps
    pub maker_fee_pct: f64,
    pub taker_fee_pct: f64,
}

/// Pending order snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub price: f64,
    pub original_qty: f64,
    pub remaining_qty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub entry_price: f64,
    /// Always positive, direction is in `side`
    pub qty: f64,
    pub side: OrderSide,
}

/// Subscription kinds, one stream per kind and symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Trade,
    KLine,
    MarkPrice,
    BookDepth,
    Order,
    OrderMgmt,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trade => "trade",
            Self::KLine => "kline",
            Self::MarkPrice => "mark_price",
            Self::BookDepth => "book_depth",
            Self::Order => "order",
            Self::OrderMgmt => "order_mgmt",
        })
    }
}

/// Events carrying an exchange timestamp, checked by the delay filter.
pub trait TimedEvent {
    /// Exchange side timestamp in milliseconds
    fn event_time_ms(&self) -> i64;

    /// Zero value events are discarded before delivery.
    fn is_empty(&self) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub event: String,
    pub time: i64,
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    pub side: String,
    pub received_time: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KLine {
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KLineEvent {
    pub event: String,
    pub open_time: i64,
    pub close_time: i64,
    pub symbol: String,
    pub kline: KLine,
    pub received_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkPriceEvent {
    pub event: String,
    pub time: i64,
    pub symbol: String,
    pub price: f64,
    pub received_time: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    pub price: f64,
    pub qty: f64,
    /// Number of orders at this level, zero when the exchange does not report it
    pub orders: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ask {
    pub price: f64,
    pub qty: f64,
    pub orders: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookDepthEvent {
    pub event: String,
    pub time: i64,
    pub symbol: String,
    pub bids: Vec<Bid>,
    pub asks: Vec<Ask>,
    pub received_time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event: String,
    pub time: i64,
    pub symbol: String,
    pub order_id: String,
    pub client_order_id: String,
    pub side: OrderSide,
    pub is_reduce_only: bool,
    pub status: OrderStatus,
    pub price: f64,
    pub orig_qty: f64,
    pub tif: Option<OrderTif>,
    pub order_type: OrderType,

    // valid once the order is (partially) filled
    pub avg_price: f64,
    pub filled_qty: f64,
    pub realized_pnl: f64,
    pub fee: f64,
    pub fee_asset: String,
}

impl TimedEvent for TradeEvent {
    fn event_time_ms(&self) -> i64 {
        self.time
    }

    fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

impl TimedEvent for KLineEvent {
    fn event_time_ms(&self) -> i64 {
        self.close_time
    }

    fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

impl TimedEvent for MarkPriceEvent {
    fn event_time_ms(&self) -> i64 {
        self.time
    }

    fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

impl TimedEvent for BookDepthEvent {
    fn event_time_ms(&self) -> i64 {
        self.time
    }

    fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

impl TimedEvent for OrderEvent {
    fn event_time_ms(&self) -> i64 {
        self.time
    }

    fn is_empty(&self) -> bool {
        self.event.is_empty()
    }
}

/// Lifecycle and data notifications delivered to a subscriber, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
    /// First successful connection and subscription
    Connected,
    Event(T),
    /// Emitted once after an intentional close
    Closed,
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
