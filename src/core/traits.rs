use crate::core::{
    errors::ExchangeError,
    types::{
        BatchOutcome, BookDepthEvent, ExchangeName, Interval, KLineEvent, LimitOrderInput,
        LimitOrderRequest, Market, MarkPriceEvent, Order, OrderEvent, OrderSide, Position,
        StreamEvent, TradeEvent,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lifecycle surface of a live stream.
#[async_trait]
pub trait StreamControl: Send + Sync {
    /// Idempotent; safe from any task and any state.
    async fn close(&self);

    fn is_closed(&self) -> bool;

    /// Resolves once the stream is closed for good.
    async fn closed(&self);
}

/// A stream that also accepts order requests, bypassing REST.
#[async_trait]
pub trait OrderStream: StreamControl {
    async fn open_limit_order(
        &self,
        symbol: &str,
        order: &LimitOrderRequest,
    ) -> Result<String, ExchangeError>;

    async fn open_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: f64,
        leverage: u32,
        reduce_only: bool,
    ) -> Result<(), ExchangeError>;

    async fn open_batch_limit_orders(
        &self,
        symbol: &str,
        orders: &[LimitOrderInput],
        leverage: u32,
    ) -> Result<(), ExchangeError>;

    /// Replace an order in place; `order.client_order_id` selects by client id.
    async fn modify_order(
        &self,
        symbol: &str,
        order_id: &str,
        order: &LimitOrderRequest,
    ) -> Result<(), ExchangeError>;

    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        client_order_id: Option<&str>,
    ) -> Result<(), ExchangeError>;

    async fn cancel_batch_orders(
        &self,
        symbol: &str,
        order_ids: &[String],
    ) -> Result<(), ExchangeError>;

    async fn get_pending_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError>;
}

/// Receiving end of one subscription plus its stream handle.
pub struct Subscription<T, H: ?Sized = dyn StreamControl> {
    pub handle: Arc<H>,
    pub events: mpsc::Receiver<StreamEvent<T>>,
}

impl<T, H: ?Sized + StreamControl> Subscription<T, H> {
    pub async fn recv(&mut self) -> Option<StreamEvent<T>> {
        self.events.recv().await
    }

    pub async fn close(&self) {
        self.handle.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

pub type OrderMgmtSubscription = Subscription<OrderEvent, dyn OrderStream>;

#[async_trait]
pub trait MarketDataSource {
    /// Cached static metadata, `None` for unknown symbols
    fn get_market(&self, symbol: &str) -> Option<&Market>;

    /// Last `window` candles; zero rows is an error
    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        window: usize,
    ) -> Result<Vec<KLineEvent>, ExchangeError>;

    async fn subscribe_trade_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<TradeEvent>, ExchangeError>;

    async fn subscribe_kline_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        interval: Interval,
        max_delay_ms: i64,
    ) -> Result<Subscription<KLineEvent>, ExchangeError>;

    async fn subscribe_mark_price_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<MarkPriceEvent>, ExchangeError>;

    async fn subscribe_book_depth_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<BookDepthEvent>, ExchangeError>;
}

#[async_trait]
pub trait OrderPlacer {
    async fn get_pending_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError>;

    async fn open_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: f64,
        leverage: u32,
        reduce_only: bool,
    ) -> Result<(), ExchangeError>;

    /// Returns the exchange order id
    async fn open_limit_order(
        &self,
        symbol: &str,
        order: &LimitOrderRequest,
    ) -> Result<String, ExchangeError>;

    /// Partial success is reported through [`BatchOutcome::errors`]
    async fn open_batch_limit_orders(
        &self,
        symbol: &str,
        orders: &[LimitOrderInput],
        leverage: u32,
    ) -> Result<BatchOutcome, ExchangeError>;

    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        client_order_id: Option<&str>,
    ) -> Result<(), ExchangeError>;

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError>;

    async fn cancel_batch_orders(
        &self,
        symbol: &str,
        order_ids: &[String],
    ) -> Result<(), ExchangeError>;
}

#[async_trait]
pub trait AccountInfo {
    /// Account value in USD
    async fn get_account_balance(&self) -> Result<f64, ExchangeError>;

    async fn get_active_positions(&self, symbol: &str) -> Result<Vec<Position>, ExchangeError>;

    /// Flatten every position on `symbol` with reduce-only market orders
    async fn close_active_positions(&self, symbol: &str, leverage: u32)
        -> Result<(), ExchangeError>;

    /// Order updates for `symbol`; never delay filtered
    async fn subscribe_order_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> Result<Subscription<OrderEvent>, ExchangeError>;
}

/// Unified capability surface of one exchange account
#[async_trait]
pub trait Exchange: MarketDataSource + OrderPlacer + AccountInfo + Send + Sync {
    fn name(&self) -> ExchangeName;

    /// Stream carrying order requests and their order updates
    async fn connect_order_mgmt_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> Result<OrderMgmtSubscription, ExchangeError>;

    fn to_uni_symbol(&self, local: &str) -> Result<String, ExchangeError>;

    fn to_loc_symbol(&self, universal: &str) -> Result<String, ExchangeError>;
}
