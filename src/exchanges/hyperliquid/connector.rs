use super::actions::{
    batch_outcome, ensure_cancelled, ensure_ok, first_order_id, market_limit_price, order_ref,
    order_statuses, order_wire, parse_oid, parse_open_order,
};
use super::codec::{
    candle_to_kline, ActiveAssetCtxCodec, CandleCodec, HyperliquidDialect, L2BookCodec,
    OrderUpdatesCodec, TradesCodec,
};
use super::rest::HyperliquidRest;
use super::stream::HyperliquidOrderStream;
use super::types::{Action, CancelByCloidWire, CancelWire, OrderRef, OrderWire};
use crate::core::errors::ExchangeError;
use crate::core::filter::Filtered;
use crate::core::kernel::{ReqwestRest, RestClient, WsStream};
use crate::core::precision::parse_f64;
use crate::core::symbols::SymbolMap;
use crate::core::traits::{
    AccountInfo, Exchange, MarketDataSource, OrderMgmtSubscription, OrderPlacer, OrderStream,
    Subscription,
};
use crate::core::types::{
    now_ms, BatchOutcome, BookDepthEvent, ExchangeName, Interval, KLineEvent, LimitOrderInput,
    LimitOrderRequest, Market, MarkPriceEvent, Order, OrderEvent, OrderSide, OrderTif, Position,
    StreamKind, TradeEvent,
};
use crate::exchanges::binance_perp::codec::{self as bnf_codec, BinancePerpDialect};
use crate::exchanges::binance_perp::rest::BinancePerpRest;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Binance USDⓈ-M source used for klines instead of Hyperliquid candles
#[derive(Debug)]
pub struct BinanceKlines {
    pub rest: BinancePerpRest<ReqwestRest>,
    pub ws_url: String,
}

impl BinanceKlines {
    /// `BTC_USD` → `BTCUSDT`
    pub fn symbol(universal: &str) -> String {
        format!("{}T", universal.replace('_', ""))
    }
}

/// State shared by the connector and its order management streams
pub(crate) struct Shared<R: RestClient> {
    pub rest: HyperliquidRest<R>,
    pub symbols: SymbolMap,
    /// keyed by local coin name
    pub markets: HashMap<String, Market>,
    /// last leverage set per local coin
    pub leverage: Mutex<HashMap<String, u32>>,
    pub is_cross: bool,
    pub ws_url: String,
    pub binance_klines: Option<BinanceKlines>,
}

impl<R: RestClient> Shared<R> {
    pub fn resolve(&self, symbol: &str) -> Result<(&str, &Market), ExchangeError> {
        let local = self.symbols.to_local(symbol)?;
        let market = self
            .markets
            .get(local)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        Ok((local, market))
    }

    /// Push `leverage` to the exchange unless it is already the cached value.
    pub async fn ensure_leverage(
        &self,
        local: &str,
        market: &Market,
        leverage: u32,
    ) -> Result<(), ExchangeError> {
        if self.leverage.lock().get(local) == Some(&leverage) {
            return Ok(());
        }

        let action = Action::update_leverage(market.id, self.is_cross, leverage);
        ensure_ok(self.rest.exchange(action).await?)?;
        self.leverage.lock().insert(local.to_string(), leverage);
        info!(coin = %local, leverage, is_cross = self.is_cross, "leverage updated");
        Ok(())
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        window: usize,
    ) -> Result<Vec<KLineEvent>, ExchangeError> {
        if window == 0 {
            return Err(ExchangeError::InvalidParameters(
                "kline window must be at least 1".to_string(),
            ));
        }
        let (local, _) = self.resolve(symbol)?;
        if let Some(binance) = &self.binance_klines {
            return binance
                .rest
                .get_klines(&BinanceKlines::symbol(symbol), symbol, interval, window)
                .await;
        }

        let span = interval.as_millis();
        let now = now_ms();
        let start_time = now - span * (window as i64 + 1);
        let end_time = now + span;

        let candles = self
            .rest
            .get_candle_snapshot(local, interval, start_time, end_time)
            .await?;
        if candles.is_empty() {
            return Err(ExchangeError::Other("no klines data available".to_string()));
        }

        let skip = candles.len().saturating_sub(window);
        candles[skip..]
            .iter()
            .map(|candle| candle_to_kline(candle, symbol, "candleSnapshot"))
            .collect()
    }

    /// IOC limit order priced off the last one minute close.
    pub async fn market_order_wire(
        &self,
        symbol: &str,
        market: &Market,
        side: OrderSide,
        qty: f64,
        reduce_only: bool,
    ) -> Result<OrderWire, ExchangeError> {
        let klines = self.get_klines(symbol, Interval::OneMinute, 1).await?;
        let last_close = klines
            .last()
            .map(|k| k.kline.c)
            .ok_or_else(|| ExchangeError::Other("cannot get klines".to_string()))?;

        order_wire(
            market,
            side,
            market_limit_price(last_close, side),
            qty,
            reduce_only,
            OrderTif::Ioc,
            None,
        )
    }

    pub fn batch_wires(
        &self,
        market: &Market,
        orders: &[LimitOrderInput],
    ) -> Result<Vec<OrderWire>, ExchangeError> {
        if orders.is_empty() {
            return Err(ExchangeError::InvalidParameters(
                "batch contains no orders".to_string(),
            ));
        }
        orders
            .iter()
            .map(|o| order_wire(market, o.side, o.price, o.qty, false, o.tif, None))
            .collect()
    }

    pub fn cancel_action(
        market: &Market,
        order_id: &str,
        client_order_id: Option<&str>,
    ) -> Result<Action, ExchangeError> {
        Ok(match order_ref(order_id, client_order_id)? {
            OrderRef::Cloid(cloid) => Action::cancel_by_cloid(vec![CancelByCloidWire {
                asset: market.id,
                cloid,
            }]),
            OrderRef::Oid(oid) => Action::cancel(vec![CancelWire {
                asset: market.id,
                oid,
            }]),
        })
    }

    pub fn batch_cancel_action(market: &Market, order_ids: &[String]) -> Result<Action, ExchangeError> {
        let cancels = order_ids
            .iter()
            .map(|id| {
                Ok(CancelWire {
                    asset: market.id,
                    oid: parse_oid(id)?,
                })
            })
            .collect::<Result<Vec<_>, ExchangeError>>()?;
        Ok(Action::cancel(cancels))
    }
}

/// Hyperliquid adapter
///
/// Market data comes from dedicated streams, orders and account queries go
/// through `/exchange` and `/info`. Cheap to clone.
pub struct HyperliquidConnector<R: RestClient> {
    shared: Arc<Shared<R>>,
}

impl<R: RestClient> Clone for HyperliquidConnector<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: RestClient + 'static> HyperliquidConnector<R> {
    pub fn new(
        rest: HyperliquidRest<R>,
        symbols: SymbolMap,
        markets: HashMap<String, Market>,
        ws_url: String,
        is_cross: bool,
        binance_klines: Option<BinanceKlines>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                rest,
                symbols,
                markets,
                leverage: Mutex::new(HashMap::new()),
                is_cross,
                ws_url,
                binance_klines,
            }),
        }
    }

    pub fn wallet_address(&self) -> &str {
        self.shared.rest.wallet_address()
    }

    pub fn uses_binance_klines(&self) -> bool {
        self.shared.binance_klines.is_some()
    }

    /// Leverage currently cached for `symbol`
    pub fn cached_leverage(&self, symbol: &str) -> Option<u32> {
        let local = self.shared.symbols.to_local(symbol).ok()?;
        self.shared.leverage.lock().get(local).copied()
    }

    async fn subscribe<C>(
        &self,
        kind: StreamKind,
        codec: C,
        cancel: CancellationToken,
    ) -> Result<Subscription<C::Message>, ExchangeError>
    where
        C: crate::core::kernel::WsCodec,
    {
        WsStream::subscribe(
            self.shared.ws_url.as_str(),
            kind,
            HyperliquidDialect::ws_config(),
            Arc::new(HyperliquidDialect),
            codec,
            cancel,
        )
        .await
    }
}

#[async_trait]
impl<R: RestClient + 'static> MarketDataSource for HyperliquidConnector<R> {
    fn get_market(&self, symbol: &str) -> Option<&Market> {
        self.shared.resolve(symbol).ok().map(|(_, market)| market)
    }

    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        window: usize,
    ) -> Result<Vec<KLineEvent>, ExchangeError> {
        self.shared.get_klines(symbol, interval, window).await
    }

    async fn subscribe_trade_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<TradeEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let codec = Filtered::new(TradesCodec::new(local, symbol), max_delay_ms);
        self.subscribe(StreamKind::Trade, codec, cancel).await
    }

    async fn subscribe_kline_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        interval: Interval,
        max_delay_ms: i64,
    ) -> Result<Subscription<KLineEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        if let Some(binance) = &self.shared.binance_klines {
            let binance_local = BinanceKlines::symbol(symbol);
            let url = bnf_codec::stream_url(
                &binance.ws_url,
                &binance_local,
                &bnf_codec::kline_channel(interval),
            );
            let codec = Filtered::new(bnf_codec::KlineCodec::new(symbol, interval), max_delay_ms);
            return WsStream::subscribe(
                url,
                StreamKind::KLine,
                BinancePerpDialect::ws_config(),
                Arc::new(BinancePerpDialect),
                codec,
                cancel,
            )
            .await;
        }

        let codec = Filtered::new(CandleCodec::new(local, symbol, interval), max_delay_ms);
        self.subscribe(StreamKind::KLine, codec, cancel).await
    }

    async fn subscribe_mark_price_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<MarkPriceEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let codec = Filtered::new(ActiveAssetCtxCodec::new(local, symbol), max_delay_ms);
        self.subscribe(StreamKind::MarkPrice, codec, cancel).await
    }

    async fn subscribe_book_depth_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<BookDepthEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let codec = Filtered::new(L2BookCodec::new(local, symbol), max_delay_ms);
        self.subscribe(StreamKind::BookDepth, codec, cancel).await
    }
}

#[async_trait]
impl<R: RestClient + 'static> OrderPlacer for HyperliquidConnector<R> {
    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn get_pending_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        self.shared
            .rest
            .get_open_orders()
            .await?
            .iter()
            .filter(|order| order.coin == local)
            .map(|order| parse_open_order(order, symbol))
            .collect()
    }

    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn open_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: f64,
        leverage: u32,
        reduce_only: bool,
    ) -> Result<(), ExchangeError> {
        let (local, market) = self.shared.resolve(symbol)?;
        self.shared.ensure_leverage(local, market, leverage).await?;

        let wire = self
            .shared
            .market_order_wire(symbol, market, side, qty, reduce_only)
            .await?;
        let statuses = order_statuses(self.shared.rest.exchange(Action::order(vec![wire])).await?)?;
        first_order_id(&statuses).map(|_| ())
    }

    #[instrument(skip(self, order), fields(exchange = "hpl", symbol = %symbol))]
    async fn open_limit_order(
        &self,
        symbol: &str,
        order: &LimitOrderRequest,
    ) -> Result<String, ExchangeError> {
        let (local, market) = self.shared.resolve(symbol)?;
        self.shared
            .ensure_leverage(local, market, order.leverage)
            .await?;

        let wire = order_wire(
            market,
            order.side,
            order.price,
            order.qty,
            order.reduce_only,
            order.tif,
            order.client_order_id.clone(),
        )?;
        let statuses = order_statuses(self.shared.rest.exchange(Action::order(vec![wire])).await?)?;
        first_order_id(&statuses)
    }

    #[instrument(skip(self, orders), fields(exchange = "hpl", symbol = %symbol, count = orders.len()))]
    async fn open_batch_limit_orders(
        &self,
        symbol: &str,
        orders: &[LimitOrderInput],
        leverage: u32,
    ) -> Result<BatchOutcome, ExchangeError> {
        let (local, market) = self.shared.resolve(symbol)?;
        let wires = self.shared.batch_wires(market, orders)?;
        self.shared.ensure_leverage(local, market, leverage).await?;

        let statuses = order_statuses(self.shared.rest.exchange(Action::order(wires)).await?)?;
        let outcome = batch_outcome(&statuses);
        for (index, message) in &outcome.errors {
            tracing::error!(index, %message, "batch order rejected");
        }
        Ok(outcome)
    }

    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        client_order_id: Option<&str>,
    ) -> Result<(), ExchangeError> {
        let (_, market) = self.shared.resolve(symbol)?;
        let action = Shared::<R>::cancel_action(market, order_id, client_order_id)?;
        ensure_cancelled(self.shared.rest.exchange(action).await?)
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> Result<(), ExchangeError> {
        Err(ExchangeError::NotImplemented("hpl cancel_all_orders"))
    }

    #[instrument(skip(self, order_ids), fields(exchange = "hpl", symbol = %symbol, count = order_ids.len()))]
    async fn cancel_batch_orders(
        &self,
        symbol: &str,
        order_ids: &[String],
    ) -> Result<(), ExchangeError> {
        if order_ids.is_empty() {
            return Ok(());
        }
        let (_, market) = self.shared.resolve(symbol)?;
        let action = Shared::<R>::batch_cancel_action(market, order_ids)?;
        ensure_cancelled(self.shared.rest.exchange(action).await?)
    }
}

#[async_trait]
impl<R: RestClient + 'static> AccountInfo for HyperliquidConnector<R> {
    #[instrument(skip(self), fields(exchange = "hpl"))]
    async fn get_account_balance(&self) -> Result<f64, ExchangeError> {
        let state = self.shared.rest.get_clearinghouse_state().await?;
        parse_f64(&state.margin_summary.account_value, "accountValue")
    }

    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn get_active_positions(&self, symbol: &str) -> Result<Vec<Position>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let state = self.shared.rest.get_clearinghouse_state().await?;

        state
            .asset_positions
            .iter()
            .filter(|asset| asset.position.coin == local)
            .map(|asset| {
                let size = parse_f64(&asset.position.szi, "szi")?;
                let entry_price = match &asset.position.entry_px {
                    Some(px) => parse_f64(px, "entryPx")?,
                    None => 0.0,
                };
                Ok(Position {
                    entry_price,
                    qty: size.abs(),
                    side: if size < 0.0 {
                        OrderSide::Sell
                    } else {
                        OrderSide::Buy
                    },
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn close_active_positions(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        for position in self.get_active_positions(symbol).await? {
            if position.qty > 0.0 {
                self.open_market_order(symbol, position.side.opposite(), position.qty, leverage, true)
                    .await?;
            }
        }
        Ok(())
    }

    async fn subscribe_order_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> Result<Subscription<OrderEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let codec = OrderUpdatesCodec::new(self.wallet_address(), local, symbol);
        self.subscribe(StreamKind::Order, codec, cancel).await
    }
}

#[async_trait]
impl<R: RestClient + 'static> Exchange for HyperliquidConnector<R> {
    fn name(&self) -> ExchangeName {
        ExchangeName::Hyperliquid
    }

    #[instrument(skip(self, cancel), fields(exchange = "hpl", symbol = %symbol))]
    async fn connect_order_mgmt_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> Result<OrderMgmtSubscription, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let stream = Arc::new(WsStream::new(
            self.shared.ws_url.as_str(),
            StreamKind::OrderMgmt,
            HyperliquidDialect::ws_config(),
            Arc::new(HyperliquidDialect),
        ));
        let (tx, rx) = mpsc::channel(stream.config().event_buffer.max(1));

        let codec = OrderUpdatesCodec::new(self.wallet_address(), local, symbol);
        stream.connect_and_subscribe(codec, tx).await?;
        stream.bind_to(cancel);

        let handle: Arc<dyn OrderStream> =
            Arc::new(HyperliquidOrderStream::new(stream, Arc::clone(&self.shared)));
        Ok(Subscription { handle, events: rx })
    }

    fn to_uni_symbol(&self, local: &str) -> Result<String, ExchangeError> {
        self.shared.symbols.to_universal(local).map(str::to_string)
    }

    fn to_loc_symbol(&self, universal: &str) -> Result<String, ExchangeError> {
        self.shared.symbols.to_local(universal).map(str::to_string)
    }
}
