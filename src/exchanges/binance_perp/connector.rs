use super::codec::{
    kline_channel, parse_order_type, parse_side, stream_url, AggTradeCodec, BinancePerpDialect,
    DepthCodec, KlineCodec, MarkPriceCodec, UserDataCodec, AGG_TRADE_CHANNEL, DEPTH_CHANNEL,
    MARK_PRICE_CHANNEL,
};
use super::rest::BinancePerpRest;
use super::types::{BatchItem, BinancePerpError, ExchangeInfo, OrderResponse, SymbolFilter};
use crate::core::errors::ExchangeError;
use crate::core::filter::Filtered;
use crate::core::kernel::{RestClient, WsCodec, WsStream};
use crate::core::precision::{parse_f64, quantize, quantize_qty};
use crate::core::symbols::SymbolMap;
use crate::core::traits::{
    AccountInfo, Exchange, MarketDataSource, OrderMgmtSubscription, OrderPlacer, StreamControl,
    Subscription,
};
use crate::core::types::{
    BatchOutcome, BookDepthEvent, ExchangeName, Interval, KLineEvent, LimitOrderInput,
    LimitOrderRequest, Market, MarkPriceEvent, Order, OrderEvent, OrderSide, OrderTif, Position,
    StreamKind, TradeEvent,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub const MAKER_FEE_PCT: f64 = 0.0002;
pub const TAKER_FEE_PCT: f64 = 0.0005;

/// Orders per `/fapi/v1/batchOrders` request
pub const MAX_BATCH_ORDERS: usize = 5;
/// Ids per batch cancel request
pub const MAX_BATCH_CANCELS: usize = 10;

/// Listen keys expire after 60 minutes without a keepalive.
pub const LISTEN_KEY_KEEPALIVE: Duration = Duration::from_secs(30 * 60);

/// `-4046 No need to change margin type.`
const MARGIN_TYPE_UNCHANGED: i32 = -4046;

pub fn tif_wire(tif: OrderTif) -> &'static str {
    match tif {
        OrderTif::Gtc => "GTC",
        OrderTif::Ioc => "IOC",
        OrderTif::Fok => "FOK",
        OrderTif::Alo => "GTX",
    }
}

pub const fn side_wire(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BUY",
        OrderSide::Sell => "SELL",
    }
}

/// Markets keyed by exchange symbol, built from the exchangeInfo filters
pub fn markets_from_exchange_info(
    info: &ExchangeInfo,
) -> Result<HashMap<String, Market>, ExchangeError> {
    let mut markets = HashMap::new();
    for symbol in info.symbols.iter().filter(|s| s.status == "TRADING") {
        let mut market = Market {
            // asset ids do not apply to Binance
            id: 0,
            exchange_name: ExchangeName::BinancePerp,
            symbol: symbol.symbol.clone(),
            tick_size: 0.0,
            min_notional: 0.0,
            lot_min_qty: 0.0,
            lot_max_qty: 0.0,
            lot_step_size: 0.0,
            market_lot_min_qty: 0.0,
            market_lot_max_qty: 0.0,
            market_lot_step_size: 0.0,
            max_leverage: 0.0,
            maker_fee_pct: MAKER_FEE_PCT,
            taker_fee_pct: TAKER_FEE_PCT,
        };
        let mut has_lot_size = false;

        for filter in &symbol.filters {
            match filter {
                SymbolFilter::Price { tick_size } => {
                    market.tick_size = parse_f64(tick_size, "tickSize")?;
                }
                SymbolFilter::LotSize {
                    min_qty,
                    max_qty,
                    step_size,
                } => {
                    market.lot_min_qty = parse_f64(min_qty, "minQty")?;
                    market.lot_max_qty = parse_f64(max_qty, "maxQty")?;
                    market.lot_step_size = parse_f64(step_size, "stepSize")?;
                    has_lot_size = true;
                }
                SymbolFilter::MarketLotSize {
                    min_qty,
                    max_qty,
                    step_size,
                } => {
                    market.market_lot_min_qty = parse_f64(min_qty, "minQty")?;
                    market.market_lot_max_qty = parse_f64(max_qty, "maxQty")?;
                    market.market_lot_step_size = parse_f64(step_size, "stepSize")?;
                }
                SymbolFilter::MinNotional { notional } => {
                    market.min_notional = parse_f64(notional, "notional")?;
                }
                SymbolFilter::Other => {}
            }
        }

        if !has_lot_size {
            return Err(BinancePerpError::missing_filter("LOT_SIZE", &symbol.symbol).into());
        }
        markets.insert(symbol.symbol.clone(), market);
    }
    Ok(markets)
}


pub fn limit_order_params(
    market: &Market,
    side: OrderSide,
    price: f64,
    qty: f64,
    tif: OrderTif,
) -> Result<Vec<(&'static str, String)>, ExchangeError> {
    Ok(vec![
        ("symbol", market.symbol.clone()),
        ("side", side_wire(side).to_string()),
        ("type", "LIMIT".to_string()),
        ("timeInForce", tif_wire(tif).to_string()),
        ("price", quantize(price, market.tick_size, false)?.to_string()),
        (
            "quantity",
            quantize_qty(qty, market.lot_step_size, market.lot_min_qty)?.to_string(),
        ),
    ])
}

pub fn market_order_params(
    market: &Market,
    side: OrderSide,
    qty: f64,
    reduce_only: bool,
) -> Result<Vec<(&'static str, String)>, ExchangeError> {
    // MARKET_LOT_SIZE is optional, LOT_SIZE always present
    let (step, min_qty) = if market.market_lot_step_size > 0.0 {
        (market.market_lot_step_size, market.market_lot_min_qty)
    } else {
        (market.lot_step_size, market.lot_min_qty)
    };
    Ok(vec![
        ("symbol", market.symbol.clone()),
        ("side", side_wire(side).to_string()),
        ("type", "MARKET".to_string()),
        ("quantity", quantize_qty(qty, step, min_qty)?.to_string()),
        ("reduceOnly", reduce_only.to_string()),
    ])
}

pub fn parse_order(order: &OrderResponse, symbol: &str) -> Result<Order, ExchangeError> {
    let original_qty = parse_f64(&order.orig_qty, "origQty")?;
    let executed = if order.executed_qty.is_empty() {
        0.0
    } else {
        parse_f64(&order.executed_qty, "executedQty")?
    };
    Ok(Order {
        id: order.order_id.to_string(),
        symbol: symbol.to_string(),
        order_type: parse_order_type(&order.order_type)?,
        side: parse_side(&order.side)?,
        price: parse_f64(&order.price, "price")?,
        original_qty,
        remaining_qty: original_qty - executed,
    })
}

fn parse_order_id(order_id: &str) -> Result<u64, ExchangeError> {
    order_id.parse().map_err(|_| {
        BinancePerpError::InvalidOrderId {
            value: order_id.to_string(),
        }
        .into()
    })
}

fn borrow_params<'a>(params: &'a [(&'static str, String)]) -> Vec<(&'a str, &'a str)> {
    params.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

struct Shared<R: RestClient> {
    rest: BinancePerpRest<R>,
    symbols: SymbolMap,
    /// keyed by exchange symbol
    markets: HashMap<String, Market>,
    /// last leverage set per exchange symbol
    leverage: Mutex<HashMap<String, u32>>,
    is_cross: bool,
    ws_url: String,
}

impl<R: RestClient> Shared<R> {
    fn resolve(&self, symbol: &str) -> Result<(&str, &Market), ExchangeError> {
        let local = self.symbols.to_local(symbol)?;
        let market = self
            .markets
            .get(local)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))?;
        Ok((local, market))
    }

    /// Margin type is set the first time a symbol is used, leverage
    /// whenever it differs from the cached value.
    async fn ensure_leverage(&self, local: &str, leverage: u32) -> Result<(), ExchangeError> {
        let cached = self.leverage.lock().get(local).copied();
        if cached == Some(leverage) {
            return Ok(());
        }

        if cached.is_none() {
            let margin_type = if self.is_cross { "CROSSED" } else { "ISOLATED" };
            match self.rest.set_margin_type(local, margin_type).await {
                Ok(_) => {}
                Err(ExchangeError::ApiError { code, .. }) if code == MARGIN_TYPE_UNCHANGED => {}
                Err(e) => return Err(e),
            }
        }

        let reply = self.rest.set_leverage(local, leverage).await?;
        self.leverage.lock().insert(local.to_string(), reply.leverage);
        info!(symbol = %local, leverage = reply.leverage, is_cross = self.is_cross, "leverage updated");
        Ok(())
    }
}

/// Binance USDⓈ-M futures adapter. Cheap to clone.
pub struct BinancePerpConnector<R: RestClient> {
    shared: Arc<Shared<R>>,
}

impl<R: RestClient> Clone for BinancePerpConnector<R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R: RestClient + Clone + 'static> BinancePerpConnector<R> {
    pub fn new(
        rest: BinancePerpRest<R>,
        symbols: SymbolMap,
        markets: HashMap<String, Market>,
        ws_url: String,
        is_cross: bool,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                rest,
                symbols,
                markets,
                leverage: Mutex::new(HashMap::new()),
                is_cross,
                ws_url,
            }),
        }
    }

    /// Leverage currently cached for `symbol`
    pub fn cached_leverage(&self, symbol: &str) -> Option<u32> {
        let local = self.shared.symbols.to_local(symbol).ok()?;
        self.shared.leverage.lock().get(local).copied()
    }

    async fn subscribe<C: WsCodec>(
        &self,
        url: String,
        kind: StreamKind,
        codec: C,
        cancel: CancellationToken,
    ) -> Result<Subscription<C::Message>, ExchangeError> {
        WsStream::subscribe(
            url,
            kind,
            BinancePerpDialect::ws_config(),
            Arc::new(BinancePerpDialect),
            codec,
            cancel,
        )
        .await
    }

    fn market_stream_url(&self, local: &str, channel: &str) -> String {
        stream_url(&self.shared.ws_url, local, channel)
    }
}

/// Keep the listen key alive while `handle` is open, then release it.
fn spawn_listen_key_keepalive<R: RestClient + Clone + 'static>(
    rest: BinancePerpRest<R>,
    handle: Arc<dyn StreamControl>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LISTEN_KEY_KEEPALIVE);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = rest.keepalive_user_stream().await {
                        warn!(error = %e, "listen key keepalive failed");
                    }
                }
                () = handle.closed() => {
                    if let Err(e) = rest.close_user_stream().await {
                        warn!(error = %e, "failed to close listen key");
                    }
                    break;
                }
            }
        }
    });
}

#[async_trait]
impl<R: RestClient + Clone + 'static> MarketDataSource for BinancePerpConnector<R> {
    fn get_market(&self, symbol: &str) -> Option<&Market> {
        self.shared.resolve(symbol).ok().map(|(_, market)| market)
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol))]
    async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        window: usize,
    ) -> Result<Vec<KLineEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        self.shared
            .rest
            .get_klines(local, symbol, interval, window)
            .await
    }

    async fn subscribe_trade_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<TradeEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let url = self.market_stream_url(local, AGG_TRADE_CHANNEL);
        let codec = Filtered::new(AggTradeCodec::new(symbol), max_delay_ms);
        self.subscribe(url, StreamKind::Trade, codec, cancel).await
    }

    async fn subscribe_kline_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        interval: Interval,
        max_delay_ms: i64,
    ) -> Result<Subscription<KLineEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let url = self.market_stream_url(local, &kline_channel(interval));
        let codec = Filtered::new(KlineCodec::new(symbol, interval), max_delay_ms);
        self.subscribe(url, StreamKind::KLine, codec, cancel).await
    }

    async fn subscribe_mark_price_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<MarkPriceEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let url = self.market_stream_url(local, MARK_PRICE_CHANNEL);
        let codec = Filtered::new(MarkPriceCodec::new(symbol), max_delay_ms);
        self.subscribe(url, StreamKind::MarkPrice, codec, cancel).await
    }

    async fn subscribe_book_depth_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
        max_delay_ms: i64,
    ) -> Result<Subscription<BookDepthEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let url = self.market_stream_url(local, DEPTH_CHANNEL);
        let codec = Filtered::new(DepthCodec::new(symbol), max_delay_ms);
        self.subscribe(url, StreamKind::BookDepth, codec, cancel).await
    }
}

#[async_trait]
impl<R: RestClient + Clone + 'static> OrderPlacer for BinancePerpConnector<R> {
    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol))]
    async fn get_pending_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        self.shared
            .rest
            .get_open_orders(local)
            .await?
            .iter()
            .map(|order| parse_order(order, symbol))
            .collect()
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol))]
    async fn open_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: f64,
        leverage: u32,
        reduce_only: bool,
    ) -> Result<(), ExchangeError> {
        let (local, market) = self.shared.resolve(symbol)?;
        let params = market_order_params(market, side, qty, reduce_only)?;
        self.shared.ensure_leverage(local, leverage).await?;
        self.shared
            .rest
            .place_order(&borrow_params(&params))
            .await
            .map(|_| ())
    }

    #[instrument(skip(self, order), fields(exchange = "bnf", symbol = %symbol))]
    async fn open_limit_order(
        &self,
        symbol: &str,
        order: &LimitOrderRequest,
    ) -> Result<String, ExchangeError> {
        let (local, market) = self.shared.resolve(symbol)?;
        let mut params = limit_order_params(market, order.side, order.price, order.qty, order.tif)?;
        params.push(("reduceOnly", order.reduce_only.to_string()));
        if let Some(cloid) = order.client_order_id.as_ref().filter(|c| !c.is_empty()) {
            params.push(("newClientOrderId", cloid.clone()));
        }
        self.shared.ensure_leverage(local, order.leverage).await?;

        let reply = self.shared.rest.place_order(&borrow_params(&params)).await?;
        Ok(reply.order_id.to_string())
    }

    #[instrument(skip(self, orders), fields(exchange = "bnf", symbol = %symbol, count = orders.len()))]
    async fn open_batch_limit_orders(
        &self,
        symbol: &str,
        orders: &[LimitOrderInput],
        leverage: u32,
    ) -> Result<BatchOutcome, ExchangeError> {
        if orders.is_empty() {
            return Err(ExchangeError::InvalidParameters(
                "batch contains no orders".to_string(),
            ));
        }
        let (local, market) = self.shared.resolve(symbol)?;
        let payloads = orders
            .iter()
            .map(|o| {
                let params = limit_order_params(market, o.side, o.price, o.qty, o.tif)?;
                Ok(params
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), Value::String(v)))
                    .collect::<serde_json::Map<_, _>>())
            })
            .collect::<Result<Vec<_>, ExchangeError>>()?;
        self.shared.ensure_leverage(local, leverage).await?;

        let mut outcome = BatchOutcome::default();
        for (chunk_index, chunk) in payloads.chunks(MAX_BATCH_ORDERS).enumerate() {
            let first = chunk_index * MAX_BATCH_ORDERS;
            // orders accepted by earlier chunks are live, so a failed chunk
            // only fails its own items
            let items = match self.shared.rest.place_batch_orders(&json!(chunk)).await {
                Ok(items) => items,
                Err(e) => {
                    error!(first, count = chunk.len(), error = %e, "batch chunk failed");
                    let message = e.to_string();
                    outcome
                        .errors
                        .extend((first..first + chunk.len()).map(|index| (index, message.clone())));
                    continue;
                }
            };
            for (offset, item) in items.into_iter().enumerate() {
                let index = first + offset;
                match item {
                    BatchItem::Accepted(order) => outcome.order_ids.push(order.order_id.to_string()),
                    BatchItem::Rejected(e) => {
                        error!(index, code = e.code, message = %e.msg, "batch order rejected");
                        outcome.errors.push((index, e.msg));
                    }
                }
            }
        }
        Ok(outcome)
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol))]
    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        client_order_id: Option<&str>,
    ) -> Result<(), ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let client_order_id = client_order_id.filter(|c| !c.is_empty());
        if client_order_id.is_none() {
            parse_order_id(order_id)?;
        }
        self.shared
            .rest
            .cancel_order(local, Some(order_id), client_order_id)
            .await
            .map(|_| ())
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol))]
    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let reply = self.shared.rest.cancel_all_orders(local).await?;
        if reply.code != 200 {
            return Err(BinancePerpError::order_error(reply.code, reply.msg).into());
        }
        Ok(())
    }

    #[instrument(skip(self, order_ids), fields(exchange = "bnf", symbol = %symbol, count = order_ids.len()))]
    async fn cancel_batch_orders(
        &self,
        symbol: &str,
        order_ids: &[String],
    ) -> Result<(), ExchangeError> {
        if order_ids.is_empty() {
            return Ok(());
        }
        let (local, _) = self.shared.resolve(symbol)?;
        let ids = order_ids
            .iter()
            .map(|id| parse_order_id(id))
            .collect::<Result<Vec<_>, _>>()?;

        for chunk in ids.chunks(MAX_BATCH_CANCELS) {
            let items = self.shared.rest.cancel_batch_orders(local, chunk).await?;
            if let Some(BatchItem::Rejected(e)) = items
                .iter()
                .find(|item| matches!(item, BatchItem::Rejected(_)))
            {
                return Err(BinancePerpError::order_error(e.code, e.msg.clone()).into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<R: RestClient + Clone + 'static> AccountInfo for BinancePerpConnector<R> {
    #[instrument(skip(self), fields(exchange = "bnf"))]
    async fn get_account_balance(&self) -> Result<f64, ExchangeError> {
        let account = self.shared.rest.get_account().await?;
        parse_f64(&account.total_margin_balance, "totalMarginBalance")
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol))]
    async fn get_active_positions(&self, symbol: &str) -> Result<Vec<Position>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let account = self.shared.rest.get_account().await?;

        let mut positions = Vec::new();
        for position in account.positions.iter().filter(|p| p.symbol == local) {
            let amount = parse_f64(&position.position_amt, "positionAmt")?;
            if amount == 0.0 {
                continue;
            }
            positions.push(Position {
                entry_price: parse_f64(&position.entry_price, "entryPrice")?,
                qty: amount.abs(),
                side: if amount < 0.0 {
                    OrderSide::Sell
                } else {
                    OrderSide::Buy
                },
            });
        }
        Ok(positions)
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol))]
    async fn close_active_positions(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        for position in self.get_active_positions(symbol).await? {
            self.open_market_order(symbol, position.side.opposite(), position.qty, leverage, true)
                .await?;
        }
        Ok(())
    }

    async fn subscribe_order_stream(
        &self,
        cancel: CancellationToken,
        symbol: &str,
    ) -> Result<Subscription<OrderEvent>, ExchangeError> {
        let (local, _) = self.shared.resolve(symbol)?;
        let listen_key = self.shared.rest.start_user_stream().await?;
        let url = format!("{}/{}", self.shared.ws_url.trim_end_matches('/'), listen_key);

        let subscription = self
            .subscribe(url, StreamKind::Order, UserDataCodec::new(local, symbol), cancel)
            .await?;
        spawn_listen_key_keepalive(
            self.shared.rest.clone(),
            Arc::clone(&subscription.handle),
        );
        Ok(subscription)
    }
}

#[async_trait]
impl<R: RestClient + Clone + 'static> Exchange for BinancePerpConnector<R> {
    fn name(&self) -> ExchangeName {
        ExchangeName::BinancePerp
    }

    async fn connect_order_mgmt_stream(
        &self,
        _cancel: CancellationToken,
        _symbol: &str,
    ) -> Result<OrderMgmtSubscription, ExchangeError> {
        Err(ExchangeError::NotImplemented("bnf order management stream"))
    }

    fn to_uni_symbol(&self, local: &str) -> Result<String, ExchangeError> {
        self.shared.symbols.to_universal(local).map(str::to_string)
    }

    fn to_loc_symbol(&self, universal: &str) -> Result<String, ExchangeError> {
        self.shared.symbols.to_local(universal).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ExchangeInfo {
        serde_json::from_str(
            r#"{"symbols":[
                {"symbol":"BTCUSDT","status":"TRADING","filters":[
                    {"filterType":"PRICE_FILTER","tickSize":"0.10","minPrice":"556.80","maxPrice":"4529764"},
                    {"filterType":"LOT_SIZE","minQty":"0.001","maxQty":"1000","stepSize":"0.001"},
                    {"filterType":"MARKET_LOT_SIZE","minQty":"0.001","maxQty":"120","stepSize":"0.001"},
                    {"filterType":"MIN_NOTIONAL","notional":"100"}
                ]},
                {"symbol":"OLDUSDT","status":"SETTLING","filters":[]}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_markets_from_exchange_info() {
        let markets = markets_from_exchange_info(&info()).unwrap();
        assert_eq!(markets.len(), 1);
        let btc = &markets["BTCUSDT"];
        assert!((btc.tick_size - 0.1).abs() < f64::EPSILON);
        assert!((btc.min_notional - 100.0).abs() < f64::EPSILON);
        assert!((btc.market_lot_max_qty - 120.0).abs() < f64::EPSILON);
        assert!((btc.maker_fee_pct - 0.0002).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_lot_size_is_an_error() {
        let info: ExchangeInfo = serde_json::from_str(
            r#"{"symbols":[{"symbol":"BTCUSDT","status":"TRADING","filters":[]}]}"#,
        )
        .unwrap();
        assert!(markets_from_exchange_info(&info).is_err());
    }

    #[test]
    fn test_limit_params_are_quantized() {
        let markets = markets_from_exchange_info(&info()).unwrap();
        let params =
            limit_order_params(&markets["BTCUSDT"], OrderSide::Buy, 64000.04, 0.0126, OrderTif::Alo)
                .unwrap();
        let params: HashMap<_, _> = params.into_iter().collect();
        assert_eq!(params["price"], "64000");
        assert_eq!(params["quantity"], "0.012");
        assert_eq!(params["timeInForce"], "GTX");
        assert_eq!(params["side"], "BUY");
    }

    #[test]
    fn test_market_params() {
        let markets = markets_from_exchange_info(&info()).unwrap();
        let params = market_order_params(&markets["BTCUSDT"], OrderSide::Sell, 0.5, true).unwrap();
        let params: HashMap<_, _> = params.into_iter().collect();
        assert_eq!(params["type"], "MARKET");
        assert_eq!(params["reduceOnly"], "true");
        assert!(market_order_params(&markets["BTCUSDT"], OrderSide::Sell, 0.0, true).is_err());
    }

    #[test]
    fn test_quantity_below_lot_minimum_is_refused() {
        let markets = markets_from_exchange_info(&info()).unwrap();
        let btc = &markets["BTCUSDT"];
        for qty in [0.0004, 0.0009] {
            assert!(matches!(
                limit_order_params(btc, OrderSide::Buy, 64000.0, qty, OrderTif::Gtc),
                Err(ExchangeError::InvalidParameters(_))
            ));
            assert!(matches!(
                market_order_params(btc, OrderSide::Sell, qty, false),
                Err(ExchangeError::InvalidParameters(_))
            ));
        }
        let params = market_order_params(btc, OrderSide::Sell, 0.0019, false).unwrap();
        let params: HashMap<_, _> = params.into_iter().collect();
        assert_eq!(params["quantity"], "0.001");
    }

    #[test]
    fn test_parse_order_remaining() {
        let order: OrderResponse = serde_json::from_str(
            r#"{"orderId":7,"symbol":"BTCUSDT","status":"PARTIALLY_FILLED","clientOrderId":"c","price":"60000","origQty":"1.0","executedQty":"0.25","type":"LIMIT","side":"SELL","timeInForce":"GTC"}"#,
        )
        .unwrap();
        let parsed = parse_order(&order, "BTC_USD").unwrap();
        assert_eq!(parsed.id, "7");
        assert_eq!(parsed.symbol, "BTC_USD");
        assert!((parsed.remaining_qty - 0.75).abs() < f64::EPSILON);
    }
}
