use super::actions::{
    ensure_cancelled, ensure_ok, first_order_id, order_ref, order_statuses, order_wire,
    parse_open_order, stream_action_reply, stream_info_reply,
};
use super::connector::Shared;
use super::types::{Action, ExchangeResponse, OpenOrder, WsPost};
use crate::core::errors::ExchangeError;
use crate::core::kernel::{RestClient, WsStream};
use crate::core::nonce::next_nonce;
use crate::core::traits::{OrderStream, StreamControl};
use crate::core::types::{LimitOrderInput, LimitOrderRequest, Order, OrderSide};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Order management over the WebSocket `post` method
///
/// Single orders, modifications, cancels and open order queries wait for
/// the correlated reply. Market orders and batches are sent without
/// waiting; a rejection then only shows up in the log and in the order
/// updates of the same stream.
pub struct HyperliquidOrderStream<R: RestClient> {
    stream: Arc<WsStream>,
    shared: Arc<Shared<R>>,
}

impl<R: RestClient> HyperliquidOrderStream<R> {
    pub(crate) fn new(stream: Arc<WsStream>, shared: Arc<Shared<R>>) -> Self {
        Self { stream, shared }
    }

    pub fn stream(&self) -> &Arc<WsStream> {
        &self.stream
    }

    fn ensure_open(&self) -> Result<(), ExchangeError> {
        if self.stream.is_closed() {
            Err(ExchangeError::StreamClosed)
        } else {
            Ok(())
        }
    }

    fn signed_post(&self, action: Action) -> Result<(u64, String), ExchangeError> {
        let nonce = next_nonce();
        let signed = self.shared.rest.signer().sign_action(action, nonce)?;
        let text = serde_json::to_string(&WsPost::action(nonce, &signed))?;
        Ok((nonce, text))
    }

    /// Send `action` and wait for the exchange's reply to it.
    async fn request_action(&self, action: Action) -> Result<ExchangeResponse, ExchangeError> {
        let (id, text) = self.signed_post(action)?;
        let body = self.stream.request(id, text).await?;
        stream_action_reply(body)
    }

    /// Send `action` without waiting for the reply.
    async fn send_action(&self, action: Action) -> Result<(), ExchangeError> {
        let (id, text) = self.signed_post(action)?;
        debug!(id, "action sent without waiting for reply");
        self.stream.send_text(text).await
    }

    async fn request_info(&self, payload: Value) -> Result<Value, ExchangeError> {
        let id = next_nonce();
        let text = serde_json::to_string(&WsPost::info(id, payload))?;
        stream_info_reply(self.stream.request(id, text).await?)
    }
}

#[async_trait]
impl<R: RestClient + 'static> StreamControl for HyperliquidOrderStream<R> {
    async fn close(&self) {
        self.stream.close().await;
    }

    fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    async fn closed(&self) {
        self.stream.closed().await;
    }
}

#[async_trait]
impl<R: RestClient + 'static> OrderStream for HyperliquidOrderStream<R> {
    #[instrument(skip(self, order), fields(exchange = "hpl", symbol = %symbol))]
    async fn open_limit_order(
        &self,
        symbol: &str,
        order: &LimitOrderRequest,
    ) -> Result<String, ExchangeError> {
        self.ensure_open()?;
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
        let reply = self.request_action(Action::order(vec![wire])).await?;
        first_order_id(&order_statuses(reply)?)
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
        self.ensure_open()?;
        let (local, market) = self.shared.resolve(symbol)?;
        self.shared.ensure_leverage(local, market, leverage).await?;

        let wire = self
            .shared
            .market_order_wire(symbol, market, side, qty, reduce_only)
            .await?;
        self.send_action(Action::order(vec![wire])).await
    }

    #[instrument(skip(self, orders), fields(exchange = "hpl", symbol = %symbol, count = orders.len()))]
    async fn open_batch_limit_orders(
        &self,
        symbol: &str,
        orders: &[LimitOrderInput],
        leverage: u32,
    ) -> Result<(), ExchangeError> {
        self.ensure_open()?;
        let (local, market) = self.shared.resolve(symbol)?;
        let wires = self.shared.batch_wires(market, orders)?;
        self.shared.ensure_leverage(local, market, leverage).await?;
        self.send_action(Action::order(wires)).await
    }

    #[instrument(skip(self, order), fields(exchange = "hpl", symbol = %symbol, order_id = %order_id))]
    async fn modify_order(
        &self,
        symbol: &str,
        order_id: &str,
        order: &LimitOrderRequest,
    ) -> Result<(), ExchangeError> {
        self.ensure_open()?;
        let (local, market) = self.shared.resolve(symbol)?;
        self.shared
            .ensure_leverage(local, market, order.leverage)
            .await?;

        let target = order_ref(order_id, order.client_order_id.as_deref())?;
        let wire = order_wire(
            market,
            order.side,
            order.price,
            order.qty,
            order.reduce_only,
            order.tif,
            order.client_order_id.clone(),
        )?;
        ensure_ok(self.request_action(Action::modify(target, wire)).await?)
    }

    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn cancel_order(
        &self,
        symbol: &str,
        order_id: &str,
        client_order_id: Option<&str>,
    ) -> Result<(), ExchangeError> {
        self.ensure_open()?;
        let (_, market) = self.shared.resolve(symbol)?;
        let action = Shared::<R>::cancel_action(market, order_id, client_order_id)?;
        ensure_cancelled(self.request_action(action).await?)
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
        self.ensure_open()?;
        let (_, market) = self.shared.resolve(symbol)?;
        let action = Shared::<R>::batch_cancel_action(market, order_ids)?;
        self.send_action(action).await
    }

    #[instrument(skip(self), fields(exchange = "hpl", symbol = %symbol))]
    async fn get_pending_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError> {
        self.ensure_open()?;
        let (local, _) = self.shared.resolve(symbol)?;
        let data = self
            .request_info(json!({ "type": "openOrders", "user": self.shared.rest.wallet_address() }))
            .await?;
        let orders: Vec<OpenOrder> =
            serde_json::from_value(data).map_err(|e| ExchangeError::decode("openOrders", e))?;

        orders
            .iter()
            .filter(|order| order.coin == local)
            .map(|order| parse_open_order(order, symbol))
            .collect()
    }
}
