use super::types::{
    AccountState, ApiErrorBody, BatchItem, CodeReply, ExchangeInfo, LeverageReply, ListenKey,
    OrderResponse, RestKline,
};
use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::precision::parse_f64;
use crate::core::types::{now_ms, Interval, KLine, KLineEvent};
use reqwest::Method;
use serde_json::Value;
use tracing::instrument;

/// Binance reports request errors as `{"code":..,"msg":..}` with a non-200
/// status; surface those as `ApiError`.
pub fn api_error(err: ExchangeError) -> ExchangeError {
    match err {
        ExchangeError::BadStatus { status, body } => {
            match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(ApiErrorBody { code, msg }) => ExchangeError::ApiError { code, message: msg },
                Err(_) => ExchangeError::BadStatus { status, body },
            }
        }
        other => other,
    }
}

pub fn rest_kline_to_event(row: &RestKline, symbol: &str) -> Result<KLineEvent, ExchangeError> {
    Ok(KLineEvent {
        event: "kline".to_string(),
        open_time: row.0,
        close_time: row.6,
        symbol: symbol.to_string(),
        kline: KLine {
            o: parse_f64(&row.1, "open")?,
            h: parse_f64(&row.2, "high")?,
            l: parse_f64(&row.3, "low")?,
            c: parse_f64(&row.4, "close")?,
        },
        received_time: now_ms(),
    })
}

/// Typed wrapper around `RestClient` for the USDⓈ-M futures endpoints
#[derive(Debug, Clone)]
pub struct BinancePerpRest<R: RestClient> {
    client: R,
}

impl<R: RestClient> BinancePerpRest<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    #[instrument(skip(self), fields(exchange = "bnf"))]
    pub async fn get_exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        self.client
            .get_json("/fapi/v1/exchangeInfo", &[], false)
            .await
            .map_err(api_error)
    }

    /// Last `limit` klines, oldest first, tagged with the universal `symbol`
    #[instrument(skip(self), fields(exchange = "bnf", symbol = %symbol, interval = %interval))]
    pub async fn get_klines(
        &self,
        local: &str,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<KLineEvent>, ExchangeError> {
        if limit == 0 {
            return Err(ExchangeError::InvalidParameters(
                "kline window must be at least 1".to_string(),
            ));
        }
        let limit = limit.to_string();
        let params = [
            ("symbol", local),
            ("interval", interval.as_str()),
            ("limit", limit.as_str()),
        ];
        let rows: Vec<RestKline> = self
            .client
            .get_json("/fapi/v1/klines", &params, false)
            .await
            .map_err(api_error)?;
        if rows.is_empty() {
            return Err(ExchangeError::Other("no klines data available".to_string()));
        }
        rows.iter().map(|row| rest_kline_to_event(row, symbol)).collect()
    }

    #[instrument(skip(self, params), fields(exchange = "bnf"))]
    pub async fn place_order(
        &self,
        params: &[(&str, &str)],
    ) -> Result<OrderResponse, ExchangeError> {
        self.client
            .signed_request_json(Method::POST, "/fapi/v1/order", params)
            .await
            .map_err(api_error)
    }

    /// `orders` is the JSON array of order parameter objects, at most five.
    #[instrument(skip(self, orders), fields(exchange = "bnf"))]
    pub async fn place_batch_orders(&self, orders: &Value) -> Result<Vec<BatchItem>, ExchangeError> {
        let batch = orders.to_string();
        self.client
            .signed_request_json(
                Method::POST,
                "/fapi/v1/batchOrders",
                &[("batchOrders", batch.as_str())],
            )
            .await
            .map_err(api_error)
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %local))]
    pub async fn cancel_order(
        &self,
        local: &str,
        order_id: Option<&str>,
        client_order_id: Option<&str>,
    ) -> Result<OrderResponse, ExchangeError> {
        let mut params = vec![("symbol", local)];
        if let Some(client_order_id) = client_order_id {
            params.push(("origClientOrderId", client_order_id));
        } else if let Some(order_id) = order_id {
            params.push(("orderId", order_id));
        }
        self.client
            .signed_request_json(Method::DELETE, "/fapi/v1/order", &params)
            .await
            .map_err(api_error)
    }

    /// Cancel up to ten orders by exchange id.
    #[instrument(skip(self, order_ids), fields(exchange = "bnf", symbol = %local))]
    pub async fn cancel_batch_orders(
        &self,
        local: &str,
        order_ids: &[u64],
    ) -> Result<Vec<BatchItem>, ExchangeError> {
        let ids = Value::from(order_ids.to_vec()).to_string();
        self.client
            .signed_request_json(
                Method::DELETE,
                "/fapi/v1/batchOrders",
                &[("symbol", local), ("orderIdList", ids.as_str())],
            )
            .await
            .map_err(api_error)
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %local))]
    pub async fn cancel_all_orders(&self, local: &str) -> Result<CodeReply, ExchangeError> {
        self.client
            .signed_request_json(Method::DELETE, "/fapi/v1/allOpenOrders", &[("symbol", local)])
            .await
            .map_err(api_error)
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %local))]
    pub async fn get_open_orders(&self, local: &str) -> Result<Vec<OrderResponse>, ExchangeError> {
        self.client
            .signed_request_json(Method::GET, "/fapi/v1/openOrders", &[("symbol", local)])
            .await
            .map_err(api_error)
    }

    #[instrument(skip(self), fields(exchange = "bnf", symbol = %local))]
    pub async fn set_leverage(&self, local: &str, leverage: u32) -> Result<LeverageReply, ExchangeError> {
        let leverage = leverage.to_string();
        self.client
            .signed_request_json(
                Method::POST,
                "/fapi/v1/leverage",
                &[("symbol", local), ("leverage", leverage.as_str())],
            )
            .await
            .map_err(api_error)
    }

    /// `CROSSED` or `ISOLATED`
    #[instrument(skip(self), fields(exchange = "bnf", symbol = %local))]
    pub async fn set_margin_type(&self, local: &str, margin_type: &str) -> Result<CodeReply, ExchangeError> {
        self.client
            .signed_request_json(
                Method::POST,
                "/fapi/v1/marginType",
                &[("symbol", local), ("marginType", margin_type)],
            )
            .await
            .map_err(api_error)
    }

    #[instrument(skip(self), fields(exchange = "bnf"))]
    pub async fn get_account(&self) -> Result<AccountState, ExchangeError> {
        self.client
            .get_json("/fapi/v2/account", &[], true)
            .await
            .map_err(api_error)
    }

    #[instrument(skip(self), fields(exchange = "bnf"))]
    pub async fn start_user_stream(&self) -> Result<String, ExchangeError> {
        let reply: ListenKey = self
            .client
            .keyed_request_json(Method::POST, "/fapi/v1/listenKey", &[])
            .await
            .map_err(api_error)?;
        Ok(reply.listen_key)
    }

    /// Extend the listen key validity by another 60 minutes.
    #[instrument(skip(self), fields(exchange = "bnf"))]
    pub async fn keepalive_user_stream(&self) -> Result<(), ExchangeError> {
        let _: Value = self
            .client
            .keyed_request_json(Method::PUT, "/fapi/v1/listenKey", &[])
            .await
            .map_err(api_error)?;
        Ok(())
    }

    #[instrument(skip(self), fields(exchange = "bnf"))]
    pub async fn close_user_stream(&self) -> Result<(), ExchangeError> {
        let _: Value = self
            .client
            .keyed_request_json(Method::DELETE, "/fapi/v1/listenKey", &[])
            .await
            .map_err(api_error)?;
        Ok(())
    }
}
