//! Building order actions and reading their outcomes, shared by the REST
//! connector and the order management stream.
use super::types::{
    ExchangeResponse, HyperliquidError, LimitTif, OpenOrder, OrderRef, OrderStatusWire,
    OrderTypeWire, OrderWire,
};
use crate::core::errors::ExchangeError;
use crate::core::precision::{parse_f64, quantize, quantize_qty, round_to_sig_figs};
use crate::core::types::{BatchOutcome, Market, Order, OrderSide, OrderTif, OrderType};
use serde_json::Value;

/// Prices carry at most this many significant figures.
pub const MAX_PRICE_SIG_FIGS: i32 = 5;

/// Slippage applied to the last close to emulate a market order.
pub const MARKET_SLIPPAGE: f64 = 0.1;

/// Random 128-bit client order id, `0x` + 32 hex digits
pub fn new_cloid() -> String {
    format!("0x{}", hex::encode(rand::random::<[u8; 16]>()))
}

pub fn tif_wire(tif: OrderTif) -> Result<&'static str, ExchangeError> {
    match tif {
        OrderTif::Gtc => Ok("Gtc"),
        OrderTif::Ioc => Ok("Ioc"),
        OrderTif::Alo => Ok("Alo"),
        OrderTif::Fok => Err(ExchangeError::unsupported("time in force", "FOK")),
    }
}

/// Price rounded to the exchange's significant figure and decimal limits.
pub fn prepare_price(market: &Market, price: f64) -> Result<String, ExchangeError> {
    let rounded = round_to_sig_figs(price, MAX_PRICE_SIG_FIGS);
    Ok(quantize(rounded, market.tick_size, false)?.to_string())
}

/// Size rounded down to the asset's size decimals.
pub fn prepare_qty(market: &Market, qty: f64) -> Result<String, ExchangeError> {
    Ok(quantize_qty(qty, market.lot_step_size, market.lot_min_qty)?.to_string())
}

pub fn order_wire(
    market: &Market,
    side: OrderSide,
    price: f64,
    qty: f64,
    reduce_only: bool,
    tif: OrderTif,
    cloid: Option<String>,
) -> Result<OrderWire, ExchangeError> {
    Ok(OrderWire {
        asset: market.id,
        is_buy: side.is_buy(),
        limit_px: prepare_price(market, price)?,
        size: prepare_qty(market, qty)?,
        reduce_only,
        order_type: OrderTypeWire {
            limit: LimitTif { tif: tif_wire(tif)? },
        },
        cloid,
    })
}

/// Aggressive IOC limit price crossing the book from the last close.
pub fn market_limit_price(last_close: f64, side: OrderSide) -> f64 {
    match side {
        OrderSide::Buy => last_close * (1.0 + MARKET_SLIPPAGE),
        OrderSide::Sell => last_close * (1.0 - MARKET_SLIPPAGE),
    }
}

pub fn parse_oid(order_id: &str) -> Result<u64, ExchangeError> {
    order_id.parse().map_err(|_| {
        HyperliquidError::InvalidOrderId {
            value: order_id.to_string(),
        }
        .into()
    })
}

/// A non-empty client id wins over the exchange id.
pub fn order_ref(order_id: &str, client_order_id: Option<&str>) -> Result<OrderRef, ExchangeError> {
    match client_order_id {
        Some(cloid) if !cloid.is_empty() => Ok(OrderRef::Cloid(cloid.to_string())),
        _ => parse_oid(order_id).map(OrderRef::Oid),
    }
}

/// Reject `status: "err"` replies; returns the `response` payload.
pub fn check_status(reply: ExchangeResponse) -> Result<Value, ExchangeError> {
    if reply.status == "ok" {
        return Ok(reply.response);
    }
    let message = match reply.response {
        Value::String(message) => message,
        other => other.to_string(),
    };
    Err(HyperliquidError::rejected(message).into())
}

/// Unwrap a stream `post` reply body into the exchange reply it carries.
pub fn stream_action_reply(body: Value) -> Result<ExchangeResponse, ExchangeError> {
    let payload = stream_payload(body)?;
    serde_json::from_value(payload).map_err(|e| ExchangeError::decode("action reply", e))
}

/// Unwrap a stream `post` reply body into the info `data` it carries.
pub fn stream_info_reply(body: Value) -> Result<Value, ExchangeError> {
    let mut payload = stream_payload(body)?;
    Ok(payload.get_mut("data").map(Value::take).unwrap_or(Value::Null))
}

fn stream_payload(mut body: Value) -> Result<Value, ExchangeError> {
    let payload = body.get_mut("payload").map(Value::take).unwrap_or(Value::Null);
    if body["type"] == "error" {
        let message = match payload {
            Value::String(message) => message,
            other => other.to_string(),
        };
        return Err(HyperliquidError::rejected(message).into());
    }
    Ok(payload)
}

pub fn order_statuses(reply: ExchangeResponse) -> Result<Vec<OrderStatusWire>, ExchangeError> {
    let response = check_status(reply)?;
    let statuses = response
        .pointer("/data/statuses")
        .cloned()
        .ok_or_else(|| HyperliquidError::unexpected(&response))?;
    serde_json::from_value(statuses).map_err(|e| ExchangeError::decode("order statuses", e))
}

fn status_oid(status: &OrderStatusWire) -> Result<u64, String> {
    match status {
        OrderStatusWire::Resting(wire) | OrderStatusWire::Filled(wire) => Ok(wire.oid),
        OrderStatusWire::Error(message) => Err(message.clone()),
        OrderStatusWire::Unknown => Err("unknown order status".to_string()),
    }
}

/// Id of the first order of a single order placement
pub fn first_order_id(statuses: &[OrderStatusWire]) -> Result<String, ExchangeError> {
    let first = statuses.first().ok_or(HyperliquidError::EmptyStatuses)?;
    status_oid(first)
        .map(|oid| oid.to_string())
        .map_err(|message| HyperliquidError::rejected(message).into())
}

/// Accepted ids in request order plus one error per rejected item.
pub fn batch_outcome(statuses: &[OrderStatusWire]) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for (index, status) in statuses.iter().enumerate() {
        match status_oid(status) {
            Ok(oid) => outcome.order_ids.push(oid.to_string()),
            Err(message) => outcome.errors.push((index, message)),
        }
    }
    outcome
}

/// A cancel is successful only when every status is `"success"`.
pub fn ensure_cancelled(reply: ExchangeResponse) -> Result<(), ExchangeError> {
    let response = check_status(reply)?;
    match response.pointer("/data/statuses").and_then(Value::as_array) {
        Some(statuses) if !statuses.is_empty() && statuses.iter().all(|s| s == "success") => Ok(()),
        Some(statuses) => Err(HyperliquidError::rejected(Value::from(statuses.clone()).to_string()).into()),
        None => Err(HyperliquidError::unexpected(&response).into()),
    }
}

/// Modify and leverage updates only report `status`.
pub fn ensure_ok(reply: ExchangeResponse) -> Result<(), ExchangeError> {
    check_status(reply).map(|_| ())
}

pub fn parse_open_order(order: &OpenOrder, symbol: &str) -> Result<Order, ExchangeError> {
    let remaining_qty = parse_f64(&order.sz, "sz")?;
    let original_qty = match &order.orig_sz {
        Some(orig) => parse_f64(orig, "origSz")?,
        None => remaining_qty,
    };
    Ok(Order {
        id: order.oid.to_string(),
        symbol: symbol.to_string(),
        order_type: OrderType::Limit,
        side: super::codec::parse_side(&order.side)?,
        price: parse_f64(&order.limit_px, "limitPx")?,
        original_qty,
        remaining_qty,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ExchangeName;

    fn btc() -> Market {
        Market {
            id: 0,
            exchange_name: ExchangeName::Hyperliquid,
            symbol: "BTC".to_string(),
            tick_size: 0.1,
            min_notional: 10.0,
            lot_min_qty: 0.00001,
            lot_max_qty: 0.0,
            lot_step_size: 0.00001,
            market_lot_min_qty: 0.00001,
            market_lot_max_qty: 0.0,
            market_lot_step_size: 0.00001,
            max_leverage: 50.0,
            maker_fee_pct: 0.0001,
            taker_fee_pct: 0.00035,
        }
    }

    fn reply(raw: &str) -> ExchangeResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_new_cloid_shape() {
        let cloid = new_cloid();
        assert_eq!(cloid.len(), 34);
        assert!(cloid.starts_with("0x"));
        assert!(cloid[2..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(cloid, new_cloid());
    }

    #[test]
    fn test_tif_mapping() {
        assert_eq!(tif_wire(OrderTif::Alo).unwrap(), "Alo");
        assert!(matches!(
            tif_wire(OrderTif::Fok),
            Err(ExchangeError::UnsupportedEnum { .. })
        ));
    }

    #[test]
    fn test_price_is_rounded_to_five_sig_figs() {
        assert_eq!(prepare_price(&btc(), 64123.456).unwrap(), "64123");
        assert_eq!(prepare_price(&btc(), 1891.44).unwrap(), "1891.4");
    }

    #[test]
    fn test_order_wire() {
        let wire = order_wire(&btc(), OrderSide::Sell, 64000.0, 0.015, true, OrderTif::Ioc, None)
            .unwrap();
        assert!(!wire.is_buy);
        assert_eq!(wire.size, "0.015");
        assert_eq!(wire.order_type.limit.tif, "Ioc");
        assert!(prepare_qty(&btc(), 0.0).is_err());
    }

    #[test]
    fn test_size_is_rounded_down_to_size_decimals() {
        assert_eq!(prepare_qty(&btc(), 0.000_016).unwrap(), "0.00001");
        assert_eq!(prepare_qty(&btc(), 0.123_459).unwrap(), "0.12345");
        assert!(matches!(
            prepare_qty(&btc(), 0.000_004),
            Err(ExchangeError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_market_limit_price() {
        assert!((market_limit_price(100.0, OrderSide::Buy) - 110.0).abs() < 1e-9);
        assert!((market_limit_price(100.0, OrderSide::Sell) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_order_ref_prefers_client_id() {
        assert_eq!(order_ref("12", Some("0xab")).unwrap(), OrderRef::Cloid("0xab".into()));
        assert_eq!(order_ref("12", Some("")).unwrap(), OrderRef::Oid(12));
        assert!(order_ref("abc", None).is_err());
    }

    #[test]
    fn test_batch_outcome_is_partial() {
        let statuses = order_statuses(reply(
            r#"{"status":"ok","response":{"type":"order","data":{"statuses":[
                {"resting":{"oid":1}},
                {"error":"Order has invalid price."},
                {"filled":{"totalSz":"0.1","avgPx":"10","oid":3}}
            ]}}}"#,
        ))
        .unwrap();
        let outcome = batch_outcome(&statuses);
        assert_eq!(outcome.order_ids, vec!["1", "3"]);
        assert_eq!(outcome.errors, vec![(1, "Order has invalid price.".to_string())]);
        assert!(!outcome.is_complete());
    }

    #[test]
    fn test_first_order_id_error_message() {
        let statuses = order_statuses(reply(
            r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"error":"Insufficient margin"}]}}}"#,
        ))
        .unwrap();
        let err = first_order_id(&statuses).unwrap_err();
        assert!(err.to_string().contains("Insufficient margin"));
        assert!(first_order_id(&[]).is_err());
    }

    #[test]
    fn test_err_status() {
        let err = check_status(reply(r#"{"status":"err","response":"User or API Wallet does not exist."}"#))
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ApiError { ref message, .. } if message.contains("does not exist")));
    }

    #[test]
    fn test_cancel_success_requires_success_statuses() {
        assert!(ensure_cancelled(reply(
            r#"{"status":"ok","response":{"type":"cancel","data":{"statuses":["success"]}}}"#
        ))
        .is_ok());
        assert!(ensure_cancelled(reply(
            r#"{"status":"ok","response":{"type":"cancel","data":{"statuses":[{"error":"Order was never placed"}]}}}"#
        ))
        .is_err());
    }

    #[test]
    fn test_stream_reply_unwrapping() {
        let body = serde_json::json!({"type":"action","payload":{"status":"ok","response":{"type":"default"}}});
        assert!(ensure_ok(stream_action_reply(body).unwrap()).is_ok());

        let body = serde_json::json!({"type":"error","payload":"Invalid nonce"});
        assert!(stream_action_reply(body).is_err());

        let body = serde_json::json!({"type":"info","payload":{"type":"openOrders","data":[]}});
        assert_eq!(stream_info_reply(body).unwrap(), serde_json::json!([]));
    }

    #[test]
    fn test_open_order_falls_back_to_sz() {
        let order: OpenOrder = serde_json::from_str(
            r#"{"coin":"BTC","side":"B","limitPx":"60000.0","sz":"0.5","oid":42,"timestamp":1}"#,
        )
        .unwrap();
        let parsed = parse_open_order(&order, "BTC_USD").unwrap();
        assert_eq!(parsed.id, "42");
        assert!((parsed.original_qty - 0.5).abs() < f64::EPSILON);
        assert_eq!(parsed.side, OrderSide::Buy);
    }
}
