mod common;

use common::MockRest;
use lfg_connect::core::errors::ExchangeError;
use lfg_connect::core::kernel::ReqwestRest;
use lfg_connect::core::symbols::SymbolMap;
use lfg_connect::exchanges::binance_perp::BinancePerpRest;
use lfg_connect::exchanges::hyperliquid::builder::markets_from_meta;
use lfg_connect::exchanges::hyperliquid::connector::BinanceKlines;
use lfg_connect::exchanges::hyperliquid::types::Meta;
use lfg_connect::exchanges::hyperliquid::{HyperliquidConnector, HyperliquidRest, HyperliquidSigner};
use lfg_connect::{
    AccountInfo, Exchange, ExchangeName, Interval, LimitOrderInput, LimitOrderRequest,
    MarketDataSource, OrderPlacer, OrderSide, OrderTif,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const KEY: &str = "0x0000000000000000000000000000000000000000000000000000000000000001";

fn connector(mock: &MockRest) -> HyperliquidConnector<MockRest> {
    connector_with_klines(mock, None)
}

/// Binance klines pointed at a closed local port: nothing may reach it.
fn unreachable_binance_klines() -> BinanceKlines {
    BinanceKlines {
        rest: BinancePerpRest::new(ReqwestRest::public("http://127.0.0.1:9", "bnf").unwrap()),
        ws_url: "ws://127.0.0.1:9/ws".to_string(),
    }
}

fn connector_with_klines(
    mock: &MockRest,
    binance_klines: Option<BinanceKlines>,
) -> HyperliquidConnector<MockRest> {
    let signer = Arc::new(HyperliquidSigner::from_private_key(KEY, false).unwrap());
    let meta: Meta = serde_json::from_value(json!({"universe": [
        {"name": "BTC", "szDecimals": 5, "maxLeverage": 50},
        {"name": "ETH", "szDecimals": 4, "maxLeverage": 50}
    ]}))
    .unwrap();
    let symbols = SymbolMap::new([("BTC_USD", "BTC"), ("ETH_USD", "ETH")]).unwrap();

    HyperliquidConnector::new(
        HyperliquidRest::new(mock.clone(), signer),
        symbols,
        markets_from_meta(&meta),
        "ws://127.0.0.1:9".to_string(),
        true,
        binance_klines,
    )
}

fn ok_default() -> Value {
    json!({"status": "ok", "response": {"type": "default"}})
}

fn order_reply(statuses: Value) -> Value {
    json!({"status": "ok", "response": {"type": "order", "data": {"statuses": statuses}}})
}

fn candle(t: i64, close: &str) -> Value {
    json!({"t": t, "T": t + 59_999, "s": "BTC", "i": "1m",
           "o": "100", "c": close, "h": "110", "l": "90", "v": "1.5", "n": 3})
}

#[cfg(test)]
mod hyperliquid_adapter_tests {
    use super::*;

    #[tokio::test]
    async fn test_leverage_is_pushed_once_per_value() {
        let mock = MockRest::new();
        mock.reply("POST /exchange updateLeverage", ok_default())
            .reply("POST /exchange order", order_reply(json!([{"resting": {"oid": 101}}])))
            .reply("POST /exchange order", order_reply(json!([{"resting": {"oid": 102}}])));
        let hpl = connector(&mock);

        let order = LimitOrderRequest::new(OrderSide::Buy, 65_432.17, 0.001_234_5, 10);
        assert_eq!(hpl.open_limit_order("BTC_USD", &order).await.unwrap(), "101");
        assert_eq!(hpl.open_limit_order("BTC_USD", &order).await.unwrap(), "102");

        let leverage_calls = mock.calls_to("POST /exchange updateLeverage");
        assert_eq!(leverage_calls.len(), 1);
        let action = &leverage_calls[0].body.as_ref().unwrap()["action"];
        assert_eq!(
            action,
            &json!({"type": "updateLeverage", "asset": 0, "isCross": true, "leverage": 10})
        );
        assert_eq!(hpl.cached_leverage("BTC_USD"), Some(10));

        let orders = mock.calls_to("POST /exchange order");
        let body = orders[0].body.as_ref().unwrap();
        assert_eq!(body["action"]["grouping"], "na");
        let wire = &body["action"]["orders"][0];
        assert_eq!(wire["a"], 0);
        assert_eq!(wire["b"], true);
        assert_eq!(wire["p"], "65432");
        assert_eq!(wire["s"], "0.00123");
        assert_eq!(wire["r"], false);
        assert_eq!(wire["t"], json!({"limit": {"tif": "Gtc"}}));
        assert!(body["nonce"].as_u64().unwrap() > 0);
        assert!(body["signature"]["r"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn test_rejected_leverage_is_not_cached() {
        let mock = MockRest::new();
        mock.reply(
            "POST /exchange updateLeverage",
            json!({"status": "err", "response": "Invalid leverage value"}),
        );
        let hpl = connector(&mock);

        let order = LimitOrderRequest::new(OrderSide::Sell, 3_000.0, 0.5, 99);
        let err = hpl.open_limit_order("ETH_USD", &order).await.unwrap_err();
        assert!(err.to_string().contains("Invalid leverage value"));
        assert_eq!(hpl.cached_leverage("ETH_USD"), None);
        assert!(mock.calls_to("POST /exchange order").is_empty());
    }

    #[tokio::test]
    async fn test_batch_reports_partial_failure() {
        let mock = MockRest::new();
        mock.reply("POST /exchange updateLeverage", ok_default()).reply(
            "POST /exchange order",
            order_reply(json!([
                {"resting": {"oid": 1}},
                {"error": "Order has invalid price."},
                {"filled": {"totalSz": "0.1", "avgPx": "3000", "oid": 3}}
            ])),
        );
        let hpl = connector(&mock);

        let orders = [
            LimitOrderInput { side: OrderSide::Buy, price: 2_990.0, qty: 0.1, tif: OrderTif::Gtc },
            LimitOrderInput { side: OrderSide::Buy, price: 1.0, qty: 0.1, tif: OrderTif::Alo },
            LimitOrderInput { side: OrderSide::Buy, price: 3_010.0, qty: 0.1, tif: OrderTif::Ioc },
        ];
        let outcome = hpl
            .open_batch_limit_orders("ETH_USD", &orders, 5)
            .await
            .unwrap();
        assert_eq!(outcome.order_ids, vec!["1", "3"]);
        assert_eq!(outcome.errors, vec![(1, "Order has invalid price.".to_string())]);

        let body = mock.calls_to("POST /exchange order")[0].body.clone().unwrap();
        let wires = body["action"]["orders"].as_array().unwrap();
        assert_eq!(wires.len(), 3);
        assert_eq!(wires[1]["t"]["limit"]["tif"], "Alo");
        assert!(wires.iter().all(|w| w["a"] == 1));
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected_before_any_request() {
        let mock = MockRest::new();
        let hpl = connector(&mock);
        let err = hpl.open_batch_limit_orders("BTC_USD", &[], 5).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidParameters(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_by_client_id() {
        let mock = MockRest::new();
        mock.reply(
            "POST /exchange cancelByCloid",
            order_reply(json!(["success"])),
        );
        let hpl = connector(&mock);

        let cloid = "0x1234567890abcdef1234567890abcdef";
        hpl.cancel_order("BTC_USD", "", Some(cloid)).await.unwrap();

        let body = mock.calls_to("POST /exchange cancelByCloid")[0].body.clone().unwrap();
        assert_eq!(body["action"]["cancels"], json!([{"asset": 0, "cloid": cloid}]));
    }

    #[tokio::test]
    async fn test_failed_cancel_is_an_error() {
        let mock = MockRest::new();
        mock.reply(
            "POST /exchange cancel",
            order_reply(json!([{"error": "Order was never placed, already canceled, or filled."}])),
        );
        let hpl = connector(&mock);
        assert!(hpl.cancel_order("BTC_USD", "77", None).await.is_err());
        assert!(matches!(
            hpl.cancel_order("BTC_USD", "not-a-number", None).await,
            Err(ExchangeError::InvalidParameters(_))
        ));
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_all_is_not_supported() {
        let hpl = connector(&MockRest::new());
        assert!(matches!(
            hpl.cancel_all_orders("BTC_USD").await,
            Err(ExchangeError::NotImplemented(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_orders_are_filtered_by_coin() {
        let mock = MockRest::new();
        mock.reply(
            "POST /info openOrders",
            json!([
                {"coin": "BTC", "side": "B", "limitPx": "60000", "sz": "0.1", "origSz": "0.3", "oid": 11, "timestamp": 1},
                {"coin": "ETH", "side": "A", "limitPx": "3000", "sz": "1", "oid": 12, "timestamp": 2}
            ]),
        );
        let hpl = connector(&mock);

        let orders = hpl.get_pending_orders("BTC_USD").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, "11");
        assert_eq!(orders[0].symbol, "BTC_USD");
        assert_eq!(orders[0].side, OrderSide::Buy);
        assert!((orders[0].original_qty - 0.3).abs() < 1e-12);
        assert!((orders[0].remaining_qty - 0.1).abs() < 1e-12);

        let user = &mock.calls()[0].body.clone().unwrap()["user"];
        assert_eq!(user, "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf");
    }

    #[tokio::test]
    async fn test_balance_and_positions() {
        let state = json!({
            "marginSummary": {"accountValue": "1234.5", "totalNtlPos": "0"},
            "assetPositions": [
                {"type": "oneWay", "position": {"coin": "BTC", "szi": "-0.25", "entryPx": "61000.0"}},
                {"type": "oneWay", "position": {"coin": "ETH", "szi": "2", "entryPx": "3000"}}
            ]
        });
        let mock = MockRest::new();
        mock.reply("POST /info clearinghouseState", state.clone())
            .reply("POST /info clearinghouseState", state);
        let hpl = connector(&mock);

        assert!((hpl.get_account_balance().await.unwrap() - 1234.5).abs() < 1e-9);

        let positions = hpl.get_active_positions("BTC_USD").await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].side, OrderSide::Sell);
        assert!((positions[0].qty - 0.25).abs() < 1e-12);
        assert!((positions[0].entry_price - 61_000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_close_positions_sends_reduce_only_ioc() {
        let mock = MockRest::new();
        mock.reply(
            "POST /info clearinghouseState",
            json!({
                "marginSummary": {"accountValue": "100"},
                "assetPositions": [{"position": {"coin": "BTC", "szi": "-0.5", "entryPx": "60000"}}]
            }),
        )
        .reply("POST /exchange updateLeverage", ok_default())
        .reply("POST /info candleSnapshot", json!([candle(0, "60000")]))
        .reply(
            "POST /exchange order",
            order_reply(json!([{"filled": {"totalSz": "0.5", "avgPx": "60010", "oid": 5}}])),
        );
        let hpl = connector(&mock);

        hpl.close_active_positions("BTC_USD", 3).await.unwrap();

        let body = mock.calls_to("POST /exchange order")[0].body.clone().unwrap();
        let wire = &body["action"]["orders"][0];
        assert_eq!(wire["b"], true);
        assert_eq!(wire["r"], true);
        assert_eq!(wire["s"], "0.5");
        assert_eq!(wire["p"], "66000");
        assert_eq!(wire["t"]["limit"]["tif"], "Ioc");
    }

    #[tokio::test]
    async fn test_klines_keep_last_window() {
        let mock = MockRest::new();
        mock.reply(
            "POST /info candleSnapshot",
            json!([candle(0, "101"), candle(60_000, "102"), candle(120_000, "103")]),
        )
        .reply("POST /info candleSnapshot", json!([]));
        let hpl = connector(&mock);

        let klines = hpl.get_klines("BTC_USD", Interval::OneMinute, 2).await.unwrap();
        let closes: Vec<f64> = klines.iter().map(|k| k.kline.c).collect();
        assert_eq!(closes, vec![102.0, 103.0]);
        assert!(klines.iter().all(|k| k.symbol == "BTC_USD"));

        let req = &mock.calls()[0].body.clone().unwrap()["req"];
        assert_eq!(req["coin"], "BTC");
        assert_eq!(req["interval"], "1m");
        let span = req["endTime"].as_i64().unwrap() - req["startTime"].as_i64().unwrap();
        assert_eq!(span, 4 * 60_000);

        let err = hpl.get_klines("BTC_USD", Interval::OneMinute, 2).await.unwrap_err();
        assert_eq!(err.to_string(), "Other error: no klines data available");
    }

    #[tokio::test]
    async fn test_empty_kline_window_is_rejected() {
        let mock = MockRest::new();
        let hpl = connector(&mock);
        let err = hpl.get_klines("BTC_USD", Interval::OneMinute, 0).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidParameters(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_binance_klines_reject_unknown_symbols() {
        let hpl = connector_with_klines(&MockRest::new(), Some(unreachable_binance_klines()));
        assert!(hpl.uses_binance_klines());

        let err = hpl
            .get_klines("DOGE_USD", Interval::OneMinute, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownSymbol(_)));

        let err = hpl
            .subscribe_kline_stream(
                CancellationToken::new(),
                "DOGE_USD",
                Interval::OneMinute,
                5_000,
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ExchangeError::UnknownSymbol(_)));
    }

    #[tokio::test]
    async fn test_symbols_and_markets() {
        let hpl = connector(&MockRest::new());
        assert_eq!(hpl.name(), ExchangeName::Hyperliquid);
        assert_eq!(hpl.to_uni_symbol("ETH").unwrap(), "ETH_USD");
        assert_eq!(hpl.to_loc_symbol("BTC_USD").unwrap(), "BTC");
        assert!(matches!(
            hpl.to_loc_symbol("DOGE_USD"),
            Err(ExchangeError::UnknownSymbol(_))
        ));

        assert_eq!(hpl.get_market("ETH_USD").unwrap().id, 1);
        assert!(hpl.get_market("DOGE_USD").is_none());
    }
}
