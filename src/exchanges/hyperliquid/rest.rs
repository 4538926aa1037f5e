use super::signer::HyperliquidSigner;
use super::types::{Action, Candle, ClearinghouseState, ExchangeResponse, Meta, OpenOrder};
use crate::core::errors::ExchangeError;
use crate::core::kernel::RestClient;
use crate::core::nonce::next_nonce;
use crate::core::types::Interval;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;

/// Typed wrapper around `RestClient` for the `/info` and `/exchange` endpoints
#[derive(Clone)]
pub struct HyperliquidRest<R: RestClient> {
    client: R,
    signer: Arc<HyperliquidSigner>,
}

impl<R: RestClient> HyperliquidRest<R> {
    pub fn new(client: R, signer: Arc<HyperliquidSigner>) -> Self {
        Self { client, signer }
    }

    pub fn signer(&self) -> &Arc<HyperliquidSigner> {
        &self.signer
    }

    pub fn wallet_address(&self) -> &str {
        self.signer.wallet_address()
    }

    /// Perpetual universe; the position in the list is the asset id
    #[instrument(skip(self), fields(exchange = "hpl"))]
    pub async fn get_meta(&self) -> Result<Meta, ExchangeError> {
        self.client
            .post_json("/info", &json!({ "type": "meta" }), false)
            .await
    }

    #[instrument(skip(self), fields(exchange = "hpl", coin = %coin, interval = %interval))]
    pub async fn get_candle_snapshot(
        &self,
        coin: &str,
        interval: Interval,
        start_time: i64,
        end_time: i64,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let body = json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": interval.as_str(),
                "startTime": start_time,
                "endTime": end_time,
            }
        });
        self.client.post_json("/info", &body, false).await
    }

    /// Open orders of this account across every coin
    #[instrument(skip(self), fields(exchange = "hpl"))]
    pub async fn get_open_orders(&self) -> Result<Vec<OpenOrder>, ExchangeError> {
        let body = json!({ "type": "openOrders", "user": self.wallet_address() });
        self.client.post_json("/info", &body, false).await
    }

    #[instrument(skip(self), fields(exchange = "hpl"))]
    pub async fn get_clearinghouse_state(&self) -> Result<ClearinghouseState, ExchangeError> {
        let body = json!({ "type": "clearinghouseState", "user": self.wallet_address() });
        self.client.post_json("/info", &body, false).await
    }

    /// Sign `action` with a fresh nonce and post it to `/exchange`.
    #[instrument(skip(self, action), fields(exchange = "hpl", action = action.kind()))]
    pub async fn exchange(&self, action: Action) -> Result<ExchangeResponse, ExchangeError> {
        let signed = self.signer.sign_action(action, next_nonce())?;
        let body = serde_json::to_value(&signed)?;
        self.client.post_json("/exchange", &body, false).await
    }
}
