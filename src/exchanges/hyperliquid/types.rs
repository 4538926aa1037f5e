use crate::core::errors::ExchangeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Hyperliquid specific failures, converted into [`ExchangeError`] at the
/// adapter boundary
#[derive(Error, Debug)]
pub enum HyperliquidError {
    #[error("exchange rejected request: {message}")]
    Rejected { message: String },

    #[error("server returned 0 order")]
    EmptyStatuses,

    #[error("unexpected response: {body}")]
    UnexpectedResponse { body: String },

    #[error("invalid private key: {reason}")]
    InvalidKey { reason: String },

    #[error("order id {value:?} is not numeric")]
    InvalidOrderId { value: String },
}

impl HyperliquidError {
    /// Exchange side refusal of an action
    #[cold]
    #[inline(never)]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    #[cold]
    #[inline(never)]
    pub fn unexpected(body: &Value) -> Self {
        Self::UnexpectedResponse {
            body: body.to_string(),
        }
    }

    #[cold]
    #[inline(never)]
    pub fn invalid_key(reason: impl std::fmt::Display) -> Self {
        Self::InvalidKey {
            reason: reason.to_string(),
        }
    }
}

impl From<HyperliquidError> for ExchangeError {
    fn from(err: HyperliquidError) -> Self {
        match err {
            HyperliquidError::Rejected { message } => Self::ApiError { code: 0, message },
            HyperliquidError::InvalidKey { reason } => Self::AuthError(reason),
            HyperliquidError::InvalidOrderId { value } => {
                Self::InvalidParameters(format!("order id {:?} is not numeric", value))
            }
            other => Self::Other(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound actions. Field order is the msgpack key order and part of the
// signed payload, do not reorder.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LimitTif {
    pub tif: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderTypeWire {
    pub limit: LimitTif,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderWire {
    #[serde(rename = "a")]
    pub asset: u32,
    #[serde(rename = "b")]
    pub is_buy: bool,
    #[serde(rename = "p")]
    pub limit_px: String,
    #[serde(rename = "s")]
    pub size: String,
    #[serde(rename = "r")]
    pub reduce_only: bool,
    #[serde(rename = "t")]
    pub order_type: OrderTypeWire,
    #[serde(rename = "c", skip_serializing_if = "Option::is_none")]
    pub cloid: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrderAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub orders: Vec<OrderWire>,
    pub grouping: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CancelWire {
    #[serde(rename = "a")]
    pub asset: u32,
    #[serde(rename = "o")]
    pub oid: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CancelAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub cancels: Vec<CancelWire>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CancelByCloidWire {
    pub asset: u32,
    pub cloid: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CancelByCloidAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub cancels: Vec<CancelByCloidWire>,
}

/// Exchange order id or client order id
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum OrderRef {
    Oid(u64),
    Cloid(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModifyAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub oid: OrderRef,
    pub order: OrderWire,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateLeverageAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub asset: u32,
    #[serde(rename = "isCross")]
    pub is_cross: bool,
    pub leverage: u32,
}

/// Every L1 action this crate signs
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Action {
    Order(OrderAction),
    Cancel(CancelAction),
    CancelByCloid(CancelByCloidAction),
    Modify(ModifyAction),
    UpdateLeverage(UpdateLeverageAction),
}

impl Action {
    pub fn order(orders: Vec<OrderWire>) -> Self {
        Self::Order(OrderAction {
            kind: "order",
            orders,
            grouping: "na",
        })
    }

    pub fn cancel(cancels: Vec<CancelWire>) -> Self {
        Self::Cancel(CancelAction {
            kind: "cancel",
            cancels,
        })
    }

    pub fn cancel_by_cloid(cancels: Vec<CancelByCloidWire>) -> Self {
        Self::CancelByCloid(CancelByCloidAction {
            kind: "cancelByCloid",
            cancels,
        })
    }

    pub fn modify(oid: OrderRef, order: OrderWire) -> Self {
        Self::Modify(ModifyAction {
            kind: "modify",
            oid,
            order,
        })
    }

    pub fn update_leverage(asset: u32, is_cross: bool, leverage: u32) -> Self {
        Self::UpdateLeverage(UpdateLeverageAction {
            kind: "updateLeverage",
            asset,
            is_cross,
            leverage,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Order(a) => a.kind,
            Self::Cancel(a) => a.kind,
            Self::CancelByCloid(a) => a.kind,
            Self::Modify(a) => a.kind,
            Self::UpdateLeverage(a) => a.kind,
        }
    }
}

/// ECDSA signature split the way the API expects it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signature {
    pub r: String,
    pub s: String,
    pub v: u8,
}

/// Body of `POST /exchange` and payload of a stream `action` post
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SignedAction {
    pub action: Action,
    pub nonce: u64,
    pub signature: Signature,
    #[serde(rename = "vaultAddress")]
    pub vault_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostRequest<P> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub payload: P,
}

/// `{"method":"post","id":..,"request":{"type":..,"payload":..}}`
#[derive(Debug, Clone, Serialize)]
pub struct WsPost<P> {
    pub method: &'static str,
    pub id: u64,
    pub request: PostRequest<P>,
}

impl<P: Serialize> WsPost<P> {
    pub fn action(id: u64, payload: P) -> Self {
        Self::new(id, "action", payload)
    }

    pub fn info(id: u64, payload: P) -> Self {
        Self::new(id, "info", payload)
    }

    fn new(id: u64, kind: &'static str, payload: P) -> Self {
        Self {
            method: "post",
            id,
            request: PostRequest { kind, payload },
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    pub name: String,
    pub sz_decimals: u32,
    pub max_leverage: u32,
    #[serde(default)]
    pub only_isolated: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Candle {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "T")]
    pub close_time: i64,
    #[serde(rename = "s")]
    pub coin: String,
    #[serde(rename = "i", default)]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v", default)]
    pub volume: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub oid: u64,
    pub coin: String,
    pub side: String,
    pub limit_px: String,
    pub sz: String,
    /// Not sent by every endpoint version, falls back to `sz`
    #[serde(default)]
    pub orig_sz: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearinghouseState {
    pub margin_summary: MarginSummary,
    #[serde(default)]
    pub asset_positions: Vec<AssetPosition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginSummary {
    pub account_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPosition {
    pub position: PositionData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionData {
    pub coin: String,
    pub szi: String,
    #[serde(default)]
    pub entry_px: Option<String>,
}

/// Reply of `POST /exchange`, also the `payload` of a stream action reply
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeResponse {
    pub status: String,
    #[serde(default)]
    pub response: Value,
}

/// One entry of `response.data.statuses`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatusWire {
    Resting(OidWire),
    Filled(OidWire),
    Error(String),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OidWire {
    pub oid: u64,
}

/// Envelope shared by every stream frame
#[derive(Debug, Clone, Deserialize)]
pub struct WsFrame {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsTrade {
    pub coin: String,
    pub side: String,
    pub px: String,
    pub sz: String,
    pub time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsActiveAssetCtx {
    pub coin: String,
    pub ctx: WsAssetCtx,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsAssetCtx {
    pub mark_px: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsBook {
    pub coin: String,
    pub levels: Vec<Vec<WsLevel>>,
    pub time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsLevel {
    pub px: String,
    pub sz: String,
    pub n: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsOrderUpdate {
    pub order: WsBasicOrder,
    pub status: String,
    pub status_timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsBasicOrder {
    pub coin: String,
    pub side: String,
    pub limit_px: String,
    pub sz: String,
    pub oid: u64,
    pub timestamp: i64,
    pub orig_sz: String,
    #[serde(default)]
    pub cloid: Option<String>,
}
