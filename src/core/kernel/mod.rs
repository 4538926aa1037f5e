//! Transport layer shared by every exchange
//!
//! - `RestClient` / `ReqwestRest`: HTTP with an exact `200 OK` success check
//!   and a client side rate limit
//! - `Signer`: pluggable HTTP request authentication
//! - `WsCodec` / `WsDialect`: per-channel decoding and per-exchange framing
//! - `WsStream`: the connection state machine (connect, subscribe,
//!   heartbeat, staleness detection, reconnect with resubscribe, request
//!   correlation, idempotent close)
//! - `PendingRequests`: id → reply map backing request correlation
//!
//! Nothing in here knows about a specific exchange.
//!
//! ```rust,no_run
//! use lfg_connect::core::kernel::*;
//! use lfg_connect::core::types::StreamKind;
//! use lfg_connect::exchanges::hyperliquid::codec::{HyperliquidDialect, TradesCodec};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), lfg_connect::core::errors::ExchangeError> {
//! let mut trades = WsStream::subscribe(
//!     "wss://api.hyperliquid.xyz/ws",
//!     StreamKind::Trade,
//!     HyperliquidDialect::ws_config(),
//!     Arc::new(HyperliquidDialect),
//!     TradesCodec::new("BTC", "BTC_USD"),
//!     CancellationToken::new(),
//! )
//! .await?;
//! while let Some(event) = trades.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```
pub mod codec;
pub mod pending;
pub mod rest;
pub mod signer;
pub mod ws;

pub use codec::{Inbound, WsCodec, WsDialect};
pub use pending::{PendingGuard, PendingRequests};
pub use rest::{ReqwestRest, RestBuilder, RestClient, ACCEPTED_STATUS};
pub use signer::{SignatureResult, Signer};
pub use ws::{StreamState, WsConfig, WsStream};
