pub mod actions; // order wires and reply interpretation
pub mod builder;
pub mod codec; // impl WsDialect + one WsCodec per channel
pub mod connector; // Exchange adapter
pub mod rest; // typed /info and /exchange calls
pub mod signer; // msgpack + keccak + EIP-712 action signing
pub mod stream; // order management over the WebSocket
pub mod types; // serde structs ← raw JSON

pub use actions::new_cloid;
pub use builder::{build_connector, HyperliquidBuilder};
pub use codec::HyperliquidDialect;
pub use connector::HyperliquidConnector;
pub use rest::HyperliquidRest;
pub use signer::HyperliquidSigner;
pub use stream::HyperliquidOrderStream;
pub use types::{Action, HyperliquidError};
