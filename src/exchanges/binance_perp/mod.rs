pub mod builder;
pub mod codec; // impl WsDialect + one WsCodec per stream
pub mod connector; // Exchange adapter
pub mod rest; // thin typed wrapper around RestClient
pub mod signer; // HMAC-SHA256 request signing
pub mod types; // serde structs ← raw JSON

pub use builder::build_connector;
pub use codec::BinancePerpDialect;
pub use connector::BinancePerpConnector;
pub use rest::BinancePerpRest;
pub use signer::BinancePerpSigner;
pub use types::BinancePerpError;
