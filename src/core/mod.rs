pub mod config;
pub mod errors;
pub mod filter;
pub mod kernel;
pub mod nonce;
pub mod precision;
pub mod symbols;
pub mod traits;
pub mod types;
