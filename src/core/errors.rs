use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("MessagePack encoding error: {0}")]
    MsgPackError(#[from] rmp_serde::encode::Error),

    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Unexpected HTTP status {status}: {body}")]
    BadStatus { status: String, body: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Unsupported {kind}: {value}")]
    UnsupportedEnum { kind: &'static str, value: String },

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("unsupported exchange: {0}")]
    UnsupportedExchange(String),

    #[error("Stream is closed")]
    StreamClosed,

    #[error("No response for request {id} within {timeout_ms}ms")]
    ResponseTimeout { id: u64, timeout_ms: u64 },

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Other error: {0}")]
    Other(String),
}

impl ExchangeError {
    #[cold]
    #[inline(never)]
    pub fn decode(context: &str, err: impl std::fmt::Display) -> Self {
        Self::DecodeError(format!("{}: {}", context, err))
    }

    #[cold]
    #[inline(never)]
    pub fn unsupported(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnsupportedEnum {
            kind,
            value: value.into(),
        }
    }

    /// True when the exchange may or may not have applied the request.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ResponseTimeout { .. } | Self::ConnectionTimeout(_)
        )
    }
}
