use crate::core::errors::ExchangeError;
use serde_json::Value;

/// Codec trait for one subscription channel of one exchange
///
/// Converts raw text frames into typed events. Control frames (ping, pong,
/// close) and request replies are handled by the stream before the codec
/// sees anything.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed events of this channel
    type Message: Send + 'static;

    /// Subscription parameters sent after every (re)connect
    ///
    /// `None` for exchanges that subscribe through the URL.
    fn subscription(&self) -> Option<Value> {
        None
    }

    /// Decode a raw text frame into typed events
    ///
    /// # Returns
    /// - `Ok(events)` - decoded events, empty when the frame belongs to another channel
    /// - `Err(error)` - the frame claims to be this channel but is malformed
    fn decode_message(&self, text: &str) -> Result<Vec<Self::Message>, ExchangeError>;
}

/// How a stream should treat one inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Heartbeat reply
    Pong,
    /// Error pushed by the server, logged and skipped
    ServerError(String),
    /// Reply to a request sent over the stream
    Reply { id: u64, body: Value },
    /// Anything else, handed to the codec
    Data,
    /// Not parseable at all
    Malformed(String),
}

/// Exchange-level framing shared by every channel of that exchange:
/// subscribe envelope, client heartbeat payload and frame classification.
pub trait WsDialect: Send + Sync + 'static {
    fn exchange(&self) -> &'static str;

    /// Wrap codec subscription parameters into the wire message.
    fn subscribe_message(&self, params: &Value) -> Option<String>;

    /// Client initiated heartbeat, `None` when only the server pings.
    fn ping_message(&self) -> Option<String> {
        None
    }

    fn classify(&self, text: &str) -> Inbound;
}
