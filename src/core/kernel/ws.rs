use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{Inbound, WsCodec, WsDialect};
use crate::core::kernel::pending::PendingRequests;
use crate::core::traits::{StreamControl, Subscription};
use crate::core::types::{StreamEvent, StreamKind};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

type WsConn = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsConn, Message>;
type WsRead = SplitStream<WsConn>;

/// Timing configuration of one stream
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Bound on dialing and on every single write
    pub handshake_timeout: Duration,
    /// Client heartbeat period, also enables staleness detection
    pub heartbeat_interval: Option<Duration>,
    /// Proactive reconnect period
    pub auto_reset_interval: Option<Duration>,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay: Duration,
    /// Bound on waiting for a correlated reply
    pub response_timeout: Duration,
    /// Capacity of the subscriber channel
    pub event_buffer: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: None,
            auto_reset_interval: None,
            reconnect_delay: Duration::from_secs(1),
            response_timeout: Duration::from_secs(10),
            event_buffer: 1024,
        }
    }
}

impl WsConfig {
    pub fn with_handshake_timeout(mut self, handshake_timeout: Duration) -> Self {
        self.handshake_timeout = handshake_timeout;
        self
    }

    pub fn with_heartbeat(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn with_auto_reset(mut self, interval: Duration) -> Self {
        self.auto_reset_interval = Some(interval);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = response_timeout;
        self
    }

    /// Silence after which the connection is presumed half-open.
    pub fn stale_after(&self) -> Option<Duration> {
        self.heartbeat_interval
            .map(|heartbeat| self.handshake_timeout + heartbeat)
    }
}

/// Lifecycle of a [`WsStream`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Connecting = 0,
    Open = 1,
    Disconnected = 2,
    Closed = 3,
}

impl StreamState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Disconnected,
            _ => Self::Closed,
        }
    }
}

enum Step {
    Frame(String),
    Skip,
    Reconnect(String),
}

/// One WebSocket connection with keep-alive, reconnect-with-resubscribe and
/// request/response correlation.
///
/// Two tasks run per stream: the read loop, which owns the read half and is
/// the only place frames are dispatched, and the keep-alive loop, which
/// sends heartbeats, detects staleness and triggers periodic resets. Both
/// stop when [`StreamControl::close`] cancels the stop token.
pub struct WsStream {
    url: String,
    kind: StreamKind,
    config: WsConfig,
    dialect: Arc<dyn WsDialect>,
    state: AtomicU8,
    writer: tokio::sync::Mutex<Option<WsWrite>>,
    subscribe_msg: Mutex<Option<String>>,
    last_seen: Mutex<Instant>,
    pending: PendingRequests<Value>,
    reset_tx: mpsc::Sender<()>,
    reset_rx: Mutex<Option<mpsc::Receiver<()>>>,
    stop: CancellationToken,
    done: CancellationToken,
    span: Span,
}

impl std::fmt::Debug for WsStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsStream")
            .field("url", &self.url)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl WsStream {
    pub fn new(
        url: impl Into<String>,
        kind: StreamKind,
        config: WsConfig,
        dialect: Arc<dyn WsDialect>,
    ) -> Self {
        let url = url.into();
        let (reset_tx, reset_rx) = mpsc::channel(1);
        let span = info_span!("ws_stream", exchange = dialect.exchange(), kind = %kind, url = %url);

        Self {
            url,
            kind,
            config,
            dialect,
            state: AtomicU8::new(StreamState::Connecting as u8),
            writer: tokio::sync::Mutex::new(None),
            subscribe_msg: Mutex::new(None),
            last_seen: Mutex::new(Instant::now()),
            pending: PendingRequests::new(),
            reset_tx,
            reset_rx: Mutex::new(Some(reset_rx)),
            stop: CancellationToken::new(),
            done: CancellationToken::new(),
            span,
        }
    }

    /// Create, connect and bind a stream to `cancel` in one go.
    pub async fn subscribe<C: WsCodec>(
        url: impl Into<String>,
        kind: StreamKind,
        config: WsConfig,
        dialect: Arc<dyn WsDialect>,
        codec: C,
        cancel: CancellationToken,
    ) -> Result<Subscription<C::Message>, ExchangeError> {
        let stream = Arc::new(Self::new(url, kind, config, dialect));
        let (tx, rx) = mpsc::channel(stream.config.event_buffer.max(1));
        stream.connect_and_subscribe(codec, tx).await?;
        stream.bind_to(cancel);
        let handle: Arc<dyn StreamControl> = stream;
        Ok(Subscription { handle, events: rx })
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &WsConfig {
        &self.config
    }

    /// Number of requests waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    fn transition(&self, from: StreamState, to: StreamState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn request_reset(&self) {
        // 1-buffered: a reset already queued covers this one
        let _ = self.reset_tx.try_send(());
    }

    /// Dial, send the subscription and start the read and keep-alive tasks.
    ///
    /// Can only be called once per stream. Events, preceded by
    /// `StreamEvent::Connected` and followed by `StreamEvent::Closed`, are
    /// pushed to `events` in arrival order.
    pub async fn connect_and_subscribe<C: WsCodec>(
        self: &Arc<Self>,
        codec: C,
        events: mpsc::Sender<StreamEvent<C::Message>>,
    ) -> Result<(), ExchangeError> {
        let span = self.span.clone();
        async move {
            let Some(reset_rx) = self.reset_rx.lock().take() else {
                return Err(ExchangeError::InvalidParameters(
                    "stream already started".to_string(),
                ));
            };
            if self.is_closed() {
                return Err(ExchangeError::StreamClosed);
            }

            *self.subscribe_msg.lock() = codec
                .subscription()
                .and_then(|params| self.dialect.subscribe_message(&params));

            let read = match self.dial().await {
                Ok(read) => read,
                Err(e) => {
                    self.close().await;
                    return Err(e);
                }
            };
            if let Err(e) = self.send_subscription().await {
                self.close().await;
                return Err(e);
            }
            if !self.transition(StreamState::Connecting, StreamState::Open) {
                self.discard_writer().await;
                return Err(ExchangeError::StreamClosed);
            }
            info!("stream connected");

            let _ = events.send(StreamEvent::Connected).await;

            tokio::spawn(
                Arc::clone(self)
                    .read_loop(read, reset_rx, codec, events)
                    .instrument(self.span.clone()),
            );
            if self.config.heartbeat_interval.is_some()
                || self.config.auto_reset_interval.is_some()
            {
                tokio::spawn(
                    Arc::clone(self)
                        .keep_alive()
                        .instrument(self.span.clone()),
                );
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Close the stream once `cancel` fires.
    pub fn bind_to(self: &Arc<Self>, cancel: CancellationToken) {
        let stream = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => stream.close().await,
                () = stream.done.cancelled() => {}
            }
        });
    }

    /// Send a text frame without waiting for any reply.
    pub async fn send_text(&self, text: String) -> Result<(), ExchangeError> {
        self.send_message(Message::Text(text)).await
    }

    /// Send a request and wait for the reply carrying the same `id`.
    ///
    /// A `ResponseTimeout` means the outcome is unknown: the exchange may
    /// still have acted on the request.
    pub async fn request(&self, id: u64, text: String) -> Result<Value, ExchangeError> {
        if self.is_closed() {
            return Err(ExchangeError::StreamClosed);
        }
        let waiter = self.pending.register(id);
        self.send_text(text).await?;
        waiter.wait(self.config.response_timeout).await
    }

    async fn send_message(&self, message: Message) -> Result<(), ExchangeError> {
        if self.is_closed() {
            return Err(ExchangeError::StreamClosed);
        }
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            return Err(ExchangeError::NetworkError(
                "stream is not connected".to_string(),
            ));
        };

        match timeout(self.config.handshake_timeout, sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ExchangeError::NetworkError(format!(
                "WebSocket write failed: {}",
                e
            ))),
            Err(_) => Err(ExchangeError::ConnectionTimeout(
                "WebSocket write timeout".to_string(),
            )),
        }
    }

    async fn dial(&self) -> Result<WsRead, ExchangeError> {
        let (conn, _) = timeout(
            self.config.handshake_timeout,
            connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string()))?
        .map_err(|e| ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

        let (write, read) = conn.split();
        let mut writer = self.writer.lock().await;
        if self.is_closed() {
            return Err(ExchangeError::StreamClosed);
        }
        *writer = Some(write);
        drop(writer);

        self.touch();
        Ok(read)
    }

    async fn send_subscription(&self) -> Result<(), ExchangeError> {
        let message = self.subscribe_msg.lock().clone();
        match message {
            Some(text) => self.send_text(text).await,
            None => Ok(()),
        }
    }

    async fn discard_writer(&self) {
        let writer = self.writer.lock().await.take();
        if let Some(mut sink) = writer {
            let _ = timeout(self.config.handshake_timeout, sink.close()).await;
        }
    }

    /// Move an open stream to `Disconnected` and drop its socket.
    async fn force_disconnect(&self) {
        if self.transition(StreamState::Open, StreamState::Disconnected) {
            warn!("stream disconnected");
        }
        self.discard_writer().await;
    }

    /// Redial until it works or the stream is closed.
    async fn reconnect(&self) -> Option<WsRead> {
        self.force_disconnect().await;

        loop {
            if self.is_closed() {
                return None;
            }
            tokio::select! {
                () = self.stop.cancelled() => return None,
                () = sleep(self.config.reconnect_delay) => {}
            }

            let read = match self.dial().await {
                Ok(read) => read,
                Err(ExchangeError::StreamClosed) => return None,
                Err(e) => {
                    error!(error = %e, "fail to reconnect stream (retrying...)");
                    continue;
                }
            };

            if let Err(e) = self.send_subscription().await {
                error!(error = %e, "fail to resubscribe stream (retrying...)");
                self.force_disconnect().await;
                continue;
            }

            if self.transition(StreamState::Disconnected, StreamState::Open) {
                info!("stream reconnected");
                return Some(read);
            }
            self.discard_writer().await;
            return None;
        }
    }

    async fn read_loop<C: WsCodec>(
        self: Arc<Self>,
        mut read: WsRead,
        mut reset_rx: mpsc::Receiver<()>,
        codec: C,
        events: mpsc::Sender<StreamEvent<C::Message>>,
    ) {
        loop {
            let step = tokio::select! {
                biased;
                () = self.stop.cancelled() => break,
                Some(()) = reset_rx.recv() => Step::Reconnect("reset requested".to_string()),
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => Step::Frame(text),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                        Ok(text) => Step::Frame(text),
                        Err(e) => {
                            warn!(error = %e, "non UTF-8 binary frame skipped");
                            Step::Skip
                        }
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        self.touch();
                        if let Err(e) = self.send_message(Message::Pong(payload)).await {
                            warn!(error = %e, "failed to answer ping");
                        }
                        Step::Skip
                    }
                    Some(Ok(Message::Pong(_))) => {
                        self.touch();
                        Step::Skip
                    }
                    Some(Ok(Message::Frame(_))) => Step::Skip,
                    Some(Ok(Message::Close(frame))) => {
                        Step::Reconnect(format!("server closed connection: {:?}", frame))
                    }
                    Some(Err(e)) => Step::Reconnect(format!("read failed: {}", e)),
                    None => Step::Reconnect("connection ended".to_string()),
                },
            };

            match step {
                Step::Skip => {}
                Step::Frame(text) => {
                    if !self.dispatch(&text, &codec, &events).await {
                        break;
                    }
                }
                Step::Reconnect(reason) => {
                    if self.stop.is_cancelled() {
                        break;
                    }
                    warn!(%reason, "reconnecting stream");
                    match self.reconnect().await {
                        Some(fresh) => {
                            read = fresh;
                            while reset_rx.try_recv().is_ok() {}
                        }
                        None => break,
                    }
                }
            }
        }

        self.close().await;
        let _ = events.send(StreamEvent::Closed).await;
    }

    /// Route one text frame. Returns `false` once nobody is listening.
    async fn dispatch<C: WsCodec>(
        &self,
        text: &str,
        codec: &C,
        events: &mpsc::Sender<StreamEvent<C::Message>>,
    ) -> bool {
        match self.dialect.classify(text) {
            Inbound::Malformed(reason) => {
                warn!(%reason, "malformed frame skipped");
                return true;
            }
            Inbound::Pong => {
                self.touch();
                debug!("pong received");
                return true;
            }
            Inbound::ServerError(message) => {
                self.touch();
                error!(%message, "stream error from server");
                return true;
            }
            Inbound::Reply { id, body } => {
                self.touch();
                if self.pending.deliver(id, body) {
                    return true;
                }
            }
            Inbound::Data => self.touch(),
        }

        let decoded = match codec.decode_message(text) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, "failed to decode frame");
                return true;
            }
        };

        for event in decoded {
            tokio::select! {
                biased;
                () = self.stop.cancelled() => return false,
                sent = events.send(StreamEvent::Event(event)) => {
                    if sent.is_err() {
                        debug!("subscriber dropped, closing stream");
                        return false;
                    }
                }
            }
        }
        true
    }

    async fn keep_alive(self: Arc<Self>) {
        // disabled timers still need a value, they are never polled
        let idle = Duration::from_secs(24 * 60 * 60);
        let heartbeat_period = self.config.heartbeat_interval.unwrap_or(idle);
        let reset_period = self.config.auto_reset_interval.unwrap_or(idle);

        let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut auto_reset = interval_at(Instant::now() + reset_period, reset_period);
        auto_reset.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.stop.cancelled() => break,
                _ = heartbeat.tick(), if self.config.heartbeat_interval.is_some() => {
                    self.heartbeat().await;
                }
                _ = auto_reset.tick(), if self.config.auto_reset_interval.is_some() => {
                    if self.state() == StreamState::Open {
                        info!("auto-reset: recycling connection");
                        self.request_reset();
                    }
                }
            }
        }
    }

    async fn heartbeat(&self) {
        if self.state() != StreamState::Open {
            return;
        }

        if let Some(limit) = self.config.stale_after() {
            let idle = self.last_seen.lock().elapsed();
            if idle > limit {
                warn!(
                    idle_ms = idle.as_millis() as u64,
                    "no message within keep-alive window, forcing reconnect"
                );
                self.force_disconnect().await;
                self.request_reset();
                return;
            }
        }

        if let Some(ping) = self.dialect.ping_message() {
            if let Err(e) = self.send_text(ping).await {
                warn!(error = %e, "heartbeat failed, forcing reconnect");
                self.force_disconnect().await;
                self.request_reset();
            }
        }
    }
}

#[async_trait]
impl StreamControl for WsStream {
    async fn close(&self) {
        let previous = self.state.swap(StreamState::Closed as u8, Ordering::AcqRel);
        if previous == StreamState::Closed as u8 {
            return;
        }

        self.stop.cancel();
        self.pending.clear();
        self.discard_writer().await;
        self.done.cancel();
        self.span.in_scope(|| info!("stream closed"));
    }

    fn is_closed(&self) -> bool {
        self.state() == StreamState::Closed
    }

    async fn closed(&self) {
        self.done.cancelled().await;
    }
}
