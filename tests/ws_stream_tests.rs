use futures::{SinkExt, StreamExt};
use lfg_connect::core::errors::ExchangeError;
use lfg_connect::core::kernel::{Inbound, StreamState, WsCodec, WsConfig, WsDialect, WsStream};
use lfg_connect::core::traits::StreamControl;
use lfg_connect::core::types::{StreamEvent, StreamKind};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

type ServerWs = WebSocketStream<TcpStream>;

/// Minimal framing: `{"channel":"pong"}` is a heartbeat reply, frames with a
/// numeric `id` are request replies, `{"error":..}` is a server error.
struct TestDialect;

impl WsDialect for TestDialect {
    fn exchange(&self) -> &'static str {
        "test"
    }

    fn subscribe_message(&self, params: &Value) -> Option<String> {
        Some(json!({"method": "subscribe", "params": params}).to_string())
    }

    fn ping_message(&self) -> Option<String> {
        Some(json!({"method": "ping"}).to_string())
    }

    fn classify(&self, text: &str) -> Inbound {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => return Inbound::Malformed(e.to_string()),
        };
        if value["channel"] == "pong" {
            return Inbound::Pong;
        }
        if let Some(id) = value.get("id").and_then(Value::as_u64) {
            return Inbound::Reply {
                id,
                body: value["result"].clone(),
            };
        }
        if let Some(error) = value.get("error") {
            return Inbound::ServerError(error.to_string());
        }
        Inbound::Data
    }
}

struct TickCodec;

impl WsCodec for TickCodec {
    type Message = i64;

    fn subscription(&self) -> Option<Value> {
        Some(json!({"channel": "ticks"}))
    }

    fn decode_message(&self, text: &str) -> Result<Vec<i64>, ExchangeError> {
        let value: Value = serde_json::from_str(text)?;
        if value["channel"] != "ticks" {
            return Ok(vec![]);
        }
        value["n"]
            .as_i64()
            .map(|n| vec![n])
            .ok_or_else(|| ExchangeError::DecodeError("tick without n".to_string()))
    }
}

fn tick(n: i64) -> Message {
    Message::Text(json!({"channel": "ticks", "n": n}).to_string())
}

fn fast_config() -> WsConfig {
    WsConfig::default()
        .with_handshake_timeout(Duration::from_millis(500))
        .with_reconnect_delay(Duration::from_millis(50))
        .with_response_timeout(Duration::from_millis(500))
}

/// Local WebSocket server; `handler` gets the zero based connection index.
async fn spawn_server<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize, ServerWs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let handler = handler.clone();
            tokio::spawn(async move {
                if let Ok(ws) = accept_async(tcp).await {
                    handler(index, ws).await;
                }
            });
        }
    });

    (url, connections)
}

/// Wait for the subscribe frame, counting it.
async fn expect_subscribe(ws: &mut ServerWs, subscriptions: &AtomicUsize) {
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(text) = msg {
            if text.contains("subscribe") {
                subscriptions.fetch_add(1, Ordering::SeqCst);
                return;
            }
        }
    }
}

async fn drain(ws: &mut ServerWs) {
    while let Some(Ok(_)) = ws.next().await {}
}

async fn next_event(rx: &mut mpsc::Receiver<StreamEvent<i64>>) -> Option<StreamEvent<i64>> {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no stream event within 5s")
}

async fn start(
    url: &str,
    config: WsConfig,
) -> (Arc<WsStream>, mpsc::Receiver<StreamEvent<i64>>) {
    let stream = Arc::new(WsStream::new(
        url,
        StreamKind::Trade,
        config,
        Arc::new(TestDialect),
    ));
    let (tx, rx) = mpsc::channel(64);
    stream.connect_and_subscribe(TickCodec, tx).await.unwrap();
    (stream, rx)
}

#[cfg(test)]
mod ws_stream_tests {
    use super::*;

    #[tokio::test]
    async fn test_events_follow_connected_in_order() {
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let subs = subscriptions.clone();
        let (url, _) = spawn_server(move |_, mut ws| {
            let subs = subs.clone();
            async move {
                expect_subscribe(&mut ws, &subs).await;
                ws.send(tick(1)).await.unwrap();
                ws.send(Message::Text("not json".to_string())).await.unwrap();
                ws.send(Message::Text(r#"{"error":"bad channel"}"#.to_string()))
                    .await
                    .unwrap();
                ws.send(Message::Text(r#"{"channel":"other","n":9}"#.to_string()))
                    .await
                    .unwrap();
                ws.send(tick(2)).await.unwrap();
                ws.send(tick(3)).await.unwrap();
                drain(&mut ws).await;
            }
        })
        .await;

        let (stream, mut rx) = start(&url, fast_config()).await;
        assert_eq!(stream.state(), StreamState::Open);
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Connected));
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(1)));
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(2)));
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(3)));
        assert_eq!(subscriptions.load(Ordering::SeqCst), 1);

        stream.close().await;
    }

    #[tokio::test]
    async fn test_resubscribes_after_server_drop() {
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let subs = subscriptions.clone();
        let (url, connections) = spawn_server(move |index, mut ws| {
            let subs = subs.clone();
            async move {
                expect_subscribe(&mut ws, &subs).await;
                if index == 0 {
                    ws.send(tick(1)).await.unwrap();
                    let _ = ws.close(None).await;
                } else {
                    ws.send(tick(2)).await.unwrap();
                    drain(&mut ws).await;
                }
            }
        })
        .await;

        let (stream, mut rx) = start(&url, fast_config()).await;
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Connected));
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(1)));
        // no second Connected on reconnect
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(2)));

        assert_eq!(connections.load(Ordering::SeqCst), 2);
        assert_eq!(subscriptions.load(Ordering::SeqCst), 2);
        assert_eq!(stream.state(), StreamState::Open);

        stream.close().await;
    }

    #[tokio::test]
    async fn test_silent_connection_is_recycled() {
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let subs = subscriptions.clone();
        let (url, connections) = spawn_server(move |index, mut ws| {
            let subs = subs.clone();
            async move {
                expect_subscribe(&mut ws, &subs).await;
                if index > 0 {
                    ws.send(tick(7)).await.unwrap();
                }
                // heartbeats are read and never answered
                drain(&mut ws).await;
            }
        })
        .await;

        let config = fast_config()
            .with_handshake_timeout(Duration::from_millis(200))
            .with_heartbeat(Duration::from_millis(100));
        let (stream, mut rx) = start(&url, config).await;
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Connected));
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(7)));
        assert!(connections.load(Ordering::SeqCst) >= 2);

        stream.close().await;
    }

    #[tokio::test]
    async fn test_auto_reset_reconnects_and_resubscribes() {
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let subs = subscriptions.clone();
        let (url, connections) = spawn_server(move |index, mut ws| {
            let subs = subs.clone();
            async move {
                expect_subscribe(&mut ws, &subs).await;
                ws.send(tick(index as i64 + 1)).await.unwrap();
                drain(&mut ws).await;
            }
        })
        .await;

        let config = fast_config().with_auto_reset(Duration::from_millis(300));
        let (stream, mut rx) = start(&url, config).await;
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Connected));
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(1)));
        // the recycled connection delivers without announcing itself again
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Event(2)));

        assert!(connections.load(Ordering::SeqCst) >= 2);
        assert!(subscriptions.load(Ordering::SeqCst) >= 2);

        stream.close().await;
        let mut connected = 0;
        while let Some(event) = next_event(&mut rx).await {
            if event == StreamEvent::Connected {
                connected += 1;
            }
        }
        assert_eq!(connected, 0);
    }

    #[tokio::test]
    async fn test_requests_are_correlated_by_id() {
        let (url, _) = spawn_server(|_, mut ws| async move {
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let value: Value = serde_json::from_str(&text).unwrap();
                match value.get("id").and_then(Value::as_u64) {
                    // never answered
                    Some(99) | None => {}
                    Some(id) => {
                        let reply = json!({"id": id, "result": {"echo": id}});
                        ws.send(Message::Text(reply.to_string())).await.unwrap();
                    }
                }
            }
        })
        .await;

        let config = fast_config().with_response_timeout(Duration::from_millis(200));
        let (stream, mut rx) = start(&url, config).await;
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Connected));

        let (first, second) = tokio::join!(
            stream.request(7, json!({"id": 7}).to_string()),
            stream.request(8, json!({"id": 8}).to_string()),
        );
        assert_eq!(first.unwrap(), json!({"echo": 7}));
        assert_eq!(second.unwrap(), json!({"echo": 8}));

        let err = stream
            .request(99, json!({"id": 99}).to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ResponseTimeout { id: 99, .. }));
        assert_eq!(stream.pending_requests(), 0);

        stream.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (url, _) = spawn_server(|_, mut ws| async move {
            drain(&mut ws).await;
        })
        .await;

        let (stream, mut rx) = start(&url, fast_config()).await;
        assert_eq!(next_event(&mut rx).await, Some(StreamEvent::Connected));

        tokio::join!(stream.close(), stream.close());
        stream.close().await;
        timeout(Duration::from_secs(1), stream.closed())
            .await
            .unwrap();

        let mut closed = 0;
        while let Some(event) = next_event(&mut rx).await {
            if event == StreamEvent::Closed {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
        assert!(stream.is_closed());
        assert_eq!(stream.state(), StreamState::Closed);

        let err = stream
            .request(1, json!({"id": 1}).to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::StreamClosed));
        assert!(matches!(
            stream.send_text("{}".to_string()).await,
            Err(ExchangeError::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn test_cancellation_token_closes_subscription() {
        let (url, _) = spawn_server(|_, mut ws| async move {
            drain(&mut ws).await;
        })
        .await;

        let cancel = CancellationToken::new();
        let mut subscription = WsStream::subscribe(
            url,
            StreamKind::Trade,
            fast_config(),
            Arc::new(TestDialect),
            TickCodec,
            cancel.clone(),
        )
        .await
        .unwrap();
        assert_eq!(subscription.recv().await, Some(StreamEvent::Connected));

        cancel.cancel();
        let event = timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap();
        assert_eq!(event, Some(StreamEvent::Closed));
        assert!(subscription.is_closed());
    }

    #[tokio::test]
    async fn test_dial_failure_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let result = WsStream::subscribe(
            url,
            StreamKind::Trade,
            fast_config(),
            Arc::new(TestDialect),
            TickCodec,
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(
            result.err().unwrap(),
            ExchangeError::NetworkError(_) | ExchangeError::ConnectionTimeout(_)
        ));
    }
}
