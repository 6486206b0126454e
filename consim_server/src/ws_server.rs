//! WebSocket push transport.
//!
//! Every connection becomes one snapshot subscriber. A writer task owns the
//! socket and takes frames straight from the subscriber's depth-1 slot, so a
//! stalled socket holds at most the frame being written and resumes with the
//! newest one. Replies and pings reach the writer over a small control
//! queue. Client text messages are `{type, data}` envelopes answered with one
//! reply envelope each.

use std::fmt::Display;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use consim_core::{CommandError, EngineHandle, Subscription, ValidationError};
use consim_env::{EnvError, Envelope, Frame, FrameSink, SubscriberId};
use futures_util::{Sink, SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Interval between server pings.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Replies and pings buffered per connection. Snapshot frames never queue.
const CONTROL_QUEUE: usize = 16;

/// Binds the listening socket.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind websocket server to {addr}"))?;
    info!(addr = %listener.local_addr()?, "ws_server.listening");
    Ok(listener)
}

/// Accepts connections until the listener fails.
pub async fn serve(listener: TcpListener, handle: EngineHandle) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .with_context(|| "failed to accept websocket connection")?;
        tokio::spawn(handle_connection(stream, peer, handle.clone()));
    }
}

/// Frame sink writing snapshot text directly to a socket.
struct WsFrameSink<S> {
    id: SubscriberId,
    sink: S,
}

impl<S> WsFrameSink<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    fn new(id: SubscriberId, sink: S) -> Self {
        Self { id, sink }
    }

    async fn send_message(&mut self, message: Message) -> Result<(), EnvError> {
        self.sink
            .send(message)
            .await
            .map_err(|err| EnvError::transport(format!("subscriber {}: {err}", self.id)))
    }
}

#[async_trait]
impl<S> FrameSink for WsFrameSink<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), EnvError> {
        self.send_message(Message::Text(frame.payload.to_string())).await
    }

    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }
}

/// Owns the socket's write half until the subscription or the control queue
/// ends. Returns the number of frames written.
async fn write_loop<S>(
    mut subscription: Subscription,
    mut out: WsFrameSink<S>,
    mut control: mpsc::Receiver<Message>,
) -> Result<u64, EnvError>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    let mut delivered = 0;
    loop {
        tokio::select! {
            biased;
            message = control.recv() => match message {
                Some(message) => out.send_message(message).await?,
                None => break,
            },
            frame = subscription.next_frame() => match frame {
                Some(frame) => {
                    out.send_frame(&frame).await?;
                    delivered += 1;
                }
                None => break,
            },
        }
    }
    Ok(delivered)
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, handle: EngineHandle) {
    let ws_stream = match accept_async(stream).await {
        Ok(stream) => stream,
        Err(err) => {
            error!(peer = %peer, error = %err, "ws_server.accept_failed");
            return;
        }
    };
    let (sink, mut source) = ws_stream.split();

    let id = SubscriberId::new();
    let subscription = match handle.subscribe(id).await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(peer = %peer, error = %err, "ws_server.subscribe_failed");
            return;
        }
    };
    info!(peer = %peer, subscriber = %id, "ws_server.connected");

    let (control_tx, control_rx) = mpsc::channel::<Message>(CONTROL_QUEUE);
    let mut writer = tokio::spawn(write_loop(subscription, WsFrameSink::new(id, sink), control_rx));
    let mut ping_interval = time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            biased;
            result = &mut writer => {
                match result {
                    Ok(Ok(frames)) => debug!(subscriber = %id, frames, "ws_server.stream_ended"),
                    Ok(Err(err)) => debug!(subscriber = %id, error = %err, "ws_server.stream_failed"),
                    Err(err) => warn!(subscriber = %id, error = %err, "ws_server.writer_panicked"),
                }
                break;
            }
            _ = ping_interval.tick() => {
                if control_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            message = source.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        let reply = respond(&handle, &text).await;
                        match reply.to_json() {
                            Ok(json) => {
                                if control_tx.send(Message::Text(json)).await.is_err() {
                                    break;
                                }
                            }
                            Err(err) => warn!(subscriber = %id, error = %err, "ws_server.reply_encode_failed"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        debug!(subscriber = %id, "ws_server.binary_ignored");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(subscriber = %id, error = %err, "ws_server.read_failed");
                        break;
                    }
                }
            }
        }
    }

    handle.unsubscribe(id);
    writer.abort();
    info!(peer = %peer, subscriber = %id, "ws_server.disconnected");
}

/// Parses one client message and produces its reply envelope.
pub async fn respond(handle: &EngineHandle, text: &str) -> Envelope {
    let timestamp = timestamp_ms();
    match Envelope::from_json(text) {
        Ok(request) => handle.dispatch(&request, timestamp).await,
        Err(err) => {
            let err = CommandError::from(ValidationError::MalformedData {
                kind: "envelope".to_string(),
                reason: err.to_string(),
            });
            Envelope::new(
                "command_error",
                json!({ "command": null, "code": err.code(), "reason": err.to_string() }),
                timestamp,
            )
        }
    }
}

fn timestamp_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use consim_core::{Broadcaster, EngineConfig, SimulationRuntime};
    use consim_env::TokioContext;
    use futures_util::sink;
    use std::sync::Arc;
    use tokio_tungstenite::connect_async;

    fn start_engine() -> EngineHandle {
        let config = EngineConfig {
            initial_nodes: 8,
            ..EngineConfig::default()
        };
        let (runtime, handle) = SimulationRuntime::new(Arc::new(TokioContext::with_seed(5)), config).unwrap();
        tokio::spawn(runtime.run());
        handle
    }

    #[tokio::test]
    async fn test_respond_to_query_and_garbage() {
        let handle = start_engine();
        handle.wait_for_tick(1).await.unwrap();

        let reply = respond(&handle, r#"{"type":"status","data":null}"#).await;
        assert_eq!(reply.kind, "status");
        assert_eq!(reply.data["running"], true);

        let reply = respond(&handle, "not json").await;
        assert_eq!(reply.kind, "command_error");
        assert_eq!(reply.data["code"], "validation_error");

        handle.shutdown();
    }

    fn frame(tick: u64) -> Frame {
        Frame::new(tick, format!("{{\"tick\":{tick}}}"))
    }

    fn text(tick: u64) -> Message {
        Message::Text(format!("{{\"tick\":{tick}}}"))
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_stalled_writer_resumes_with_newest_frame() {
        let mut broadcaster = Broadcaster::new(1);
        let id = SubscriberId::from_seed(1);
        let subscription = broadcaster.subscribe(id);

        // Socket stand-in with room for one unread message
        let (socket_tx, mut socket_rx) = mpsc::channel::<Message>(1);
        let socket = Box::pin(sink::unfold(socket_tx, |tx, message: Message| async move {
            tx.send(message).await.map_err(|_| "socket closed")?;
            Ok::<_, &'static str>(tx)
        }));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        let writer = tokio::spawn(write_loop(subscription, WsFrameSink::new(id, socket), control_rx));

        broadcaster.publish(frame(1));
        settle().await;
        // Fills the socket; the writer now blocks mid-write
        broadcaster.publish(frame(2));
        settle().await;
        for tick in 3..=200 {
            broadcaster.publish(frame(tick));
        }

        assert_eq!(socket_rx.recv().await, Some(text(1)));
        assert_eq!(socket_rx.recv().await, Some(text(2)));
        assert_eq!(socket_rx.recv().await, Some(text(200)));
        settle().await;
        assert!(socket_rx.try_recv().is_err());

        control_tx.send(Message::Ping(Vec::new())).await.unwrap();
        assert_eq!(socket_rx.recv().await, Some(Message::Ping(Vec::new())));

        drop(control_tx);
        assert_eq!(writer.await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_writer_stops_on_socket_error() {
        let mut broadcaster = Broadcaster::new(1);
        let id = SubscriberId::from_seed(2);
        let subscription = broadcaster.subscribe(id);

        let (socket_tx, socket_rx) = mpsc::channel::<Message>(1);
        drop(socket_rx);
        let socket = Box::pin(sink::unfold(socket_tx, |tx, message: Message| async move {
            tx.send(message).await.map_err(|_| "socket closed")?;
            Ok::<_, &'static str>(tx)
        }));
        let (_control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        let writer = tokio::spawn(write_loop(subscription, WsFrameSink::new(id, socket), control_rx));

        broadcaster.publish(frame(1));
        let result = writer.await.unwrap();
        assert!(matches!(result, Err(EnvError::TransportFault(_))));
    }

    #[tokio::test]
    async fn test_websocket_streams_state_and_answers() {
        let handle = start_engine();
        let listener = bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, handle.clone()));

        let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        ws.send(Message::Text(r#"{"type":"add_node","data":{"x":1.0,"y":2.0}}"#.to_string()))
            .await
            .unwrap();

        let mut saw_state = false;
        let mut saw_result = false;
        while !(saw_state && saw_result) {
            let msg = time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                let envelope = Envelope::from_json(&text).unwrap();
                match envelope.kind.as_str() {
                    "state" => saw_state = true,
                    "command_result" => {
                        assert_eq!(envelope.data["command"], "add_node");
                        saw_result = true;
                    }
                    other => panic!("unexpected message {other}"),
                }
            }
        }

        ws.close(None).await.unwrap();
        handle.shutdown();
    }
}
