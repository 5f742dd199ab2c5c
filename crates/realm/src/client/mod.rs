//! Reconnecting peer client for the hub.
//!
//! A supervisor task dials the hub, then drives a send half (outbound queue
//! plus heartbeat ticker) and a receive half concurrently. When either half
//! ends, both are torn down and the supervisor redials after a fixed delay.
//! The session cookie issued on the first upgrade is replayed on every
//! reconnect so the client keeps its identity.

use futures::{Sink, SinkExt, Stream, StreamExt};
use realm_protocol::Frame;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{COOKIE, SET_COOKIE};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

/// Capacity of the outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 100;

/// Capacity of the inbound frame channel handed to the caller.
pub const DEFAULT_INBOUND_CAPACITY: usize = 100;

/// Period of the keepalive frame.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Delay between a lost connection and the next dial.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Keepalive payload. Its leading byte is not a hub tag, so the hub only logs it.
pub const HEARTBEAT_PAYLOAD: &str = "ping";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors surfaced by the peer client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The supervisor has stopped; nothing more will be sent.
    #[error("client has shut down")]
    Shutdown,

    /// Dialing or upgrading failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Peer client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Hub endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    pub url: String,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub outbound_capacity: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

/// Handle to a running client.
pub struct ClientHandle {
    outbound: mpsc::Sender<Frame>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ClientHandle {
    /// Queue a frame for the hub. Waits while the queue is full.
    pub async fn send(&self, frame: impl Into<Frame>) -> Result<(), ClientError> {
        self.outbound
            .send(frame.into())
            .await
            .map_err(|_| ClientError::Shutdown)
    }

    /// Stop the supervisor, closing the live connection if there is one.
    pub async fn shutdown(self) {
        self.shutdown.send(true).ok();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Client supervisor ended abnormally");
        }
    }
}

/// Start the client. Returns its handle and the channel of frames received
/// from the hub.
pub fn spawn_client(config: ClientConfig) -> (ClientHandle, mpsc::Receiver<Frame>) {
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity.max(1));
    let (inbound_tx, inbound_rx) = mpsc::channel(DEFAULT_INBOUND_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(supervise(config, outbound_rx, inbound_tx, shutdown_rx));

    (
        ClientHandle {
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        },
        inbound_rx,
    )
}

/// Why one connection ended.
#[derive(Debug)]
enum SessionEnd {
    /// Shutdown requested or every handle dropped.
    Stop,
    Disconnected(String),
}

async fn supervise(
    config: ClientConfig,
    mut outbound: mpsc::Receiver<Frame>,
    inbound: mpsc::Sender<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut cookie: Option<String> = None;
    let mut attempt: u64 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }
        attempt += 1;

        let dialed = tokio::select! {
            dialed = connect(&config.url, cookie.as_deref()) => dialed,
            _ = shutdown.changed() => break,
        };

        match dialed {
            Ok((ws, issued)) => {
                if issued.is_some() {
                    cookie = issued;
                }
                info!(url = %config.url, attempt, "Connected to hub");
                attempt = 0;

                match run_connection(ws, &config, &mut outbound, &inbound, &mut shutdown).await {
                    SessionEnd::Stop => break,
                    SessionEnd::Disconnected(reason) => {
                        warn!(reason = %reason, "Disconnected from hub");
                    }
                }
            }
            Err(e) => warn!(url = %config.url, attempt, error = %e, "Failed to connect to hub"),
        }

        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("Client supervisor stopped");
}

/// Dial `url`, replaying `cookie` (a `name=value` pair) if present. Returns
/// the stream and the cookie pair the hub issued, if any.
async fn connect(url: &str, cookie: Option<&str>) -> Result<(WsStream, Option<String>), ClientError> {
    let mut request = url.into_client_request()?;
    if let Some(value) = cookie.and_then(|c| HeaderValue::from_str(c).ok()) {
        request.headers_mut().insert(COOKIE, value);
    }

    let (ws, response) = connect_async(request).await?;
    let issued = response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .find(|pair| pair.split_once('=').is_some_and(|(_, v)| !v.is_empty()))
        .map(str::to_string);

    Ok((ws, issued))
}

async fn run_connection(
    ws: WsStream,
    config: &ClientConfig,
    outbound: &mut mpsc::Receiver<Frame>,
    inbound: &mpsc::Sender<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (mut sink, mut stream) = ws.split();

    let end = tokio::select! {
        end = send_loop(&mut sink, outbound, config.heartbeat_interval) => end,
        end = recv_loop(&mut stream, inbound) => end,
        _ = shutdown.changed() => SessionEnd::Stop,
    };

    if matches!(end, SessionEnd::Stop) {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "client shutdown".into(),
        }));
        if let Err(e) = sink.send(close).await {
            debug!(error = %e, "Failed to send close frame");
        }
    }

    end
}

async fn send_loop<S>(sink: &mut S, outbound: &mut mpsc::Receiver<Frame>, heartbeat: Duration) -> SessionEnd
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => to_message(frame),
                None => return SessionEnd::Stop,
            },
            _ = ticker.tick() => Message::text(HEARTBEAT_PAYLOAD),
        };

        if let Err(e) = sink.send(message).await {
            return SessionEnd::Disconnected(format!("send failed: {e}"));
        }
    }
}

async fn recv_loop<S>(stream: &mut S, inbound: &mpsc::Sender<Frame>) -> SessionEnd
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => Frame::Binary(bytes.to_vec()),
            Ok(Message::Close(close)) => {
                let reason = close
                    .map(|c| format!("closed by hub ({}): {}", u16::from(c.code), c.reason.as_str()))
                    .unwrap_or_else(|| "closed by hub".to_string());
                return SessionEnd::Disconnected(reason);
            }
            Ok(_) => continue,
            Err(e) => return SessionEnd::Disconnected(format!("receive failed: {e}")),
        };

        debug!(message = %frame.display(), "Frame received");
        if let Err(mpsc::error::TrySendError::Full(_)) = inbound.try_send(frame) {
            warn!("Inbound channel full, dropping frame");
        }
    }

    SessionEnd::Disconnected("stream ended".to_string())
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::text(text),
        Frame::Binary(bytes) => Message::binary(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as futures_mpsc;

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("ws://127.0.0.1:8080/ws");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
        assert_eq!(config.outbound_capacity, 100);
    }

    #[tokio::test]
    async fn test_send_loop_interleaves_heartbeat() {
        let (sink_tx, mut sink_rx) = futures_mpsc::unbounded::<Message>();
        let mut sink = sink_tx.sink_map_err(|_| tungstenite::Error::ConnectionClosed);
        let (tx, mut rx) = mpsc::channel(4);

        tx.send(Frame::from("~hello")).await.unwrap();
        let loop_task = async { send_loop(&mut sink, &mut rx, Duration::from_millis(20)).await };
        let collect = async {
            let first = sink_rx.next().await;
            let second = sink_rx.next().await;
            drop(tx);
            (first, second)
        };

        let (end, (first, second)) = tokio::join!(loop_task, collect);
        assert!(matches!(end, SessionEnd::Stop));
        assert_eq!(first, Some(Message::text("~hello")));
        assert_eq!(second, Some(Message::text(HEARTBEAT_PAYLOAD)));
    }

    #[tokio::test]
    async fn test_recv_loop_forwards_frames_until_close() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut stream = futures::stream::iter(vec![
            Ok(Message::text(".hello")),
            Ok(Message::binary(vec![b'.', 7])),
            Ok(Message::Close(None)),
            Ok(Message::text(".late")),
        ]);

        let end = recv_loop(&mut stream, &tx).await;
        assert!(matches!(end, SessionEnd::Disconnected(_)));
        assert_eq!(rx.try_recv().unwrap(), Frame::from(".hello"));
        assert_eq!(rx.try_recv().unwrap(), Frame::from(vec![b'.', 7]));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let mut config = ClientConfig::new("ws://127.0.0.1:9/ws");
        config.reconnect_delay = Duration::from_millis(10);
        let (handle, _inbound) = spawn_client(config);
        let outbound = handle.outbound.clone();

        handle.shutdown().await;
        assert!(outbound.send(Frame::from(".x")).await.is_err());
    }
}
