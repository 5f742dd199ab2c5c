//! WebSocket handler for hub connections.
//!
//! Each accepted connection runs a read loop in its own task plus one writer
//! task that owns the socket sink and drains the connection's writer gate.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use realm_protocol::Frame;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::api::AppState;
use crate::error::ConnectionError;

use super::connection::{ConnectionHandle, Outbound};
use super::registry::ConnectionRegistry;
use super::relay;
use super::types::{ConnectedUser, ConnectionId, ConnectionState};

/// Close reason sent to a connection displaced by a newer one for the same
/// session.
const REPLACED_REASON: &str = "replaced by a newer connection";

/// How long to keep polling after a peer's close frame so the close reply is
/// flushed.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let resolved = state
        .sessions
        .resolve_or_create(state.cookie.session_id(&headers))
        .await;
    let set_cookie = resolved.created.then(|| state.cookie.issue(&resolved.id));
    let nick = resolved.session.nick().to_string();
    let session_id = resolved.id;

    debug!(state = %ConnectionState::Connecting, nick = %nick, "WebSocket upgrade request");

    let registry = state.registry.clone();
    let settings = state.hub.clone();
    let mut response = ws
        .on_failed_upgrade(|e| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| {
            let (handle, outbound) =
                ConnectionHandle::new(settings.outbound_buffer, settings.send_timeout);
            let span = info_span!("ws", conn_id = handle.id());
            handle_ws_connection(socket, registry, session_id, nick, handle, outbound).instrument(span)
        });

    if let Some(cookie) = set_cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Failed to encode session cookie"),
        }
    }

    response
}

/// Drive one upgraded connection until it ends.
async fn handle_ws_connection(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    session_id: String,
    nick: String,
    handle: ConnectionHandle,
    outbound: mpsc::Receiver<Outbound>,
) {
    let (sink, mut stream) = socket.split();
    let conn_id = handle.id();
    let owner = handle.clone();

    let mut writer =
        tokio::spawn(run_writer(sink, outbound, conn_id, handle.send_timeout()).in_current_span());

    let (guard, previous) = registry.register_scoped(ConnectedUser::new(&session_id, &nick, handle));
    if let Some(previous) = previous {
        info!(
            previous_conn_id = previous.connection_id(),
            "Closing connection displaced by a newer one"
        );
        if let Err(e) = previous.handle.close(close_code::AWAY, REPLACED_REASON) {
            debug!(error = %e, "Displaced connection already closing");
        }
    }
    info!(nick = %nick, state = %ConnectionState::Open, "WebSocket connection opened");

    let end = tokio::select! {
        end = read_loop(&registry, &session_id, &mut stream) => end,
        _ = &mut writer => ConnectionError::Closed,
        _ = owner.cancelled() => ConnectionError::Dropped,
    };

    debug!(state = %ConnectionState::Closing, "WebSocket connection closing");
    if end.is_normal() {
        info!("WebSocket connection closed");
    } else {
        warn!(error = %end, "WebSocket connection ended");
    }

    drop(guard);
    writer.abort();
    debug!(state = %ConnectionState::Closed, "WebSocket connection cleaned up");
}

/// Read frames until the connection ends, returning why it ended.
async fn read_loop<S>(registry: &ConnectionRegistry, session_id: &str, stream: &mut S) -> ConnectionError
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut last_frame = Instant::now();

    while let Some(message) = stream.next().await {
        let frame = match message {
            Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
            Ok(Message::Binary(bytes)) => Frame::Binary(bytes.to_vec()),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(close)) => {
                // The socket queued its close reply; the next poll writes it.
                timeout(CLOSE_FLUSH_TIMEOUT, stream.next()).await.ok();
                return close_reason(close);
            }
            Err(e) => return ConnectionError::Transport(e.to_string()),
        };

        let elapsed = last_frame.elapsed();
        last_frame = Instant::now();
        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            bytes = frame.len(),
            "Frame received"
        );

        relay::handle_frame(registry, session_id, frame).await;
    }

    ConnectionError::Transport("stream ended without a close frame".to_string())
}

/// Classify a received close frame.
fn close_reason(close: Option<CloseFrame>) -> ConnectionError {
    match close {
        None => ConnectionError::NormalClosure,
        Some(frame) if frame.code == close_code::NORMAL => ConnectionError::NormalClosure,
        Some(frame) => ConnectionError::Transport(format!(
            "closed with code {}: {}",
            frame.code,
            frame.reason.as_str()
        )),
    }
}

/// Drain the writer gate into the socket sink.
///
/// Returns after a close request, when every handle is gone, or on the first
/// write that fails or does not finish within `send_timeout`. Dropping the
/// receiver makes later sends fail with [`ConnectionError::Closed`].
async fn run_writer<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Outbound>,
    conn_id: ConnectionId,
    send_timeout: Duration,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(frame) => {
                match timeout(send_timeout, sink.send(to_message(frame))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(conn_id, error = %e, "Write failed, stopping writer");
                        return;
                    }
                    Err(_) => {
                        warn!(conn_id, "Socket write timed out, stopping writer");
                        return;
                    }
                }
            }
            Outbound::Close { code, reason } => {
                let close = Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                }));
                match timeout(send_timeout, sink.send(close)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(conn_id, error = %e, "Failed to send close frame"),
                    Err(_) => debug!(conn_id, "Close frame write timed out"),
                }
                return;
            }
        }
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}
