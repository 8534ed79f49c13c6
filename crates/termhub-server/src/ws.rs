//! WebSocket transport: input and resize frames in, output, error and exit
//! frames out, over one connection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use termhub_pty::{OutputSubscriber, PtySession};
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::protocol::{ClientFrame, CursorQuery, ServerFrame};
use crate::state::AppState;

/// GET /terminal/sessions/:id/ws?seq=N
///
/// Unknown sessions are rejected with 404 before the upgrade.
pub async fn session_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CursorQuery>,
) -> Result<Response, ApiError> {
    let session = state.registry.get(&id).await?;
    let interval = state.stream_interval;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, session, query.seq, interval)))
}

/// Error replies queued for the send loop before the reader waits on it.
const REPLY_QUEUE: usize = 16;

async fn handle_socket(
    socket: WebSocket,
    session: Arc<PtySession>,
    cursor: u64,
    interval: Duration,
) {
    let id = session.id().to_string();
    log::info!("session {id}: websocket attached at seq {cursor}");

    let (ws_sink, mut ws_stream) = socket.split();
    let (reply_tx, reply_rx) = mpsc::channel::<ServerFrame>(REPLY_QUEUE);

    let subscriber = OutputSubscriber::new(Arc::clone(&session), cursor, interval);
    let mut send_task = tokio::spawn(send_loop(ws_sink, subscriber, reply_rx));

    loop {
        tokio::select! {
            message = ws_stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = apply_client_frame(&session, &text).await {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::debug!("session {id}: websocket receive failed: {e}");
                    break;
                }
            },
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    log::info!("session {id}: websocket detached");
}

/// Write frames to the client one at a time.
///
/// Output is pulled from the subscriber only after the previous frame was
/// sent, so a slow client leaves unread output in the session buffer.
async fn send_loop(
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut subscriber: OutputSubscriber,
    mut reply_rx: mpsc::Receiver<ServerFrame>,
) {
    loop {
        let frame = tokio::select! {
            Some(reply) = reply_rx.recv() => reply,
            event = subscriber.next() => match event {
                Some(event) => ServerFrame::from(event),
                None => break,
            },
        };

        let is_exit = matches!(frame, ServerFrame::Exit { .. });
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("failed to encode websocket frame: {e}");
                continue;
            }
        };
        if ws_sink.send(Message::Text(json)).await.is_err() {
            return;
        }
        if is_exit {
            break;
        }
    }
    let _ = ws_sink.close().await;
}

/// Apply one inbound text frame. Returns the error frame to send back, if any.
pub async fn apply_client_frame(session: &PtySession, text: &str) -> Option<ServerFrame> {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(ServerFrame::Error {
                message: format!("invalid frame: {e}"),
            })
        }
    };

    let result = match frame {
        ClientFrame::Input { data } => session.write_input(&data).await,
        ClientFrame::Resize { rows, cols } => session.resize(rows, cols).await,
    };

    result.err().map(|e| ServerFrame::Error {
        message: e.to_string(),
    })
}
