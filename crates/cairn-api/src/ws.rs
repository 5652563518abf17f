//! WebSocket plumbing — upgrade, read loop, and the per-connection
//! writer task.
//!
//! The read loop feeds frames to the protocol state machine in
//! `cairn-hub`; the writer task is the single consumer of the
//! connection's outbound queue, which is what makes writes to one socket
//! serial. Downloads arrive on the queue as one item and are chunked
//! onto the wire here, so no broadcast can land between their frames.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use cairn_core::frame::ClientFrame;
use cairn_core::wire::{encode_data_frame, DOWNLOAD_CHUNK, KEEPALIVE_PERIOD, MAX_FRAME_BYTES};
use cairn_hub::{ConnectionCtx, Download, Hub, Outbound};

use crate::handlers::ApiState;

pub async fn handle_upgrade(State(state): State<ApiState>, ws: WebSocketUpgrade) -> Response {
    ws.max_message_size(MAX_FRAME_BYTES)
        .max_frame_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| connection_task(socket, state.hub.clone()))
}

async fn connection_task(socket: WebSocket, hub: Arc<Hub>) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(sink, rx));

    let mut conn = ConnectionCtx::new(tx);
    tracing::debug!(device = %conn.device_id, "connection open");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(device = %conn.device_id, error = %e, "read error, closing");
                break;
            }
        };

        match message {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => conn.handle_control(&hub, frame).await,
                Err(e) => {
                    tracing::debug!(device = %conn.device_id, error = %e, "ignoring malformed control frame");
                }
            },
            Message::Binary(data) => conn.handle_data(&hub, data).await,
            Message::Close(_) => break,
            // Transport pings are answered by the WebSocket layer.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    conn.closed(&hub).await;
    tracing::debug!(device = %conn.device_id, "connection closed");

    // Dropping the connection context drops the queue sender; the writer
    // drains what is left and exits.
    drop(conn);
    let _ = writer.await;
}

/// Single consumer of one connection's outbound queue. Also owns the
/// keepalive: a transport ping every [`KEEPALIVE_PERIOD`].
async fn write_loop(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::UnboundedReceiver<Outbound>) {
    let mut keepalive = tokio::time::interval(KEEPALIVE_PERIOD);

    loop {
        tokio::select! {
            item = rx.recv() => {
                let Some(item) = item else { break };
                let sent = match item {
                    Outbound::Control(json) => {
                        sink.send(Message::Text(json.as_str().into())).await.is_ok()
                    }
                    Outbound::Download(download) => stream_download(&mut sink, &download).await,
                };
                if !sent {
                    break;
                }
            }
            _ = keepalive.tick() => {
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Emit `file_download_start`, the body in fixed-size data frames, then
/// `file_download_complete`. Returns false on transport failure — a close
/// mid-download aborts the remaining frames silently.
async fn stream_download(sink: &mut SplitSink<WebSocket, Message>, download: &Download) -> bool {
    if sink
        .send(Message::Text(download.start.as_str().into()))
        .await
        .is_err()
    {
        return false;
    }

    for chunk in download.body.chunks(DOWNLOAD_CHUNK) {
        let frame = match encode_data_frame(&download.file_id, chunk) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(file = %download.file_id, error = %e, "failed to frame download chunk");
                return true;
            }
        };
        if sink.send(Message::Binary(frame)).await.is_err() {
            return false;
        }
    }

    sink.send(Message::Text(download.complete.as_str().into()))
        .await
        .is_ok()
}
