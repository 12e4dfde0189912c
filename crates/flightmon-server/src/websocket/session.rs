//! WebSocket session lifecycle, from upgrade through closure.
//!
//! `Connecting → Open → Closing → Closed`:
//! - the session joins the live set when it becomes `Open`
//! - a peer close frame moves it to `Closing`; the protocol layer queues the
//!   close reply, the writer stops and the reply is flushed before the session
//!   ends
//! - server shutdown aborts the pending receive and the writer immediately
//! - on every path the session leaves the live set exactly once

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use flightmon_core::SessionId;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::monitor::Monitor;

use super::connection::ClientConnection;
use super::handler::handle_message;
use super::manager::SessionManager;

/// How long the writer gets to stop and flush the close reply.
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Shared monitor.
    pub monitor: Arc<Monitor>,
    /// Live-session set.
    pub manager: Arc<SessionManager>,
    /// Server-wide cancellation.
    pub shutdown: CancellationToken,
    /// Outbound frames buffered per session.
    pub send_queue_capacity: usize,
}

enum Exit {
    PeerClosed,
    Disconnected,
    Aborted,
}

/// Run one client session to completion.
#[instrument(skip_all, fields(session_id = %id))]
pub async fn run_session(socket: WebSocket, id: SessionId, ctx: SessionContext) {
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(ctx.send_queue_capacity.max(1));
    let conn = Arc::new(ClientConnection::new(id, send_tx));
    let (mut ws_tx, mut ws_rx) = socket.split();

    if let Err(reason) = ctx.manager.open(&conn) {
        warn!(?reason, "session refused");
        let frame = CloseFrame {
            code: close_code::AGAIN,
            reason: "Server at capacity".into(),
        };
        let _ = ws_tx.send(Message::Close(Some(frame))).await;
        return;
    }

    // Outbound: replies and snapshots in queue order. Hands the sink back so
    // the close reply can be flushed.
    let stop = CancellationToken::new();
    let writer_stop = stop.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = writer_stop.cancelled() => break,
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        ws_tx
    });

    let exit = loop {
        let next = tokio::select! {
            biased;
            () = ctx.shutdown.cancelled() => None,
            frame = ws_rx.next() => Some(frame),
        };
        let Some(frame) = next else {
            break Exit::Aborted;
        };

        match frame {
            Some(Ok(Message::Text(text))) => reply(&conn, text.as_str(), &ctx.monitor),
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => reply(&conn, text, &ctx.monitor),
                Err(_) => debug!(len = data.len(), "ignoring non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Close(_))) => break Exit::PeerClosed,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Err(err)) => {
                debug!(error = %err, "transport error, treating as closure");
                break Exit::Disconnected;
            }
            None => break Exit::Disconnected,
        }
    };

    match exit {
        Exit::PeerClosed => {
            info!("client sent close frame");
            let _ = conn.mark_closing();
            stop.cancel();
            match tokio::time::timeout(CLOSE_ACK_TIMEOUT, &mut writer).await {
                Ok(Ok(mut ws_tx)) => {
                    // The reply echoing the peer's close frame is already queued
                    match tokio::time::timeout(CLOSE_ACK_TIMEOUT, ws_tx.flush()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => debug!(error = %err, "close reply flushed, transport ended"),
                        Err(_) => warn!("timed out flushing close reply"),
                    }
                }
                Ok(Err(err)) => warn!(error = %err, "session writer failed"),
                Err(_) => writer.abort(),
            }
        }
        Exit::Disconnected => {
            info!("client disconnected");
            writer.abort();
        }
        Exit::Aborted => {
            info!("session aborted by shutdown");
            writer.abort();
        }
    }

    let _ = ctx.manager.close(&conn.id);
}

fn reply(conn: &ClientConnection, text: &str, monitor: &Monitor) {
    let response = handle_message(text, monitor);
    if !conn.send(Arc::new(response.to_json())) {
        debug!("failed to enqueue reply (channel full or closed)");
    }
}

// Session behavior over real sockets is covered by tests/integration.rs.
