use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::error::{io_cause, is_transient_io, GatewayError};
use crate::session::Session;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    // Browsers do not apply CORS to upgrades, so the origin list is enforced here.
    if let Some(origin) = headers.get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|origin| state.config.origin_allowed(origin))
            .unwrap_or(false);
        if !allowed {
            tracing::warn!(component = "ws", origin = ?origin, "websocket origin rejected");
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    ws.max_message_size(state.config.max_payload_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let ping_tx = tx.clone();

    let mut session = match Session::open(&state, tx) {
        Ok(session) => session,
        Err(err) => {
            reject(&mut sink, err).await;
            return;
        }
    };

    // Drains this connection's outbound queue; ends once the hub and the
    // pinger have both dropped their senders.
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let ping_every = state.config.ping_interval;
    let idle_timeout = state.config.idle_timeout;
    let mut ping = time::interval_at(Instant::now() + ping_every, ping_every);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(frame) = frame else { break };
                last_seen = Instant::now();
                match frame {
                    Ok(Message::Text(text)) => session.handle_text(&text).await,
                    Ok(Message::Binary(_)) => session.reply_error("binary frames are not supported"),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        if io_cause(&e).is_some_and(is_transient_io) {
                            tracing::debug!(component = "ws", conn_id = %session.id(), error = %e, "connection dropped");
                        } else {
                            tracing::warn!(component = "ws", conn_id = %session.id(), error = %e, "websocket error");
                        }
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if ping_tx.send(Message::Ping(Vec::new())).is_err() {
                    break;
                }
            }
            _ = time::sleep_until(last_seen + idle_timeout) => {
                tracing::info!(
                    component = "ws",
                    conn_id = %session.id(),
                    state = ?session.connection().state(),
                    idle_secs = idle_timeout.as_secs_f64(),
                    "no traffic from peer, closing"
                );
                break;
            }
        }
    }

    // Terminal transition.
    drop(session);
}

/// Tells a refused client why, then closes without registering anything.
async fn reject(sink: &mut SplitSink<WebSocket, Message>, err: GatewayError) {
    if let Some(event) = err.client_event("connect") {
        if let Ok(text) = serde_json::to_string(&event) {
            let _ = sink.send(Message::Text(text)).await;
        }
    }
    let reason = match err {
        GatewayError::CapacityExceeded => "server full",
        _ => "rejected",
    };
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: close_code::AGAIN,
            reason: reason.into(),
        })))
        .await;
}
