//! WebSocket transport: upgrade and per-connection session loop.
//!
//! A connection needs no declared identity to speak; envelopes may arrive
//! before the `user_online` that registers it. Inbound frames from one
//! socket are processed strictly in arrival order on this task.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use vimbalambi_proto::envelope;

use crate::app_state::AppState;

const OUTBOUND_QUEUE: usize = 1024;

pub async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);

    let conn_id = app.core.registry().next_conn_id();
    app.metrics.session_opened();
    tracing::debug!(conn_id, "client connected");

    let ping_every = Duration::from_millis(app.cfg.relay.ping_interval_ms);
    let idle_timeout = Duration::from_millis(app.cfg.relay.idle_timeout_ms);
    let mut ping = interval(ping_every);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                match maybe_out {
                    Some(frame) => {
                        if ws_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping.tick() => {
                if last_seen.elapsed() >= idle_timeout {
                    tracing::info!(conn_id, "idle timeout");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(frame)) = incoming else { break; };
                last_seen = Instant::now();

                match frame {
                    Message::Text(text) => match envelope::decode(&text) {
                        Ok(env) => app.core.dispatch(conn_id, &out_tx, env).await,
                        Err(e) => {
                            app.metrics.decode_error();
                            tracing::warn!(conn_id, error = %e, "dropping malformed frame");
                        }
                    },
                    Message::Binary(_) => {
                        app.metrics.decode_error();
                        tracing::warn!(conn_id, "dropping unexpected binary frame");
                    }
                    Message::Ping(payload) => {
                        let _ = ws_tx.send(Message::Pong(payload)).await;
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }

    app.core.handle_disconnect(conn_id);
    app.metrics.session_closed();
    tracing::debug!(conn_id, "client disconnected");
}
