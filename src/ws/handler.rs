//! WebSocket upgrade handler

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::GameHandle;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ClientMsg;

/// Frames queued per connection before new ones are dropped
const OUTBOUND_BUFFER: usize = 64;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Identity issued by a previous welcome message, for reconnection
    pub player_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    info!(remote = %remote, reconnect = query.player_id.is_some(), "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, remote, query.player_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, remote: SocketAddr, requested: Option<String>, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    let binding = match state.game.connect(requested, remote, outbound_tx).await {
        Ok(binding) => binding,
        Err(e) => {
            error!(remote = %remote, error = %e, "Failed to register connection");
            return;
        }
    };

    info!(player_id = %binding.player_id, remote = %remote, "New WebSocket connection");

    run_session(
        binding.player_id.clone(),
        binding.connection,
        ws_sink,
        ws_stream,
        outbound_rx,
        &state.game,
    )
    .await;

    // Socket close or error is a disconnect, never fatal
    if let Err(e) = state
        .game
        .disconnect(binding.player_id.clone(), binding.connection)
        .await
    {
        debug!(player_id = %binding.player_id, error = %e, "Game loop gone during disconnect");
    }

    info!(player_id = %binding.player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: String,
    connection: u64,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::Receiver<String>,
    game: &GameHandle,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: queued frames -> WebSocket
    let writer_player_id = player_id.clone();
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame)).await {
                debug!(player_id = %writer_player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> game loop
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if text == "ping" {
                    debug!(player_id = %player_id, "Received keepalive");
                    continue;
                }

                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if game.input(player_id.clone(), connection, msg).await.is_err() {
                            debug!(player_id = %player_id, "Game loop closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(player_id = %player_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}
