//! WebSocket transport: hands each upgraded socket to the hub.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};

use crate::connection::Outbound;
use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, remote, state))
}

/// Drive one connection until either side goes away.
async fn handle_socket(socket: WebSocket, remote: SocketAddr, state: AppState) {
    let hub = state.hub;
    let (mut sender, mut receiver) = socket.split();
    let (mut session, mut outbound) = hub.connect();
    let conn_id = session.connection().id();

    tracing::info!(%remote, %conn_id, "WebSocket connection opened");

    // The writer owns the sink, so writes to this socket never interleave.
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Text(text) => {
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        tracing::debug!(%conn_id, error = %e, "WebSocket write failed");
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => hub.handle_text(&mut session, text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%conn_id, error = %e, "WebSocket error");
                    break;
                }
            },
            // Writer stopped: the socket is unusable or we were told to close it.
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    hub.disconnect(&mut session).await;

    tracing::info!(%remote, %conn_id, "WebSocket connection closed");
}
