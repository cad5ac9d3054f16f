use super::memory::{MemoryClient, MemoryHub};
use super::protocol::{ClientFrame, ServerFrame};
use super::SignalingClient;
use crate::error::{CallError, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub fn router(hub: MemoryHub) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(hub)
}

/// Запускает relay на уже открытом сокете
pub async fn serve(listener: TcpListener, hub: MemoryHub) -> Result<()> {
    tracing::info!(addr = ?listener.local_addr()?, "Signaling relay listening");
    axum::serve(listener, router(hub)).await?;
    Ok(())
}

async fn health(State(hub): State<MemoryHub>) -> impl IntoResponse {
    Json(serde_json::json!({ "online": hub.online_count() }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<MemoryHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: MemoryHub) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let client = hub.client();
    while let Some(Ok(msg)) = ws_rx.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let reply = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => apply(&client, frame, &tx).await,
            Err(e) => Err(CallError::Serialization(e)),
        };
        let frame = match reply {
            Ok(()) => ServerFrame::Ok,
            Err(e) => ServerFrame::Error {
                message: e.to_string(),
            },
        };
        if tx.send(frame).is_err() {
            break;
        }
    }
    // MemoryClient при drop сам выходит из канала и разлогинивается
    tracing::debug!("Relay socket closed");
}

async fn apply(
    client: &MemoryClient,
    frame: ClientFrame,
    tx: &mpsc::UnboundedSender<ServerFrame>,
) -> Result<()> {
    match frame {
        ClientFrame::Login { app_id, uid, token } => {
            let mut events = client.login(&app_id, &uid, token.as_deref()).await?;
            tracing::info!(uid, "Relay login");
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if tx.send(ServerFrame::from(event)).is_err() {
                        break;
                    }
                }
            });
            Ok(())
        }
        ClientFrame::Join { channel } => client.join_channel(&channel).await,
        ClientFrame::Send { to, text } => client.send_to_peer(text, &to).await,
        ClientFrame::Leave => client.leave().await,
        ClientFrame::Logout => client.logout().await,
    }
}
