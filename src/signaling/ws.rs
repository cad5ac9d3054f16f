use super::protocol::{ClientFrame, ServerFrame};
use super::{ChannelEvent, EventReceiver, SignalingClient};
use crate::error::{CallError, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

type EventSlot = Arc<Mutex<Option<mpsc::UnboundedSender<ChannelEvent>>>>;

/// Клиент relay по WebSocket
pub struct WsSignalingClient {
    out_tx: mpsc::UnboundedSender<Message>,
    replies: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<()>>>,
    events: EventSlot,
    tasks: Vec<JoinHandle<()>>,
}

impl WsSignalingClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async(url).await?;
        tracing::info!(url, "Connected to signaling relay");
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Result<()>>();
        let events: EventSlot = Arc::new(Mutex::new(None));

        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if sink.send(msg).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let frame: ServerFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(error = %e, "Malformed frame from relay");
                        continue;
                    }
                };
                match frame {
                    ServerFrame::Ok => {
                        let _ = reply_tx.send(Ok(()));
                    }
                    ServerFrame::Error { message } => {
                        let _ = reply_tx.send(Err(CallError::Signaling(message)));
                    }
                    other => {
                        if let Some(event) = other.into_event() {
                            if let Some(tx) = reader_events.lock().as_ref() {
                                let _ = tx.send(event);
                            }
                        }
                    }
                }
            }
            tracing::info!("Signaling relay connection closed");
            // закрываем очередь событий: звонок получит SignalingClosed
            reader_events.lock().take();
        });

        Ok(Self {
            out_tx,
            replies: tokio::sync::Mutex::new(reply_rx),
            events,
            tasks: vec![writer, reader],
        })
    }

    /// Отправляет запрос и ждёт ответ relay. Запросы идут строго по одному.
    async fn request(&self, frame: ClientFrame) -> Result<()> {
        let mut replies = self.replies.lock().await;
        let text = serde_json::to_string(&frame)?;
        self.out_tx
            .send(Message::Text(text))
            .map_err(|_| CallError::ChannelClosed)?;
        replies.recv().await.ok_or(CallError::ChannelClosed)?
    }
}

#[async_trait]
impl SignalingClient for WsSignalingClient {
    async fn login(&self, app_id: &str, uid: &str, token: Option<&str>) -> Result<EventReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.events.lock().replace(tx);
        let result = self
            .request(ClientFrame::Login {
                app_id: app_id.into(),
                uid: uid.into(),
                token: token.map(Into::into),
            })
            .await;
        if result.is_err() {
            // отказ relay не трогает очередь прежнего логина
            *self.events.lock() = previous;
        }
        result.map(|_| rx)
    }

    async fn join_channel(&self, room_id: &str) -> Result<()> {
        self.request(ClientFrame::Join {
            channel: room_id.into(),
        })
        .await
    }

    async fn send_to_peer(&self, text: String, peer_id: &str) -> Result<()> {
        self.request(ClientFrame::Send {
            to: peer_id.into(),
            text,
        })
        .await
    }

    async fn leave(&self) -> Result<()> {
        self.request(ClientFrame::Leave).await
    }

    async fn logout(&self) -> Result<()> {
        let result = self.request(ClientFrame::Logout).await;
        self.events.lock().take();
        result
    }
}

impl Drop for WsSignalingClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
