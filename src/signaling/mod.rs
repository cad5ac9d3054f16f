//! Сигналинг: сервис каналов и присутствия, через который идёт звонок.
//!
//! - `message`: offer / answer / candidate
//! - `memory`: сервис каналов в памяти процесса
//! - `protocol`: JSON кадры протокола relay
//! - `ws`: WebSocket клиент relay
//! - `relay`: axum сервер поверх [`MemoryHub`]

pub mod memory;
pub mod message;
pub mod protocol;
pub mod relay;
pub mod ws;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use memory::{MemoryClient, MemoryHub};
pub use message::SignalingMessage;
pub use ws::WsSignalingClient;

/// События сервиса: участники канала и личные сообщения
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    MemberJoined(String),
    MemberLeft(String),
    MessageFromPeer { text: String, member_id: String },
}

pub type EventReceiver = mpsc::UnboundedReceiver<ChannelEvent>;

/// Тонкий адаптер к сервису сообщений. Без повторов и таймаутов.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Логин; все дальнейшие события приходят в возвращённую очередь
    async fn login(&self, app_id: &str, uid: &str, token: Option<&str>) -> Result<EventReceiver>;

    async fn join_channel(&self, room_id: &str) -> Result<()>;

    async fn send_to_peer(&self, text: String, peer_id: &str) -> Result<()>;

    async fn leave(&self) -> Result<()>;

    async fn logout(&self) -> Result<()>;
}
