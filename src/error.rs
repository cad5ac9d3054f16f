use thiserror::Error;

use crate::media::TrackKind;

/// Ошибки клиента звонка
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Signaling error: {0}")]
    Signaling(String),

    #[error("Not logged in to the signaling service")]
    NotLoggedIn,

    #[error("User {0} is already logged in")]
    AlreadyLoggedIn(String),

    #[error("Not joined to a channel")]
    NotJoined,

    #[error("Peer {0} is not reachable")]
    PeerUnreachable(String),

    #[error("Signaling channel closed")]
    ChannelClosed,

    #[error("Permission to use media devices was denied")]
    PermissionDenied,

    #[error("No {0} device available")]
    DeviceNotFound(TrackKind),

    #[error("Constraint cannot be satisfied: {0}")]
    Overconstrained(String),

    #[error("No peer connection for {0}")]
    NoPeerConnection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid page URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CallError>;
